//! Pattern tables shared by the quota extractor and the classifier.
//!
//! ANSI cursor moves expand to spaces, so a word such as "Resets" may arrive
//! as "Re sets". Every label pattern is therefore built with [`loose`], which
//! allows whitespace between any two characters.

use once_cell::sync::Lazy;
use regex::Regex;

use super::types::QuotaCategory;

/// Category label phrases, scanned top to bottom, first match wins
const CATEGORY_LABELS: &[(&str, QuotaCategory)] = &[
    ("current session", QuotaCategory::Session),
    ("current week (all models)", QuotaCategory::WeeklyAll),
    ("current week (opus", QuotaCategory::WeeklyOpus),
    ("opus usage", QuotaCategory::WeeklyOpus),
    ("current week (sonnet", QuotaCategory::WeeklySonnet),
    ("sonnet usage", QuotaCategory::WeeklySonnet),
];

/// Section headers for extra (pay-as-you-go) usage
const COST_LABELS: &[&str] = &["extra usage"];

/// Words that introduce a reset deadline
const RESET_LABELS: &[&str] = &["resets", "renews", "reset", "renew"];

/// A compiled category label
pub(crate) struct LabelPattern {
    regex: Regex,
    pub category: QuotaCategory,
}

pub(crate) static LABEL_PATTERNS: Lazy<Vec<LabelPattern>> = Lazy::new(|| {
    CATEGORY_LABELS
        .iter()
        .map(|(phrase, category)| LabelPattern {
            regex: Regex::new(&loose(phrase)).unwrap(),
            category: *category,
        })
        .collect()
});

pub(crate) static COST_LABEL_RE: Lazy<Regex> = Lazy::new(|| any_of(COST_LABELS));

pub(crate) static RESET_LABEL_RE: Lazy<Regex> = Lazy::new(|| any_of(RESET_LABELS));

/// `14% used`, `86% left`, `86 % remaining`
static PERCENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)(\d{{1,3}})\s*%\s*({}|{}|{})",
        loose_body("used"),
        loose_body("left"),
        loose_body("remaining")
    ))
    .unwrap()
});

/// Build a case-insensitive pattern for `phrase` that tolerates whitespace
/// anywhere between its characters.
pub(crate) fn loose(phrase: &str) -> String {
    format!("(?i){}", loose_body(phrase))
}

fn loose_body(phrase: &str) -> String {
    phrase
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| regex::escape(c.encode_utf8(&mut [0u8; 4])))
        .collect::<Vec<_>>()
        .join(r"\s*")
}

fn any_of(phrases: &[&str]) -> Regex {
    let alternatives: Vec<String> = phrases.iter().map(|p| loose_body(p)).collect();
    Regex::new(&format!("(?i)(?:{})", alternatives.join("|"))).unwrap()
}

/// Category whose label appears on this line
pub(crate) fn match_category(line: &str) -> Option<QuotaCategory> {
    LABEL_PATTERNS
        .iter()
        .find(|p| p.regex.is_match(line))
        .map(|p| p.category)
}

/// Whether this line starts an extra-usage section
pub(crate) fn is_cost_label(line: &str) -> bool {
    COST_LABEL_RE.is_match(line)
}

/// Percentage remaining reported on this line.
///
/// "used" figures are inverted; "left"/"remaining" figures are taken as-is.
pub(crate) fn parse_percent(line: &str) -> Option<u8> {
    let caps = PERCENT_RE.captures(line)?;
    let value = caps[1].parse::<u16>().ok()?.min(100) as u8;
    let used = caps[2]
        .chars()
        .next()
        .is_some_and(|c| c.eq_ignore_ascii_case(&'u'));
    Some(if used { 100 - value } else { value })
}

/// Whether the line holds a percentage phrase
pub(crate) fn has_percent(line: &str) -> bool {
    PERCENT_RE.is_match(line)
}

/// Byte offsets where a category or cost label starts, in line order.
///
/// Overlapping matches of different phrases count once.
pub(crate) fn label_starts(line: &str) -> Vec<usize> {
    let mut spans: Vec<(usize, usize)> = LABEL_PATTERNS
        .iter()
        .flat_map(|p| p.regex.find_iter(line))
        .chain(COST_LABEL_RE.find_iter(line))
        .map(|m| (m.start(), m.end()))
        .collect();
    spans.sort_unstable();

    let mut starts = Vec::new();
    let mut covered = 0;
    for (start, end) in spans {
        if starts.is_empty() || start >= covered {
            starts.push(start);
        }
        covered = covered.max(end);
    }
    starts
}

/// Categories whose label appears anywhere in `text`
pub(crate) fn categories_in(text: &str) -> Vec<QuotaCategory> {
    let mut found: Vec<QuotaCategory> = LABEL_PATTERNS
        .iter()
        .filter(|p| p.regex.is_match(text))
        .map(|p| p.category)
        .collect();
    found.dedup();
    found
}

/// Text following a `Resets`/`Renews` word, if the line has one
pub(crate) fn after_reset_label(line: &str) -> Option<&str> {
    RESET_LABEL_RE.find(line).map(|m| &line[m.end()..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_category() {
        assert_eq!(match_category("  Current session"), Some(QuotaCategory::Session));
        assert_eq!(
            match_category("Current week (all models)"),
            Some(QuotaCategory::WeeklyAll)
        );
        assert_eq!(
            match_category("Current week (Opus)"),
            Some(QuotaCategory::WeeklyOpus)
        );
        assert_eq!(
            match_category("Current week (Sonnet only)"),
            Some(QuotaCategory::WeeklySonnet)
        );
        assert_eq!(match_category("Sonnet usage"), Some(QuotaCategory::WeeklySonnet));
        assert_eq!(match_category("Extra usage"), None);
        assert_eq!(match_category("Settings:  Status   Config   Usage"), None);
    }

    #[test]
    fn test_match_category_with_injected_spaces() {
        assert_eq!(match_category("Cur rent  ses sion"), Some(QuotaCategory::Session));
        assert_eq!(
            match_category("Current week ( all  models )"),
            Some(QuotaCategory::WeeklyAll)
        );
    }

    #[test]
    fn test_parse_percent() {
        assert_eq!(parse_percent("  ██████▌   14% used"), Some(86));
        assert_eq!(parse_percent("86% left"), Some(86));
        assert_eq!(parse_percent("40 % remaining"), Some(40));
        assert_eq!(parse_percent("0% used"), Some(100));
        assert_eq!(parse_percent("100% used"), Some(0));
        assert_eq!(parse_percent("7% u sed"), Some(93));
        assert_eq!(parse_percent("no match here"), None);
        assert_eq!(parse_percent("14%"), None);
    }

    #[test]
    fn test_after_reset_label() {
        assert_eq!(after_reset_label("Resets 8pm"), Some(" 8pm"));
        assert_eq!(after_reset_label("Re sets Feb 27"), Some(" Feb 27"));
        assert_eq!(after_reset_label("Renews Mar 1"), Some(" Mar 1"));
        assert_eq!(after_reset_label("14% used"), None);
    }

    #[test]
    fn test_label_starts_on_merged_line() {
        let line = "Current session 14% used Current week (all models) 7% used";
        assert_eq!(label_starts(line), vec![0, 25]);
        assert_eq!(label_starts("Extra usage  Current week (Sonnet only)"), vec![0, 13]);
        assert!(label_starts("14% used").is_empty());
    }

    #[test]
    fn test_categories_in() {
        let text = "Current session\n14% used\nCurrent week (Opus)\nOpus usage";
        assert_eq!(
            categories_in(text),
            vec![QuotaCategory::Session, QuotaCategory::WeeklyOpus]
        );
        assert!(categories_in("Loading...").is_empty());
    }

    #[test]
    fn test_loose_escapes_metacharacters() {
        let re = Regex::new(&loose("week (all")).unwrap();
        assert!(re.is_match("WEEK  (ALL"));
        assert!(!re.is_match("week all"));
    }
}
