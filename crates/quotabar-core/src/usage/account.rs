//! Account metadata, authentication failures and extra-usage cost.

use once_cell::sync::Lazy;
use regex::Regex;

use super::patterns::is_cost_label;
use super::types::{AuthCode, AuthFailure, CostUsage};

/// Lines after the extra-usage header searched for the spent/budget pair
const COST_WINDOW: usize = 4;

/// Plan phrase -> canonical account type
const PLAN_LABELS: &[(&str, &str)] = &[
    ("max", "Max"),
    ("pro", "Pro"),
    ("team", "Team"),
    ("enterprise", "Enterprise"),
    ("api", "API"),
    ("free", "Free"),
];

/// `Claude Max`, `· Claude Pro`, `│ claude team`
static PLAN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|[\s·•|│])claude\s+(max|pro|team|enterprise|api|free)\b").unwrap()
});

/// `Claude Max · someone@example.com`
static PLAN_EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)claude\s+(?:max|pro|team|enterprise|api|free)\b[^·•]*[·•]\s*([A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,})",
    )
    .unwrap()
});

/// `Email: someone@example.com`, `Account: someone@example.com`
static LABELED_EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:email|account)\s*:\s*([A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,})")
        .unwrap()
});

/// `$22.22 / $50.00 spent`, `$1,204.50 / $2,000 spent`
static COST_AMOUNTS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\$\s*([\d,]+(?:\.\d+)?)\s*/\s*\$\s*([\d,]+(?:\.\d+)?)\s*spent").unwrap()
});

/// Workspace trust prompt shown before Claude Code starts in a new folder
static TRUST_PROMPT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)do you trust the files in this folder|yes,\s*proceed|yes,\s*i\s*trust\s*this\s*folder",
    )
    .unwrap()
});

/// An authentication phrase and what it means
struct AuthPattern {
    regex: Regex,
    code: AuthCode,
    message: &'static str,
}

fn auth(pattern: &str, code: AuthCode, message: &'static str) -> AuthPattern {
    AuthPattern {
        regex: Regex::new(pattern).unwrap(),
        code,
        message,
    }
}

/// Ordered phrase table, first match wins
static AUTH_PATTERNS: Lazy<Vec<AuthPattern>> = Lazy::new(|| {
    vec![
        auth(
            r"(?i)let'?s get started|choose the text style|select login method",
            AuthCode::SetupRequired,
            "Claude Code setup is not complete. Run `claude` in a terminal to finish onboarding.",
        ),
        auth(
            r"(?i)oauth token (?:has )?expired|token has expired|session (?:has )?expired",
            AuthCode::TokenExpired,
            "Claude login has expired. Run `claude` and use /login to sign in again.",
        ),
        auth(
            r"(?i)not logged in|please run /login|please log ?in|invalid api key",
            AuthCode::NotLoggedIn,
            "Not logged in to Claude. Run `claude` and use /login.",
        ),
        auth(
            r"(?i)/usage is only available for|only available (?:for|to) (?:subscription|claude\.ai|pro and max)|no active subscription",
            AuthCode::NoSubscription,
            "Usage limits are only available for Claude subscription plans.",
        ),
        auth(
            r"(?i)claude\.ai/oauth/authorize|console\.anthropic\.com/oauth",
            AuthCode::NotLoggedIn,
            "Claude is waiting for a browser login. Run `claude` in a terminal to sign in.",
        ),
    ]
});

/// Canonical plan label from the first plan phrase, or "unknown"
pub fn detect_account_type(lines: &[String]) -> String {
    lines
        .iter()
        .find_map(|line| PLAN_RE.captures(line))
        .and_then(|caps| {
            let plan = caps[1].to_ascii_lowercase();
            PLAN_LABELS
                .iter()
                .find(|(phrase, _)| *phrase == plan)
                .map(|(_, label)| label.to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Login email from the plan header or an `Email:` line
pub fn detect_email(lines: &[String]) -> Option<String> {
    lines.iter().find_map(|line| {
        PLAN_EMAIL_RE
            .captures(line)
            .or_else(|| LABELED_EMAIL_RE.captures(line))
            .map(|caps| caps[1].to_string())
    })
}

/// First authentication phrase found anywhere in the transcript
pub fn detect_auth_failure(lines: &[String]) -> Option<AuthFailure> {
    let text = lines.join("\n");
    AUTH_PATTERNS
        .iter()
        .find(|p| p.regex.is_match(&text))
        .map(|p| AuthFailure {
            code: p.code,
            message: p.message.to_string(),
        })
}

/// Spent/budget pair of the first extra-usage section; zero when absent
pub fn detect_cost(lines: &[String]) -> CostUsage {
    let Some(header) = lines.iter().position(|line| is_cost_label(line)) else {
        return CostUsage::default();
    };
    let end = (header + 1 + COST_WINDOW).min(lines.len());

    lines[header..end]
        .iter()
        .find_map(|line| COST_AMOUNTS_RE.captures(line))
        .map(|caps| CostUsage {
            spent: parse_amount(&caps[1]),
            budget: parse_amount(&caps[2]),
        })
        .unwrap_or_default()
}

/// Whether Claude Code stopped at the "trust this folder?" prompt
pub fn detect_trust_prompt(lines: &[String]) -> bool {
    lines.iter().any(|line| TRUST_PROMPT_RE.is_match(line))
}

fn parse_amount(text: &str) -> f64 {
    text.replace(',', "").parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    #[test]
    fn test_account_type() {
        assert_eq!(detect_account_type(&lines("  Claude Max · me@example.com")), "Max");
        assert_eq!(detect_account_type(&lines("Login method: · Claude Pro")), "Pro");
        assert_eq!(detect_account_type(&lines("claude enterprise")), "Enterprise");
        assert_eq!(detect_account_type(&lines("Claude API account")), "API");
        assert_eq!(detect_account_type(&lines("Claude Code v2.1.0")), "unknown");
        assert_eq!(detect_account_type(&[]), "unknown");
    }

    #[test]
    fn test_account_type_first_line_wins() {
        let text = "Claude Team\nUpgrade to Claude Max for more usage";
        assert_eq!(detect_account_type(&lines(text)), "Team");
    }

    #[test]
    fn test_email() {
        assert_eq!(
            detect_email(&lines("Claude Max · me@example.com's Organization")),
            Some("me@example.com".to_string())
        );
        assert_eq!(
            detect_email(&lines("header\n  Email: dev.ops+cc@corp.io")),
            Some("dev.ops+cc@corp.io".to_string())
        );
        assert_eq!(
            detect_email(&lines("Account: team@corp.io")),
            Some("team@corp.io".to_string())
        );
        assert_eq!(detect_email(&lines("Claude Max")), None);
    }

    #[test]
    fn test_auth_setup_required() {
        let failure = detect_auth_failure(&lines("Welcome to Claude Code\nLet's get started.")).unwrap();
        assert_eq!(failure.code, AuthCode::SetupRequired);
    }

    #[test]
    fn test_auth_expired_takes_table_order() {
        let text = "OAuth token has expired.\nPlease run /login";
        let failure = detect_auth_failure(&lines(text)).unwrap();
        assert_eq!(failure.code, AuthCode::TokenExpired);
    }

    #[test]
    fn test_auth_not_logged_in_and_url() {
        let failure = detect_auth_failure(&lines("Invalid API key · Please run /login")).unwrap();
        assert_eq!(failure.code, AuthCode::NotLoggedIn);

        let text = "Browser didn't open? Use the url below\nhttps://claude.ai/oauth/authorize?code=true";
        let failure = detect_auth_failure(&lines(text)).unwrap();
        assert_eq!(failure.code, AuthCode::NotLoggedIn);
    }

    #[test]
    fn test_auth_no_subscription_is_informational() {
        let text = "/usage is only available for subscription plans.";
        let failure = detect_auth_failure(&lines(text)).unwrap();
        assert_eq!(failure.code, AuthCode::NoSubscription);
        assert!(!failure.code.is_hard());
    }

    #[test]
    fn test_auth_none() {
        assert!(detect_auth_failure(&lines("Current session\n14% used")).is_none());
    }

    #[test]
    fn test_cost() {
        let text = "Extra usage\n██████ 44% used\n$1,204.50 / $2,000.00 spent · Resets Mar 1";
        let cost = detect_cost(&lines(text));
        assert_eq!(cost.spent, 1204.5);
        assert_eq!(cost.budget, 2000.0);
    }

    #[test]
    fn test_cost_absent_or_out_of_window() {
        assert_eq!(detect_cost(&lines("Current session\n14% used")), CostUsage::default());

        let text = "Extra usage\n\n\n\n\n\n$5.00 / $10.00 spent";
        assert_eq!(detect_cost(&lines(text)), CostUsage::default());
    }

    #[test]
    fn test_trust_prompt() {
        let text = "Do you trust the files in this folder?\n❯ 1. Yes, proceed";
        assert!(detect_trust_prompt(&lines(text)));
        assert!(!detect_trust_prompt(&lines("Current session")));
    }

    #[test]
    fn test_trust_prompt_answer_only() {
        // The question scrolled off; only the menu is left on screen
        assert!(detect_trust_prompt(&lines("│ ❯ 1. Yes, proceed\n│   2. No, exit")));
        assert!(detect_trust_prompt(&lines("1. Yes,  proceed")));
        assert!(detect_trust_prompt(&lines("Yes, I trust this folder")));
    }
}
