//! One-line rendering of quota records for status bars.

use super::types::{QuotaCategory, QuotaRecord};

/// Separator between categories
const SEPARATOR: &str = " | ";

/// Render quotas as `"14% 3h20m | 7% 5d 2h | sonnet 0% 6d 22h"`.
///
/// Categories appear in a fixed order (session, weekly, then model-specific
/// ones prefixed by their name) regardless of transcript order.
///
/// A record whose deadline is unknown renders as `"<percentUsed>%"` only;
/// its `remaining_human` (`<1m`) is not shown.
pub fn format_status_line(quotas: &[QuotaRecord]) -> String {
    QuotaCategory::DISPLAY_ORDER
        .iter()
        .filter_map(|category| quotas.iter().find(|q| q.category == *category))
        .map(format_quota)
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

/// `"<percentUsed>% <remainingHuman>"`, prefixed for model-specific buckets
pub fn format_quota(quota: &QuotaRecord) -> String {
    let body = if quota.reset_at.is_some() {
        format!("{}% {}", quota.percent_used(), quota.remaining_human)
    } else {
        format!("{}%", quota.percent_used())
    };

    if quota.category.is_model_specific() {
        format!("{} {}", quota.category.short_name(), body)
    } else {
        body
    }
}

/// Longer description used for tooltips and `--detail` output,
/// e.g. `"weekly: 7% used, resets in 5d 2h"`.
pub fn describe_quota(quota: &QuotaRecord) -> String {
    match quota.reset_at {
        Some(_) => format!(
            "{}: {}% used, resets in {}",
            quota.category.short_name(),
            quota.percent_used(),
            quota.remaining_human
        ),
        None => format!(
            "{}: {}% used, reset time unknown",
            quota.category.short_name(),
            quota.percent_used()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn record(category: QuotaCategory, remaining: u8, secs: u64) -> QuotaRecord {
        let reset_at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        QuotaRecord::new(category, remaining, Some(reset_at), secs)
    }

    #[test]
    fn test_reference_status_line() {
        let quotas = vec![
            record(QuotaCategory::WeeklySonnet, 100, 6 * 86_400 + 22 * 3_600),
            record(QuotaCategory::Session, 86, 12_000),
            record(QuotaCategory::WeeklyAll, 93, 440_400),
        ];
        assert_eq!(
            format_status_line(&quotas),
            "14% 3h20m | 7% 5d 2h | sonnet 0% 6d 22h"
        );
    }

    #[test]
    fn test_opus_before_sonnet() {
        let quotas = vec![
            record(QuotaCategory::WeeklySonnet, 90, 3_600),
            record(QuotaCategory::WeeklyOpus, 50, 120),
        ];
        assert_eq!(format_status_line(&quotas), "opus 50% 2m | sonnet 10% 1h");
    }

    #[test]
    fn test_unknown_deadline() {
        let quota = QuotaRecord::new(QuotaCategory::Session, 86, None, 0);
        assert_eq!(format_quota(&quota), "14%");
        assert_eq!(describe_quota(&quota), "session: 14% used, reset time unknown");
    }

    #[test]
    fn test_unknown_deadline_in_status_line() {
        let quotas = vec![
            QuotaRecord::new(QuotaCategory::Session, 86, None, 0),
            record(QuotaCategory::WeeklyAll, 93, 440_400),
            QuotaRecord::new(QuotaCategory::WeeklyOpus, 60, None, 0),
        ];
        assert_eq!(format_status_line(&quotas), "14% | 7% 5d 2h | opus 40%");
    }

    #[test]
    fn test_empty() {
        assert_eq!(format_status_line(&[]), "");
    }

    #[test]
    fn test_describe() {
        let quota = record(QuotaCategory::WeeklyAll, 93, 440_400);
        assert_eq!(describe_quota(&quota), "weekly: 7% used, resets in 5d 2h");
    }
}
