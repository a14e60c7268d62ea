//! Usage data types parsed from Claude Code `/usage` output.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::time::format_remaining;

/// Quota bucket tracked independently by `/usage`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuotaCategory {
    /// "Current session"
    Session,
    /// "Current week (all models)"
    #[serde(rename = "weekly-all-models")]
    WeeklyAll,
    /// "Current week (Opus)"
    WeeklyOpus,
    /// "Current week (Sonnet only)"
    WeeklySonnet,
}

impl QuotaCategory {
    /// Display order used by the status line
    pub const DISPLAY_ORDER: [QuotaCategory; 4] = [
        QuotaCategory::Session,
        QuotaCategory::WeeklyAll,
        QuotaCategory::WeeklyOpus,
        QuotaCategory::WeeklySonnet,
    ];

    /// Short name used as a display prefix
    pub fn short_name(&self) -> &'static str {
        match self {
            QuotaCategory::Session => "session",
            QuotaCategory::WeeklyAll => "weekly",
            QuotaCategory::WeeklyOpus => "opus",
            QuotaCategory::WeeklySonnet => "sonnet",
        }
    }

    /// Whether this bucket only counts a single model family
    pub fn is_model_specific(&self) -> bool {
        matches!(self, QuotaCategory::WeeklyOpus | QuotaCategory::WeeklySonnet)
    }
}

/// A single usage category with its remaining share and reset deadline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaRecord {
    pub category: QuotaCategory,
    /// Percentage remaining (0-100)
    pub percent_remaining: u8,
    /// Absolute reset instant, `None` when no deadline could be resolved
    pub reset_at: Option<DateTime<Utc>>,
    /// Seconds until reset, 0 when unknown or already passed
    pub remaining_seconds: u64,
    /// Compact rendering of `remaining_seconds` (e.g. "3h20m")
    pub remaining_human: String,
}

impl QuotaRecord {
    /// Build a record; `remaining_human` is always derived from `remaining_seconds`
    pub fn new(
        category: QuotaCategory,
        percent_remaining: u8,
        reset_at: Option<DateTime<Utc>>,
        remaining_seconds: u64,
    ) -> Self {
        Self {
            category,
            percent_remaining: percent_remaining.min(100),
            reset_at,
            remaining_seconds,
            remaining_human: format_remaining(remaining_seconds),
        }
    }

    /// Percentage used (0-100)
    pub fn percent_used(&self) -> u8 {
        100u8.saturating_sub(self.percent_remaining)
    }
}

/// Plan and login identity shown in the `/usage` header
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountInfo {
    /// Canonical plan label ("Pro", "Max", ..., or "unknown")
    pub account_type: String,
    /// Login email, empty when not shown
    pub email: String,
}

impl Default for AccountInfo {
    fn default() -> Self {
        Self {
            account_type: "unknown".to_string(),
            email: String::new(),
        }
    }
}

/// Extra-usage spending (e.g. "$22.22 / $50.00 spent")
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CostUsage {
    pub spent: f64,
    pub budget: f64,
}

/// Authentication problem classes recognized in the transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthCode {
    SetupRequired,
    NotLoggedIn,
    TokenExpired,
    NoSubscription,
}

impl AuthCode {
    /// Hard failures mean no usage can be shown until the user logs in again
    pub fn is_hard(&self) -> bool {
        !matches!(self, AuthCode::NoSubscription)
    }
}

/// A matched authentication phrase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthFailure {
    pub code: AuthCode,
    pub message: String,
}

/// Why no quota data is available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoDataReason {
    /// The transcript had no recognizable quota sections
    NoQuotas,
    /// The command did not settle before the hard timeout
    Timeout,
    /// The configured executable could not be found
    MissingExecutable,
    /// The PTY or child process could not be started
    SpawnFailed,
}

/// Result of one pipeline invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ParseOutcome {
    Ok {
        account: AccountInfo,
        /// Never empty
        quotas: Vec<QuotaRecord>,
        cost: CostUsage,
        /// Assigned from the reference clock when the pipeline completes
        captured_at: DateTime<Utc>,
    },
    NotAuthenticated {
        code: AuthCode,
        message: String,
    },
    NoData {
        reason: NoDataReason,
        message: String,
    },
}

impl ParseOutcome {
    /// Whether this outcome carries quota data
    pub fn is_ok(&self) -> bool {
        matches!(self, ParseOutcome::Ok { .. })
    }

    /// Quota records of a successful outcome (empty otherwise)
    pub fn quotas(&self) -> &[QuotaRecord] {
        match self {
            ParseOutcome::Ok { quotas, .. } => quotas,
            _ => &[],
        }
    }

    /// Look up a quota record by category
    pub fn quota(&self, category: QuotaCategory) -> Option<&QuotaRecord> {
        self.quotas().iter().find(|q| q.category == category)
    }

    /// User-facing message for failure outcomes
    pub fn error_message(&self) -> Option<&str> {
        match self {
            ParseOutcome::Ok { .. } => None,
            ParseOutcome::NotAuthenticated { message, .. } => Some(message),
            ParseOutcome::NoData { message, .. } => Some(message),
        }
    }
}
