//! Usage monitoring: capture and parse Claude Code `/usage` output.
//!
//! The pipeline runs `claude /usage` in a PTY, normalizes the transcript,
//! and extracts quota records, account metadata and authentication errors.

pub mod account;
pub mod display;
pub mod fetcher;
pub mod normalize;
pub mod parser;
pub mod path_env;
mod patterns;
pub mod time;
pub mod types;

pub use display::{describe_quota, format_quota, format_status_line};
pub use fetcher::{
    capture_transcript, run_and_parse, run_and_parse_with_trust, AcquireError, AcquireOptions,
    LogOnlyTrust, Settled, Transcript, WorkspaceTrust,
};
pub use normalize::normalize_transcript;
pub use parser::{parse_lines, parse_transcript, parse_transcript_at};
pub use time::{format_remaining, ReferenceClock};
pub use types::{
    AccountInfo, AuthCode, AuthFailure, CostUsage, NoDataReason, ParseOutcome, QuotaCategory,
    QuotaRecord,
};
