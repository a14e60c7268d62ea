//! Parse Claude Code `/usage` output captured from a PTY.
//!
//! Expected format (each meter block):
//! ```text
//!   Current session
//!   ████████████████████████████████████               72% used
//!   Resets 1am (Asia/Tokyo)
//!
//!   Current week (all models)
//!   ███████████▌                                       23% used
//!   Resets Mar 3, 12am (Asia/Tokyo)
//! ```
//!
//! Because the transcript is read from a live PTY, the percentage and reset
//! lines of one block may be swapped or merged, and the same block may be
//! redrawn several times. Sections are therefore delimited by labels rather
//! than by adjacency.

use tracing::debug;

use super::account::{detect_account_type, detect_auth_failure, detect_cost, detect_email};
use super::normalize::normalize_transcript;
use super::patterns::{
    after_reset_label, has_percent, is_cost_label, label_starts, match_category, parse_percent,
};
use super::time::{resolve_absolute, resolve_deadline, ReferenceClock, ResolvedDeadline};
use super::types::{AccountInfo, NoDataReason, ParseOutcome, QuotaRecord};

/// Lines (label line included) searched for the percentage of a section
const PERCENT_WINDOW: usize = 5;

/// Parse a raw transcript against the system clock.
pub fn parse_transcript(raw: &str) -> ParseOutcome {
    parse_transcript_at(raw, &ReferenceClock::system())
}

/// Parse a raw transcript against an explicit reference clock.
///
/// Deterministic for a given transcript and clock.
pub fn parse_transcript_at(raw: &str, clock: &ReferenceClock) -> ParseOutcome {
    let lines = normalize_transcript(raw);
    parse_lines(&lines, clock)
}

/// Classify already-normalized lines.
///
/// A hard authentication failure wins over any quota text; an empty quota
/// extraction is `NoData`, never an empty success.
pub fn parse_lines(lines: &[String], clock: &ReferenceClock) -> ParseOutcome {
    let auth_failure = detect_auth_failure(lines);
    if let Some(failure) = &auth_failure {
        if failure.code.is_hard() {
            debug!("Usage parse: authentication failure {:?}", failure.code);
            return ParseOutcome::NotAuthenticated {
                code: failure.code,
                message: failure.message.clone(),
            };
        }
    }

    let quotas = extract_quotas(lines, clock);
    if quotas.is_empty() {
        let message = match auth_failure {
            Some(failure) => failure.message,
            None => "No usage data found in /usage output".to_string(),
        };
        return ParseOutcome::NoData {
            reason: NoDataReason::NoQuotas,
            message,
        };
    }

    ParseOutcome::Ok {
        account: AccountInfo {
            account_type: detect_account_type(lines),
            email: detect_email(lines).unwrap_or_default(),
        },
        quotas,
        cost: detect_cost(lines),
        captured_at: clock.now(),
    }
}

/// Extract one record per quota category found in the lines.
pub fn extract_quotas(lines: &[String], clock: &ReferenceClock) -> Vec<QuotaRecord> {
    let lines = split_merged_labels(lines);
    let mut records: Vec<QuotaRecord> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let Some(category) = match_category(&lines[i]) else {
            i += 1;
            continue;
        };

        let end = section_end(&lines, i);
        let window_end = (i + PERCENT_WINDOW).min(end);
        let percent = (i..window_end).find_map(|j| parse_percent(&lines[j]).map(|p| (j, p)));

        let Some((percent_line, percent_remaining)) = percent else {
            debug!("Usage parse: no percentage for {:?} at line {}", category, i);
            i += 1;
            continue;
        };

        let deadline = find_deadline(&lines[i..end], clock);
        if deadline.is_none() {
            debug!("Usage parse: no reset deadline for {:?}", category);
        }

        merge_record(
            &mut records,
            QuotaRecord::new(
                category,
                percent_remaining,
                deadline.map(|d| d.reset_at),
                deadline.map_or(0, |d| d.remaining_seconds),
            ),
        );

        i = percent_line + 1;
    }

    records
}

/// Start a new line at every label that does not already begin one
fn split_merged_labels(lines: &[String]) -> Vec<String> {
    let mut split = Vec::with_capacity(lines.len());
    for line in lines {
        let mut from = 0;
        for start in label_starts(line).into_iter().filter(|&s| s > 0) {
            split.push(line[from..start].to_string());
            from = start;
        }
        split.push(line[from..].to_string());
    }
    split
}

/// Index of the next category or cost label after `start`, or the end
fn section_end(lines: &[String], start: usize) -> usize {
    lines
        .iter()
        .enumerate()
        .skip(start + 1)
        .find(|(_, line)| match_category(line).is_some() || is_cost_label(line))
        .map(|(idx, _)| idx)
        .unwrap_or(lines.len())
}

/// Resolve the reset deadline anywhere in a section.
///
/// The `Resets`/`Renews` wording is tried first. When it is missing or
/// mangled, any non-percentage line with an absolute time is used instead.
fn find_deadline(section: &[String], clock: &ReferenceClock) -> Option<ResolvedDeadline> {
    section
        .iter()
        .filter_map(|line| after_reset_label(line))
        .find_map(|rest| resolve_deadline(rest, clock))
        .or_else(|| {
            section
                .iter()
                .filter(|line| !has_percent(line))
                .find_map(|line| resolve_absolute(line, clock))
        })
}

/// Keep the first record per category unless a redraw adds a deadline
fn merge_record(records: &mut Vec<QuotaRecord>, record: QuotaRecord) {
    match records.iter_mut().find(|r| r.category == record.category) {
        Some(existing) => {
            if existing.reset_at.is_none() && record.reset_at.is_some() {
                *existing = record;
            }
        }
        None => records.push(record),
    }
}
