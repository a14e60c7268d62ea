//! Reset deadline resolution.
//!
//! Two phrase families are understood:
//!
//! - relative: `in 3d 2h`, `5 hours 10 minutes`
//! - absolute: `8pm`, `Feb 27 at 7pm`, `Mar 1, 2027 at 3:30am`, each with an
//!   optional `(Area/City)` zone suffix
//!
//! Absolute targets are compared with "now" as naive civil times in the same
//! zone, so host offsets never leak into the remaining duration.

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 3_600;
const SECS_PER_DAY: u64 = 86_400;

/// A dated target without a year this far in the past belongs to next year
const YEAR_WRAP_DAYS: i64 = 30;

/// `<N>d`, `<N> hours`, `<N>min`... The trailing letters group rejects words
/// that merely start with a unit letter ("30 months").
static RELATIVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+)\s*(days?|hours?|hrs?|minutes?|mins?|d|h|m)([a-z]*)").unwrap()
});

/// `7pm`, `3:30am`, `11 p.m.`
static CLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d{1,2})(?::(\d{2}))?\s*([ap])\.?m\b").unwrap());

/// `Feb 27`, `March 1st`, `Mar 1, 2027`
static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})(?:st|nd|rd|th)?\b(?:,?\s*(\d{4})\b)?",
    )
    .unwrap()
});

/// `(America/Toronto)`, `(UTC)`
static ZONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\(\s*([A-Za-z]+(?:/[A-Za-z0-9_+\-]+)+|UTC|GMT)\s*\)").unwrap()
});

/// The instant deadlines are measured from, plus the calendar used when a
/// phrase names no zone.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceClock {
    now: DateTime<Utc>,
    /// `None` reads the calendar of the host's local zone
    zone: Option<Tz>,
}

impl ReferenceClock {
    /// Current time in the host's local calendar
    pub fn system() -> Self {
        Self {
            now: Utc::now(),
            zone: None,
        }
    }

    /// A fixed instant, local calendar from the host
    pub fn fixed(now: DateTime<Utc>) -> Self {
        Self { now, zone: None }
    }

    /// Use `zone` instead of the host's local calendar
    pub fn with_zone(mut self, zone: Tz) -> Self {
        self.zone = Some(zone);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn zone(&self) -> Option<Tz> {
        self.zone
    }

    /// "now" as a wall-clock reading in `zone` (or the fallback calendar)
    fn civil_now(&self, zone: Option<Tz>) -> NaiveDateTime {
        match zone.or(self.zone) {
            Some(tz) => self.now.with_timezone(&tz).naive_local(),
            None => self.now.with_timezone(&Local).naive_local(),
        }
    }

    /// Map a wall-clock reading back to an instant using the same calendar
    fn to_instant(&self, civil: NaiveDateTime, zone: Option<Tz>) -> Option<DateTime<Utc>> {
        match zone.or(self.zone) {
            Some(tz) => tz
                .from_local_datetime(&civil)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
            None => Local
                .from_local_datetime(&civil)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

/// A deadline resolved against a reference clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDeadline {
    pub reset_at: DateTime<Utc>,
    pub remaining_seconds: u64,
}

/// Resolve a deadline phrase, trying the absolute family first.
///
/// Returns `None` when neither family matches; callers treat that as an
/// unknown deadline.
pub fn resolve_deadline(text: &str, clock: &ReferenceClock) -> Option<ResolvedDeadline> {
    resolve_absolute(text, clock).or_else(|| resolve_relative(text, clock))
}

/// Resolve `3d 2h`, `in 5 hours 10 minutes`, ...
pub fn resolve_relative(text: &str, clock: &ReferenceClock) -> Option<ResolvedDeadline> {
    let mut total: u64 = 0;
    let mut found = false;

    for caps in RELATIVE_RE.captures_iter(text) {
        if !caps[3].is_empty() {
            continue;
        }
        let Ok(n) = caps[1].parse::<u64>() else {
            continue;
        };
        let unit = match caps[2].as_bytes()[0].to_ascii_lowercase() {
            b'd' => SECS_PER_DAY,
            b'h' => SECS_PER_HOUR,
            _ => SECS_PER_MINUTE,
        };
        total = total.saturating_add(n.saturating_mul(unit));
        found = true;
    }

    if !found {
        return None;
    }
    let delta = TimeDelta::try_seconds(i64::try_from(total).ok()?)?;
    Some(ResolvedDeadline {
        reset_at: clock.now().checked_add_signed(delta)?,
        remaining_seconds: total,
    })
}

/// Resolve `8pm`, `Feb 27 at 7pm (America/Toronto)`, `Mar 1, 2027`, ...
pub fn resolve_absolute(text: &str, clock: &ReferenceClock) -> Option<ResolvedDeadline> {
    let time = parse_clock(text);
    let date = parse_date(text);
    if time.is_none() && date.is_none() {
        return None;
    }

    let zone = parse_zone(text);
    let now_civil = clock.civil_now(zone);
    let time = match time {
        Some(t) => t,
        None => NaiveTime::from_hms_opt(0, 0, 0)?,
    };

    let target = match date {
        Some((month, day, Some(year))) => NaiveDate::from_ymd_opt(year, month, day)?.and_time(time),
        Some((month, day, None)) => {
            let year = now_civil.year();
            let target = NaiveDate::from_ymd_opt(year, month, day)?.and_time(time);
            if target < now_civil - TimeDelta::days(YEAR_WRAP_DAYS) {
                NaiveDate::from_ymd_opt(year + 1, month, day)?.and_time(time)
            } else {
                target
            }
        }
        None => {
            let target = now_civil.date().and_time(time);
            if target <= now_civil {
                target + TimeDelta::days(1)
            } else {
                target
            }
        }
    };

    let remaining_seconds = (target - now_civil).num_seconds().max(0) as u64;
    let reset_at = match clock.to_instant(target, zone) {
        Some(instant) => instant,
        None => clock
            .now()
            .checked_add_signed(TimeDelta::try_seconds(remaining_seconds as i64)?)?,
    };

    Some(ResolvedDeadline {
        reset_at,
        remaining_seconds,
    })
}

/// Render seconds as a compact duration, flooring at each unit.
///
/// `5d 2h`, `5d`, `3h20m`, `3h`, `20m`, or `<1m`.
pub fn format_remaining(secs: u64) -> String {
    let days = secs / SECS_PER_DAY;
    let hours = (secs % SECS_PER_DAY) / SECS_PER_HOUR;
    let minutes = (secs % SECS_PER_HOUR) / SECS_PER_MINUTE;

    if days > 0 {
        if hours > 0 {
            format!("{}d {}h", days, hours)
        } else {
            format!("{}d", days)
        }
    } else if hours > 0 {
        if minutes > 0 {
            format!("{}h{}m", hours, minutes)
        } else {
            format!("{}h", hours)
        }
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        "<1m".to_string()
    }
}

fn parse_clock(text: &str) -> Option<NaiveTime> {
    CLOCK_RE.captures_iter(text).find_map(|caps| {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = match caps.get(2) {
            Some(m) => m.as_str().parse().ok()?,
            None => 0,
        };
        if !(1..=12).contains(&hour) {
            return None;
        }
        let pm = caps[3].eq_ignore_ascii_case("p");
        let hour24 = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, false) => h,
            (h, true) => h + 12,
        };
        NaiveTime::from_hms_opt(hour24, minute, 0)
    })
}

/// Month, day and optional year
fn parse_date(text: &str) -> Option<(u32, u32, Option<i32>)> {
    let caps = DATE_RE.captures(text)?;
    let month = month_number(&caps[1])?;
    let day: u32 = caps[2].parse().ok()?;
    let year = caps.get(3).and_then(|y| y.as_str().parse::<i32>().ok());
    Some((month, day, year))
}

fn month_number(abbrev: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let lower = abbrev.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|m| *m == lower)
        .map(|i| i as u32 + 1)
}

/// Unknown zone names are ignored and the clock's calendar is used instead
fn parse_zone(text: &str) -> Option<Tz> {
    let caps = ZONE_RE.captures(text)?;
    match caps[1].parse::<Tz>() {
        Ok(tz) => Some(tz),
        Err(_) => {
            tracing::debug!("Unknown timezone in deadline: {}", &caps[1]);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> ReferenceClock {
        let now = Utc.with_ymd_and_hms(2026, 2, 22, 21, 40, 0).unwrap();
        ReferenceClock::fixed(now).with_zone(chrono_tz::America::Toronto)
    }

    #[test]
    fn test_same_day_clock_time() {
        let resolved = resolve_deadline("Resets 8pm (America/Toronto)", &reference()).unwrap();
        assert_eq!(resolved.remaining_seconds, 12_000);
        assert_eq!(
            resolved.reset_at,
            Utc.with_ymd_and_hms(2026, 2, 23, 1, 0, 0).unwrap()
        );
        assert_eq!(format_remaining(resolved.remaining_seconds), "3h20m");
    }

    #[test]
    fn test_dated_clock_time() {
        let resolved =
            resolve_deadline("Resets Feb 27 at 7pm (America/Toronto)", &reference()).unwrap();
        assert_eq!(resolved.remaining_seconds, 440_400);
        assert_eq!(format_remaining(resolved.remaining_seconds), "5d 2h");
    }

    #[test]
    fn test_past_clock_time_rolls_to_tomorrow() {
        // 16:40 local; 4pm already passed today
        let resolved = resolve_deadline("Resets 4pm (America/Toronto)", &reference()).unwrap();
        assert_eq!(resolved.remaining_seconds, 23 * 3_600 + 20 * 60);
        assert!(resolved.reset_at > reference().now());
    }

    #[test]
    fn test_exact_now_rolls_to_tomorrow() {
        let resolved =
            resolve_deadline("Resets 4:40pm (America/Toronto)", &reference()).unwrap();
        assert_eq!(resolved.remaining_seconds, SECS_PER_DAY);
    }

    #[test]
    fn test_zone_differs_from_clock_zone() {
        // 06:40 on Feb 23 in Tokyo; 1am passed, so the next one is Feb 24
        let resolved = resolve_deadline("Resets 1am (Asia/Tokyo)", &reference()).unwrap();
        assert_eq!(resolved.remaining_seconds, 18 * 3_600 + 20 * 60);
        assert_eq!(
            resolved.reset_at,
            Utc.with_ymd_and_hms(2026, 2, 23, 16, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_comma_date_and_midnight() {
        let clock = reference().with_zone(chrono_tz::Asia::Tokyo);
        let resolved = resolve_deadline("Resets Mar 3, 12am (Asia/Tokyo)", &clock).unwrap();
        // Feb 23 06:40 -> Mar 3 00:00
        assert_eq!(resolved.remaining_seconds, 7 * SECS_PER_DAY + 17 * 3_600 + 20 * 60);
    }

    #[test]
    fn test_date_without_time_is_midnight() {
        let clock = reference().with_zone(chrono_tz::UTC);
        let resolved = resolve_deadline("Resets Mar 1 (UTC)", &clock).unwrap();
        assert_eq!(resolved.remaining_seconds, 526_800);
    }

    #[test]
    fn test_explicit_year() {
        let clock = reference().with_zone(chrono_tz::UTC);
        let resolved = resolve_deadline("Renews Mar 1, 2027 at 7pm", &clock).unwrap();
        assert_eq!(
            resolved.reset_at,
            Utc.with_ymd_and_hms(2027, 3, 1, 19, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_year_end_wrap() {
        let now = Utc.with_ymd_and_hms(2026, 12, 30, 12, 0, 0).unwrap();
        let clock = ReferenceClock::fixed(now).with_zone(chrono_tz::UTC);
        let resolved = resolve_deadline("Resets Jan 2 at 1am", &clock).unwrap();
        assert_eq!(
            resolved.reset_at,
            Utc.with_ymd_and_hms(2027, 1, 2, 1, 0, 0).unwrap()
        );
        assert_eq!(resolved.remaining_seconds, 219_600);
    }

    #[test]
    fn test_recent_past_date_floors_at_zero() {
        let clock = reference().with_zone(chrono_tz::UTC);
        let resolved = resolve_deadline("Resets Feb 20 at 1am", &clock).unwrap();
        assert_eq!(resolved.remaining_seconds, 0);
    }

    #[test]
    fn test_unknown_zone_uses_clock_zone() {
        let resolved = resolve_deadline("Resets 8pm (Mars/Olympus)", &reference()).unwrap();
        assert_eq!(resolved.remaining_seconds, 12_000);
    }

    #[test]
    fn test_relative_tokens() {
        let clock = reference();
        let resolved = resolve_deadline("Resets in 3d 2h", &clock).unwrap();
        assert_eq!(resolved.remaining_seconds, 3 * SECS_PER_DAY + 2 * SECS_PER_HOUR);
        assert_eq!(
            resolved.reset_at,
            clock.now() + TimeDelta::seconds(resolved.remaining_seconds as i64)
        );

        let resolved = resolve_deadline("resets in 2 Days 5 hours 10 minutes", &clock).unwrap();
        assert_eq!(resolved.remaining_seconds, 2 * 86_400 + 5 * 3_600 + 600);

        let resolved = resolve_deadline("3d2h15m", &clock).unwrap();
        assert_eq!(resolved.remaining_seconds, 3 * 86_400 + 2 * 3_600 + 900);
    }

    #[test]
    fn test_relative_is_clock_independent() {
        let a = ReferenceClock::fixed(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        let b = reference();
        let text = "Resets 4h 45m";
        assert_eq!(
            resolve_relative(text, &a).unwrap().remaining_seconds,
            resolve_relative(text, &b).unwrap().remaining_seconds
        );
    }

    #[test]
    fn test_relative_rejects_longer_words() {
        assert!(resolve_relative("within 30 months", &reference()).is_none());
        assert!(resolve_relative("7pm", &reference()).is_none());
    }

    #[test]
    fn test_unresolvable_text() {
        assert!(resolve_deadline("Resets soon", &reference()).is_none());
        assert!(resolve_deadline("", &reference()).is_none());
        assert!(resolve_deadline("Resets Feb 30 at 7pm", &reference()).is_none());
    }

    #[test]
    fn test_parse_clock_variants() {
        assert_eq!(parse_clock("7pm"), NaiveTime::from_hms_opt(19, 0, 0));
        assert_eq!(parse_clock("3:30am"), NaiveTime::from_hms_opt(3, 30, 0));
        assert_eq!(parse_clock("12am"), NaiveTime::from_hms_opt(0, 0, 0));
        assert_eq!(parse_clock("12pm"), NaiveTime::from_hms_opt(12, 0, 0));
        assert_eq!(parse_clock("11 p.m."), NaiveTime::from_hms_opt(23, 0, 0));
        assert_eq!(parse_clock("13pm"), None);
        assert_eq!(parse_clock("14% used"), None);
    }

    #[test]
    fn test_format_remaining_boundaries() {
        assert_eq!(format_remaining(0), "<1m");
        assert_eq!(format_remaining(59), "<1m");
        assert_eq!(format_remaining(60), "1m");
        assert_eq!(format_remaining(3_599), "59m");
        assert_eq!(format_remaining(3_600), "1h");
        assert_eq!(format_remaining(3_660), "1h1m");
        assert_eq!(format_remaining(86_399), "23h59m");
        assert_eq!(format_remaining(86_400), "1d");
        assert_eq!(format_remaining(90_000), "1d 1h");
        assert_eq!(format_remaining(90_059), "1d 1h");
        assert_eq!(format_remaining(6 * 86_400 + 22 * 3_600 + 59 * 60), "6d 22h");
    }

    #[test]
    fn test_format_is_stable_for_relative_phrases() {
        let resolved = resolve_relative("Resets 5d 2h", &reference()).unwrap();
        let human = format_remaining(resolved.remaining_seconds);
        assert_eq!(human, "5d 2h");
        let again = resolve_relative(&human, &reference()).unwrap();
        assert_eq!(again.remaining_seconds, resolved.remaining_seconds);
    }
}
