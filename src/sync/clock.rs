//! Time source and timestamp encoding.
//!
//! All timestamps are stored as RFC 3339 UTC text with millisecond precision, so
//! string order matches time order. SQL comparisons still go through `julianday()`
//! to tolerate rows written by other tools in SQLite's `YYYY-MM-DD HH:MM:SS` form.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeDelta, Utc};
use std::sync::Mutex;

/// Source of "now" for the decision engine and log timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Used to step across freshness thresholds.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: TimeDelta) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = to;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse RFC 3339 or SQLite's `YYYY-MM-DD HH:MM:SS[.fff]` (taken as UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(TimeDelta::minutes(61));
        assert_eq!(clock.now(), start + TimeDelta::minutes(61));
    }

    #[test]
    fn timestamps_round_trip() {
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap() + TimeDelta::milliseconds(89);
        let text = format_timestamp(at);
        assert_eq!(text, "2026-03-04T05:06:07.089Z");
        assert_eq!(parse_timestamp(&text), Some(at));
    }

    #[test]
    fn sqlite_datetime_format_is_accepted() {
        let parsed = parse_timestamp("2026-03-04 05:06:07").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
