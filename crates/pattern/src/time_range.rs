//! `time_range` condition matching (§4.1): wall-clock in a named IANA
//! zone within an inclusive `[start, end]` window, wrapping past midnight
//! when `end < start`.

use chrono::{DateTime, Timelike, Utc};
use sp_domain::TimeRange;
use std::str::FromStr;

fn parse_hhmm(s: &str) -> Option<(u32, u32)> {
    let (h, m) = s.split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some((h, m))
}

pub fn matches(tr: &TimeRange, now: DateTime<Utc>) -> bool {
    let tz = match chrono_tz::Tz::from_str(&tr.timezone) {
        Ok(tz) => tz,
        Err(e) => {
            tracing::warn!(zone = %tr.timezone, error = %e, "unknown time zone, treating as UTC");
            chrono_tz::UTC
        }
    };
    let Some((start_h, start_m)) = parse_hhmm(&tr.start) else {
        tracing::warn!(start = %tr.start, "invalid time_range.start");
        return false;
    };
    let Some((end_h, end_m)) = parse_hhmm(&tr.end) else {
        tracing::warn!(end = %tr.end, "invalid time_range.end");
        return false;
    };

    let local = now.with_timezone(&tz);
    let minute_of_day = local.hour() * 60 + local.minute();
    let start = start_h * 60 + start_m;
    let end = end_h * 60 + end_m;

    if end < start {
        minute_of_day >= start || minute_of_day <= end
    } else {
        minute_of_day >= start && minute_of_day <= end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 30, hour, minute, 0).unwrap()
    }

    #[test]
    fn simple_window_matches_inside_and_excludes_outside() {
        let tr = TimeRange { start: "09:00".into(), end: "17:00".into(), timezone: "UTC".into() };
        assert!(matches(&tr, at(12, 0)));
        assert!(matches(&tr, at(9, 0)));
        assert!(matches(&tr, at(17, 0)));
        assert!(!matches(&tr, at(8, 59)));
        assert!(!matches(&tr, at(17, 1)));
    }

    #[test]
    fn wrapping_window_spans_midnight() {
        let tr = TimeRange { start: "22:00".into(), end: "06:00".into(), timezone: "UTC".into() };
        assert!(matches(&tr, at(23, 30)));
        assert!(matches(&tr, at(2, 0)));
        assert!(!matches(&tr, at(12, 0)));
    }

    #[test]
    fn unknown_timezone_falls_back_to_utc() {
        let tr = TimeRange { start: "09:00".into(), end: "17:00".into(), timezone: "Not/AZone".into() };
        assert!(matches(&tr, at(12, 0)));
    }
}
