use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;

/// Injectable wall clock. Production code uses `SystemClock`; tests can swap
/// in a fixed clock to make working-hours suppression and cooldown windows
/// deterministic.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// A project's local-time working-hours window. `start`/`end` are wall-clock
/// times in `timezone`; `end` is exclusive.
#[derive(Debug, Clone)]
pub struct WorkHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub timezone: Tz,
}

impl WorkHours {
    /// True if `now` (UTC) falls within `[start, end)` once converted to
    /// the project's local timezone.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.timezone);
        let t = local.time();
        if self.start <= self.end {
            t >= self.start && t < self.end
        } else {
            // Window wraps past midnight (e.g. 22:00-06:00).
            t >= self.start || t < self.end
        }
    }
}

/// Parses a `HH:MM` time string. Used for `workHoursStart`/`workHoursEnd`.
pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").ok()
}

/// Parses an IANA timezone name, falling back to UTC on failure so a
/// malformed project timezone degrades to "always included" rather than
/// panicking the wake aggregator.
pub fn parse_tz(s: &str) -> Tz {
    s.parse().unwrap_or(chrono_tz::UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn working_hours_window_excludes_outside_range() {
        let wh = WorkHours {
            start: parse_hhmm("09:00").unwrap(),
            end: parse_hhmm("17:00").unwrap(),
            timezone: parse_tz("America/Chicago"),
        };
        // 03:00 CT == 08:00 or 09:00 UTC depending on DST; pick a clearly-outside UTC instant.
        let early = Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap(); // 03:00 CST
        let mid = Utc.with_ymd_and_hms(2026, 1, 15, 16, 0, 0).unwrap(); // 10:00 CST
        assert!(!wh.contains(early));
        assert!(wh.contains(mid));
    }

    #[test]
    fn bad_timezone_falls_back_to_utc() {
        assert_eq!(parse_tz("Not/AZone"), chrono_tz::UTC);
    }
}
