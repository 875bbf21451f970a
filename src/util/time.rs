use chrono::{DateTime, SecondsFormat, Utc};

/// Source of the current time.
///
/// Newsfeed entries are stamped with the time they were fanned out
/// and statistics windows are measured from "now", so both are
/// injected with a clock instead of calling [`Utc::now`] directly.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that never moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Formats a timestamp as RFC 3339 in UTC with second precision,
/// e.g. `2024-03-01T08:15:00Z`.
///
/// Every formatted timestamp has the same width, so comparing two
/// of them as text gives the same answer as comparing the instants.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn formatted_timestamps_sort_chronologically() {
        let early = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        let late = early + Duration::seconds(1);

        let (early, late) = (format_timestamp(early), format_timestamp(late));
        assert_eq!(early, "2023-12-31T23:59:59Z");
        assert_eq!(late, "2024-01-01T00:00:00Z");
        assert!(early < late);
    }

    #[test]
    fn fixed_clock_does_not_move() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let clock = FixedClock(at);
        assert_eq!(clock.now(), at);
        assert_eq!((&clock).now(), at);
    }
}
