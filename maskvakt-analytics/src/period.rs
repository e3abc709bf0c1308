//! Named query periods and their time windows.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    /// Since midnight UTC.
    Today,
    /// The last 7 days.
    Week,
    /// The last 30 days.
    Month,
    /// The last 24 hours. Used for unrecognised period names.
    LastDay,
    Custom {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl Period {
    /// `(start, end)` relative to `now`; both bounds inclusive.
    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        match *self {
            Period::Today => {
                let midnight = now
                    .date_naive()
                    .and_hms_opt(0, 0, 0)
                    .map(|t| t.and_utc())
                    .unwrap_or(now);
                (midnight, now)
            }
            Period::Week => (now - Duration::days(7), now),
            Period::Month => (now - Duration::days(30), now),
            Period::LastDay => (now - Duration::days(1), now),
            Period::Custom { start, end } => (start, end),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Period::Today => "today".into(),
            Period::Week => "week".into(),
            Period::Month => "month".into(),
            Period::LastDay => "day".into(),
            Period::Custom { start, end } => {
                format!("{}..{}", start.to_rfc3339(), end.to_rfc3339())
            }
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for Period {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "today" => Period::Today,
            "week" => Period::Week,
            "month" => Period::Month,
            _ => Period::LastDay,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn windows_end_at_now() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 15, 45, 0).unwrap();
        assert_eq!(
            Period::Today.window(now),
            (Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap(), now)
        );
        assert_eq!(Period::Week.window(now).0, Utc.with_ymd_and_hms(2024, 3, 3, 15, 45, 0).unwrap());
        assert_eq!(Period::Month.window(now).0, Utc.with_ymd_and_hms(2024, 2, 9, 15, 45, 0).unwrap());
        assert_eq!(Period::LastDay.window(now).0, Utc.with_ymd_and_hms(2024, 3, 9, 15, 45, 0).unwrap());
    }

    #[test]
    fn unknown_names_fall_back_to_last_day() {
        assert_eq!("TODAY".parse::<Period>(), Ok(Period::Today));
        assert_eq!("week".parse::<Period>(), Ok(Period::Week));
        assert_eq!("quarter".parse::<Period>(), Ok(Period::LastDay));
    }
}
