use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Supported check frequencies. Closed set; extending it means adding a
/// variant here plus the matching timer cadence, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IntervalClass {
    FiveMinutes,
    OneHour,
    OneDay,
}

impl IntervalClass {
    /// Canonical spelling used in the database and on the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalClass::FiveMinutes => "5m",
            IntervalClass::OneHour => "1h",
            IntervalClass::OneDay => "24h",
        }
    }

    /// Timer period for this class.
    pub fn period(&self) -> Duration {
        match self {
            IntervalClass::FiveMinutes => Duration::from_secs(5 * 60),
            IntervalClass::OneHour => Duration::from_secs(60 * 60),
            IntervalClass::OneDay => Duration::from_secs(24 * 60 * 60),
        }
    }

    pub const ALL: [IntervalClass; 3] =
        [IntervalClass::FiveMinutes, IntervalClass::OneHour, IntervalClass::OneDay];
}

impl fmt::Display for IntervalClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for IntervalClass {
    type Err = UnsupportedInterval;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "5m" => Ok(IntervalClass::FiveMinutes),
            "1h" => Ok(IntervalClass::OneHour),
            "24h" => Ok(IntervalClass::OneDay),
            other => Err(UnsupportedInterval(other.to_string())),
        }
    }
}

impl TryFrom<String> for IntervalClass {
    type Error = UnsupportedInterval;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IntervalClass> for String {
    fn from(value: IntervalClass) -> Self {
        value.as_str().to_string()
    }
}

/// Rejected at assignment time; never silently coerced to a default.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported interval {0:?}, expected one of: 5m, 1h, 24h")]
pub struct UnsupportedInterval(pub String);

/// A (owner, url) pair under monitoring with its check interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredTarget {
    pub owner: String,
    pub url: String,
    pub interval: IntervalClass,
}

impl MonitoredTarget {
    pub fn new(owner: impl Into<String>, url: impl Into<String>, interval: IntervalClass) -> Self {
        Self { owner: owner.into(), url: url.into(), interval }
    }
}

/// One immutable outcome record of checking a single url at a point in time.
/// Appended to the uptime log; duplicates are expected and all retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub owner: String,
    pub url: String,
    pub up: bool,
    pub observed_at: DateTime<Utc>,
}

impl ProbeResult {
    pub fn observed_now(owner: impl Into<String>, url: impl Into<String>, up: bool) -> Self {
        Self { owner: owner.into(), url: url.into(), up, observed_at: Utc::now() }
    }
}

/// Emitted by the scheduler when a target transitions from up to down.
/// Consumed by the notifier seam, distinct from routine logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownEvent {
    pub owner: String,
    pub url: String,
    pub observed_at: DateTime<Utc>,
}

/// Sort direction for uptime log queries. Consumers re-sort as needed, so
/// the store exposes both directions rather than a fixed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_round_trips_through_canonical_spelling() {
        for class in IntervalClass::ALL {
            assert_eq!(class.as_str().parse::<IntervalClass>().unwrap(), class);
        }
    }

    #[test]
    fn unsupported_interval_is_rejected() {
        let err = "2m".parse::<IntervalClass>().unwrap_err();
        assert_eq!(err, UnsupportedInterval("2m".to_string()));
        assert!("".parse::<IntervalClass>().is_err());
        assert!("5min".parse::<IntervalClass>().is_err());
    }

    #[test]
    fn periods_are_ordered_like_the_classes() {
        assert!(IntervalClass::FiveMinutes.period() < IntervalClass::OneHour.period());
        assert!(IntervalClass::OneHour.period() < IntervalClass::OneDay.period());
    }
}
