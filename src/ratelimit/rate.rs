//! Rate configuration: how many byte admissions per time window.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ThrottleError};

/// Time unit for rates, in the same vocabulary as configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Get the duration of this time unit.
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(3600),
            TimeUnit::Day => Duration::from_secs(86400),
        }
    }
}

/// At most `count` admissions per `window`.
///
/// A limiter built from a `Rate` lets the first `count` admissions through
/// at once and then spaces the rest [`interval`](Rate::interval) apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rate {
    window: Duration,
    count: u32,
}

impl Rate {
    /// Create a rate of `count` admissions per `window`.
    ///
    /// Fails if `count` is zero, `window` is zero, or `window / count` is
    /// shorter than a nanosecond.
    pub fn new(window: Duration, count: u32) -> Result<Self> {
        if count == 0 {
            return Err(ThrottleError::InvalidRate(
                "count must be greater than zero".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(ThrottleError::InvalidRate(
                "window must be greater than zero".to_string(),
            ));
        }
        if (window / count).is_zero() {
            return Err(ThrottleError::InvalidRate(format!(
                "{count} admissions per {window:?} leaves no time between admissions"
            )));
        }
        Ok(Self { window, count })
    }

    /// `n` admissions per `unit`.
    pub fn per(unit: TimeUnit, n: u32) -> Result<Self> {
        Self::new(unit.duration(), n)
    }

    /// `n` admissions per second.
    pub fn per_second(n: u32) -> Result<Self> {
        Self::per(TimeUnit::Second, n)
    }

    /// `n` admissions per minute.
    pub fn per_minute(n: u32) -> Result<Self> {
        Self::per(TimeUnit::Minute, n)
    }

    /// `n` admissions per hour.
    pub fn per_hour(n: u32) -> Result<Self> {
        Self::per(TimeUnit::Hour, n)
    }

    /// `n` admissions per day.
    pub fn per_day(n: u32) -> Result<Self> {
        Self::per(TimeUnit::Day, n)
    }

    /// The window the count applies to.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admissions allowed per window; also the burst allowance.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Nominal spacing between paced admissions.
    pub fn interval(&self) -> Duration {
        self.window / self.count
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:?}", self.count, self.window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_unit_duration() {
        assert_eq!(TimeUnit::Second.duration(), Duration::from_secs(1));
        assert_eq!(TimeUnit::Minute.duration(), Duration::from_secs(60));
        assert_eq!(TimeUnit::Hour.duration(), Duration::from_secs(3600));
        assert_eq!(TimeUnit::Day.duration(), Duration::from_secs(86400));
    }

    #[test]
    fn test_per_second() {
        let rate = Rate::per_second(5).unwrap();
        assert_eq!(rate.window(), Duration::from_secs(1));
        assert_eq!(rate.count(), 5);
        assert_eq!(rate.interval(), Duration::from_millis(200));
    }

    #[test]
    fn test_per_minute() {
        let rate = Rate::per_minute(120).unwrap();
        assert_eq!(rate.window(), Duration::from_secs(60));
        assert_eq!(rate.interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_per_hour_and_day() {
        assert_eq!(Rate::per_hour(60).unwrap().interval(), Duration::from_secs(60));
        assert_eq!(Rate::per_day(24).unwrap().interval(), Duration::from_secs(3600));
    }

    #[test]
    fn test_zero_count_rejected() {
        let err = Rate::per_second(0).unwrap_err();
        assert!(matches!(err, ThrottleError::InvalidRate(_)));
    }

    #[test]
    fn test_zero_window_rejected() {
        let err = Rate::new(Duration::ZERO, 10).unwrap_err();
        assert!(matches!(err, ThrottleError::InvalidRate(_)));
    }

    #[test]
    fn test_sub_nanosecond_interval_rejected() {
        assert!(Rate::new(Duration::from_nanos(3), 4).is_err());
        assert!(Rate::new(Duration::from_nanos(4), 4).is_ok());
    }

    #[test]
    fn test_display() {
        let rate = Rate::per_second(5).unwrap();
        assert_eq!(rate.to_string(), "5/1s");
    }
}
