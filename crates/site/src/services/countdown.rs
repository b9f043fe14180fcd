//! Launch countdown arithmetic.

use std::str::FromStr;

use chrono::{DateTime, Datelike, Months, Utc};
use serde::Serialize;

/// What the countdown shows once the launch date has passed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CountdownMode {
    /// Count down to the same date in the next year that is still ahead.
    #[default]
    RollOver,
    /// Show zeros.
    Stop,
}

impl FromStr for CountdownMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "roll-over" | "rollover" => Ok(Self::RollOver),
            "stop" => Ok(Self::Stop),
            other => Err(format!("expected roll-over or stop, got '{other}'")),
        }
    }
}

/// Whole days, hours, minutes and seconds until the target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimeRemaining {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl TimeRemaining {
    fn from_seconds(total: i64) -> Self {
        if total <= 0 {
            return Self::default();
        }
        Self {
            days: total / 86_400,
            hours: (total % 86_400) / 3_600,
            minutes: (total % 3_600) / 60,
            seconds: total % 60,
        }
    }

    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.days == 0 && self.hours == 0 && self.minutes == 0 && self.seconds == 0
    }
}

/// Countdown snapshot served to the page script.
#[derive(Debug, Clone, Serialize)]
pub struct CountdownSnapshot {
    #[serde(flatten)]
    pub remaining: TimeRemaining,
    pub target: Option<DateTime<Utc>>,
}

/// Counts down to the launch date.
#[derive(Debug, Clone, Copy)]
pub struct LaunchCountdown {
    launch_at: DateTime<Utc>,
    mode: CountdownMode,
}

impl LaunchCountdown {
    #[must_use]
    pub const fn new(launch_at: DateTime<Utc>, mode: CountdownMode) -> Self {
        Self { launch_at, mode }
    }

    /// The instant being counted down to, or `None` once a stopped countdown
    /// has run out.
    #[must_use]
    pub fn target(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.launch_at > now {
            return Some(self.launch_at);
        }
        match self.mode {
            CountdownMode::Stop => None,
            CountdownMode::RollOver => {
                // Always offset from the launch date so Feb 29 comes back in
                // leap years.
                let mut years = u32::try_from(now.year() - self.launch_at.year())
                    .unwrap_or(0)
                    .max(1);
                loop {
                    let target = self
                        .launch_at
                        .checked_add_months(Months::new(years.checked_mul(12)?))?;
                    if target > now {
                        return Some(target);
                    }
                    years += 1;
                }
            }
        }
    }

    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> TimeRemaining {
        self.target(now)
            .map(|target| TimeRemaining::from_seconds((target - now).num_seconds()))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn snapshot(&self, now: DateTime<Utc>) -> CountdownSnapshot {
        CountdownSnapshot {
            remaining: self.remaining(now),
            target: self.target(now),
        }
    }

    /// Target date as shown in the headline, e.g. "October 1st".
    #[must_use]
    pub fn target_label(&self, now: DateTime<Utc>) -> String {
        let date = self.target(now).unwrap_or(self.launch_at);
        let day = date.day();
        let suffix = match (day % 10, day % 100) {
            (_, 11..=13) => "th",
            (1, _) => "st",
            (2, _) => "nd",
            (3, _) => "rd",
            _ => "th",
        };
        format!("{} {day}{suffix}", date.format("%B"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_remaining_splits_units() {
        let countdown = LaunchCountdown::new(at("2025-10-01T00:00:00Z"), CountdownMode::Stop);
        let remaining = countdown.remaining(at("2025-09-28T21:58:30Z"));
        assert_eq!(
            remaining,
            TimeRemaining {
                days: 2,
                hours: 2,
                minutes: 1,
                seconds: 30,
            }
        );
    }

    #[test]
    fn test_stop_mode_shows_zero_after_launch() {
        let countdown = LaunchCountdown::new(at("2025-10-01T00:00:00Z"), CountdownMode::Stop);
        let now = at("2025-10-01T00:00:00Z");
        assert!(countdown.remaining(now).is_zero());
        assert_eq!(countdown.target(now), None);
        assert!(countdown.remaining(at("2026-01-01T00:00:00Z")).is_zero());
    }

    #[test]
    fn test_roll_over_targets_next_year() {
        let countdown = LaunchCountdown::new(at("2024-10-01T00:00:00Z"), CountdownMode::RollOver);
        assert_eq!(
            countdown.target(at("2024-12-25T12:00:00Z")),
            Some(at("2025-10-01T00:00:00Z"))
        );
        assert_eq!(
            countdown.target(at("2026-10-19T00:00:00Z")),
            Some(at("2027-10-01T00:00:00Z"))
        );
        let remaining = countdown.remaining(at("2025-09-30T23:59:59Z"));
        assert_eq!(remaining.seconds, 1);
        assert_eq!(remaining.days, 0);
    }

    #[test]
    fn test_roll_over_keeps_leap_day() {
        let countdown = LaunchCountdown::new(at("2024-02-29T00:00:00Z"), CountdownMode::RollOver);
        assert_eq!(
            countdown.target(at("2024-03-01T00:00:00Z")),
            Some(at("2025-02-28T00:00:00Z"))
        );
        assert_eq!(
            countdown.target(at("2027-06-01T00:00:00Z")),
            Some(at("2028-02-29T00:00:00Z"))
        );
    }

    #[test]
    fn test_target_label() {
        let countdown = LaunchCountdown::new(at("2025-10-01T00:00:00Z"), CountdownMode::RollOver);
        assert_eq!(countdown.target_label(at("2025-06-01T00:00:00Z")), "October 1st");

        let countdown = LaunchCountdown::new(at("2025-03-12T00:00:00Z"), CountdownMode::Stop);
        assert_eq!(countdown.target_label(at("2025-06-01T00:00:00Z")), "March 12th");

        let countdown = LaunchCountdown::new(at("2025-03-22T00:00:00Z"), CountdownMode::Stop);
        assert_eq!(countdown.target_label(at("2025-01-01T00:00:00Z")), "March 22nd");
    }

    #[test]
    fn test_snapshot_json() {
        let countdown = LaunchCountdown::new(at("2025-10-01T00:00:00Z"), CountdownMode::Stop);
        let json = serde_json::to_value(countdown.snapshot(at("2025-09-30T23:00:00Z"))).unwrap();
        assert_eq!(json["hours"], 1);
        assert_eq!(json["days"], 0);
        assert!(json["target"].is_string());
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("roll-over".parse::<CountdownMode>().unwrap(), CountdownMode::RollOver);
        assert_eq!("STOP".parse::<CountdownMode>().unwrap(), CountdownMode::Stop);
        assert!("pause".parse::<CountdownMode>().is_err());
    }
}
