use std::fmt;

use chrono::Timelike;
use serde::{Deserialize, Serialize};

use crate::error::ControlError;

/// Milliseconds elapsed on the monotonic tick counter since `since_ms`.
///
/// Wrapping subtraction keeps the result correct across a counter rollover.
pub fn elapsed_ms(now_ms: u64, since_ms: u64) -> u64 {
    now_ms.wrapping_sub(since_ms)
}

/// Wall-clock time of day, minute resolution.
///
/// Only the night-light window consumes this. Debounce and timeout math use
/// the monotonic tick counter exclusively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn from_chrono<T: Timelike>(time: &T) -> Self {
        Self {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
        }
    }

    pub fn from_minutes(minutes: u16) -> Option<Self> {
        Self::new((minutes / 60) as u8, (minutes % 60) as u8)
    }

    pub fn minutes_since_midnight(self) -> u16 {
        self.hour as u16 * 60 + self.minute as u16
    }

    /// Parses `HH:MM`.
    pub fn parse(value: &str) -> Result<Self, ControlError> {
        let invalid = || ControlError::InvalidParameter(format!("invalid time of day `{value}`"));

        let (hour, minute) = value.trim().split_once(':').ok_or_else(invalid)?;
        let hour = hour.parse::<u8>().map_err(|_| invalid())?;
        let minute = minute.parse::<u8>().map_err(|_| invalid())?;
        Self::new(hour, minute).ok_or_else(invalid)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}
