use serde::{Deserialize, Serialize};

use crate::{clock::TimeOfDay, error::ControlError};

/// Daily on/off window. `start > end` means the window spans midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self {
            start: TimeOfDay { hour: 19, minute: 15 },
            end: TimeOfDay { hour: 7, minute: 15 },
        }
    }
}

impl TimeWindow {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Self {
        Self { start, end }
    }

    pub fn is_active(&self, now: TimeOfDay) -> bool {
        let now = now.minutes_since_midnight();
        let start = self.start.minutes_since_midnight();
        let end = self.end.minutes_since_midnight();

        if start <= end {
            start <= now && now < end
        } else {
            now >= start || now < end
        }
    }

    /// `ClockUnsynchronized` when no wall-clock time is available yet; callers
    /// treat that as an inactive window.
    pub fn evaluate(&self, now: Option<TimeOfDay>) -> Result<bool, ControlError> {
        now.map(|time| self.is_active(time))
            .ok_or(ControlError::ClockUnsynchronized)
    }
}
