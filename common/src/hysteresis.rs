use serde::{Deserialize, Serialize};

use crate::error::ControlError;

/// Hysteresis band for the fan. `on_threshold > off_threshold` always holds
/// for values produced by this module.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub on_threshold: f32,
    pub off_threshold: f32,
}

impl Thresholds {
    pub fn new(on_threshold: f32, off_threshold: f32) -> Result<Self, ControlError> {
        check_finite("on-threshold", on_threshold)?;
        check_finite("off-threshold", off_threshold)?;
        if on_threshold <= off_threshold {
            return Err(ControlError::InvariantViolation {
                on: on_threshold,
                off: off_threshold,
            });
        }
        Ok(Self {
            on_threshold,
            off_threshold,
        })
    }

    pub fn with_on(self, on_threshold: f32) -> Result<Self, ControlError> {
        Self::new(on_threshold, self.off_threshold)
    }

    pub fn with_off(self, off_threshold: f32) -> Result<Self, ControlError> {
        Self::new(self.on_threshold, off_threshold)
    }
}

fn check_finite(name: &str, value: f32) -> Result<(), ControlError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ControlError::InvalidParameter(format!(
            "{name} must be a finite number"
        )))
    }
}

/// Next actuator state for `reading`. Never toggles strictly inside the band;
/// a NaN reading leaves `current` unchanged.
pub fn evaluate(reading: f32, thresholds: Thresholds, current: bool) -> bool {
    if !current && reading >= thresholds.on_threshold {
        true
    } else if current && reading <= thresholds.off_threshold {
        false
    } else {
        current
    }
}
