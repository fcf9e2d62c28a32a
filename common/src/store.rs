use thiserror::Error;

use crate::{config::PersistedConfig, window::TimeWindow};

/// One persisted field, written by the setter that changed it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PersistedEntry {
    OnThreshold(f32),
    OffThreshold(f32),
    NightLedDuty(u32),
    MainLedDuty(u32),
    LightThreshold(u16),
    DebounceMs(u32),
    MasterSwitch(bool),
    MainLed(bool),
    NightWindow(TimeWindow),
}

impl PersistedEntry {
    pub fn key(&self) -> &'static str {
        match self {
            Self::OnThreshold(_) => "tempOn",
            Self::OffThreshold(_) => "tempOff",
            Self::NightLedDuty(_) => "brightness",
            Self::MainLedDuty(_) => "mainLedBrightness",
            Self::LightThreshold(_) => "lightThreshold",
            Self::DebounceMs(_) => "debounceDelay",
            Self::MasterSwitch(_) => "proximityManualState",
            Self::MainLed(_) => "mainLedManualState",
            Self::NightWindow(_) => "nightWindow",
        }
    }

    pub fn apply_to(&self, config: &mut PersistedConfig) {
        match *self {
            Self::OnThreshold(value) => config.on_threshold_c = value,
            Self::OffThreshold(value) => config.off_threshold_c = value,
            Self::NightLedDuty(duty) => config.night_led_duty = duty,
            Self::MainLedDuty(duty) => config.main_led_duty = duty,
            Self::LightThreshold(value) => config.light_threshold = value,
            Self::DebounceMs(ms) => config.debounce_ms = ms,
            Self::MasterSwitch(on) => config.master_switch_on = on,
            Self::MainLed(on) => config.main_led_on = on,
            Self::NightWindow(window) => config.night_window = window,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

/// Durable key/value capability. The controller commits in-memory state
/// regardless of the result.
pub trait ConfigStore {
    fn put(&mut self, entry: PersistedEntry) -> Result<(), StoreError>;
}

/// Store kept in memory, for tests and for running without flash.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub config: PersistedConfig,
    pub writes: Vec<PersistedEntry>,
    pub fail_writes: bool,
}

impl ConfigStore for MemoryStore {
    fn put(&mut self, entry: PersistedEntry) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError("storage unavailable".to_string()));
        }
        entry.apply_to(&mut self.config);
        self.writes.push(entry);
        Ok(())
    }
}
