use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatingMode {
    #[default]
    Automated,
    ManualPermanent,
    ManualTimed,
}

impl OperatingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Automated => "Automated",
            Self::ManualPermanent => "Manual (Permanent)",
            Self::ManualTimed => "Manual (Timed)",
        }
    }

    pub fn is_manual(self) -> bool {
        !matches!(self, Self::Automated)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NightLightPolicy {
    /// Night LED follows the debounced "dark enough" reading.
    #[default]
    LightSensor,
    /// Night LED follows the daily time window.
    Schedule,
    /// Window active and dark enough.
    Both,
}

impl NightLightPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LightSensor => "light_sensor",
            Self::Schedule => "schedule",
            Self::Both => "both",
        }
    }
}

/// Actuator levels the control loop wants written this tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActuatorOutputs {
    pub fan_on: bool,
    pub main_led_duty: u32,
    pub night_led_duty: u32,
}

/// Platform health values passed through to the status snapshot uninterpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub free_heap_bytes: Option<u32>,
    pub boot_abnormal: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub light: u16,
    pub gpio_status: &'static str,
    pub master_switch_state: &'static str,
    pub main_led_status: &'static str,
    pub control_mode: &'static str,
    pub override_active: bool,
    pub override_remaining_ms: Option<u64>,
    pub ldr_brightness_level: f32,
    pub main_led_brightness_level: f32,
    pub night_led_duty: u32,
    pub main_led_duty: u32,
    pub temp_on_threshold: f32,
    pub temp_off_threshold: f32,
    pub light_threshold: u16,
    pub debounce_delay_ms: u32,
    pub night_light_policy: &'static str,
    pub night_window_start: String,
    pub night_window_end: String,
    pub sensor_valid: bool,
    pub sensor_faults: u32,
    pub clock_synced: bool,
    pub uptime_ms: u64,
    pub free_heap_bytes: Option<u32>,
    pub boot_abnormal: bool,
}

/// Body of one remote event-log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub event_message: String,
}

pub fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}
