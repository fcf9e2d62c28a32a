use serde::{Deserialize, Serialize};

use crate::{hysteresis::Thresholds, types::NightLightPolicy, window::TimeWindow};

/// Fixed tunables, not changed by commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub sensor_interval_ms: u64,
    pub temperature_offset_c: f32,
    pub humidity_offset: f32,
    pub switch_debounce_ms: u64,
    pub pwm_max_duty: u32,
    pub night_light_policy: NightLightPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            sensor_interval_ms: 10_000,
            temperature_offset_c: -0.1,
            humidity_offset: 6.0,
            switch_debounce_ms: 50,
            pwm_max_duty: 8_191,
            night_light_policy: NightLightPolicy::LightSensor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedConfig {
    pub on_threshold_c: f32,
    pub off_threshold_c: f32,
    pub night_led_duty: u32,
    pub main_led_duty: u32,
    pub light_threshold: u16,
    pub debounce_ms: u32,
    pub night_led_pwm_hz: u32,
    pub main_led_pwm_hz: u32,
    pub master_switch_on: bool,
    pub main_led_on: bool,
    pub night_window: TimeWindow,
}

impl Default for PersistedConfig {
    fn default() -> Self {
        Self {
            on_threshold_c: 29.0,
            off_threshold_c: 28.5,
            night_led_duty: 4_096,
            main_led_duty: 8_191,
            light_threshold: 2_350,
            debounce_ms: 50,
            night_led_pwm_hz: 5_000,
            main_led_pwm_hz: 5_000,
            master_switch_on: false,
            main_led_on: false,
            night_window: TimeWindow::default(),
        }
    }
}

impl PersistedConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            on_threshold: self.on_threshold_c,
            off_threshold: self.off_threshold_c,
        }
    }

    /// Repairs values a corrupted or hand-edited store could carry.
    pub fn sanitize(&mut self, pwm_max_duty: u32) {
        if Thresholds::new(self.on_threshold_c, self.off_threshold_c).is_err() {
            let defaults = Self::default();
            self.on_threshold_c = defaults.on_threshold_c;
            self.off_threshold_c = defaults.off_threshold_c;
        }

        self.night_led_duty = self.night_led_duty.min(pwm_max_duty);
        self.main_led_duty = self.main_led_duty.min(pwm_max_duty);
        self.night_led_pwm_hz = self.night_led_pwm_hz.clamp(100, 40_000);
        self.main_led_pwm_hz = self.main_led_pwm_hz.clamp(100, 40_000);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub use_static_ip: bool,
    pub static_ip: Option<[u8; 4]>,
    pub gateway: Option<[u8; 4]>,
    pub subnet: Option<[u8; 4]>,
    pub dns: Option<[u8; 4]>,
    pub log_sink_url: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            use_static_ip: true,
            static_ip: Some([192, 168, 1, 4]),
            gateway: Some([192, 168, 1, 1]),
            subnet: Some([255, 255, 255, 0]),
            dns: None,
            log_sink_url: "http://192.168.1.3:5001/log".to_string(),
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub controller: ControllerConfig,
    pub settings: PersistedConfig,
    pub timezone: String,
    pub network: NetworkConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            settings: PersistedConfig::default(),
            timezone: "Asia/Kuala_Lumpur".to_string(),
            network: NetworkConfig::default(),
        }
    }
}
