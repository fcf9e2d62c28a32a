use crate::{
    clock::TimeOfDay,
    config::{ControllerConfig, PersistedConfig},
    debounce::{DebouncedInput, Edge},
    error::ControlError,
    events::{ControlEvent, EventSink},
    hysteresis::{self, Thresholds},
    mode::FanArbiter,
    sensor::{ClimateReading, ClimateSensor, SensorSampler},
    store::{ConfigStore, PersistedEntry},
    types::{on_off, ActuatorOutputs, ControllerStatus, Diagnostics, NightLightPolicy, OperatingMode},
    window::TimeWindow,
};

/// Raw samples for one tick. `now_ms` is the monotonic tick counter;
/// `time_of_day` is wall-clock and `None` until the clock is synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickInputs {
    pub now_ms: u64,
    pub master_switch_raw: bool,
    pub main_led_switch_raw: bool,
    pub light_raw: u16,
    pub time_of_day: Option<TimeOfDay>,
}

/// The single owner of control state and the only writer of actuator levels.
///
/// Commands from the HTTP layer and `tick` must be serialized by the caller.
#[derive(Debug)]
pub struct RoomController<S, E> {
    config: ControllerConfig,
    settings: PersistedConfig,
    store: S,
    events: E,

    sampler: SensorSampler,
    master_switch: DebouncedInput,
    main_led_switch: DebouncedInput,
    dark: DebouncedInput,
    fan: FanArbiter,
    outputs: ActuatorOutputs,
    night_active: bool,

    temperature_c: Option<f32>,
    humidity: Option<f32>,
    light_raw: u16,
    last_read_failed: bool,
    sensor_faults: u32,

    clock_synced: bool,
    clock_warned: bool,
    started_ms: u64,
}

impl<S: ConfigStore, E: EventSink> RoomController<S, E> {
    pub fn new(
        config: ControllerConfig,
        mut settings: PersistedConfig,
        store: S,
        events: E,
        boot: &TickInputs,
    ) -> Self {
        settings.sanitize(config.pwm_max_duty);

        let dark_raw = boot.light_raw < settings.light_threshold;
        let mut controller = Self {
            sampler: SensorSampler::new(config.sensor_interval_ms),
            master_switch: DebouncedInput::new(
                boot.master_switch_raw,
                boot.now_ms,
                config.switch_debounce_ms,
            ),
            main_led_switch: DebouncedInput::new(
                boot.main_led_switch_raw,
                boot.now_ms,
                config.switch_debounce_ms,
            ),
            dark: DebouncedInput::new(dark_raw, boot.now_ms, settings.debounce_ms as u64),
            fan: FanArbiter::default(),
            outputs: ActuatorOutputs::default(),
            night_active: false,
            temperature_c: None,
            humidity: None,
            light_raw: boot.light_raw,
            last_read_failed: false,
            sensor_faults: 0,
            clock_synced: boot.time_of_day.is_some(),
            clock_warned: false,
            started_ms: boot.now_ms,
            config,
            settings,
            store,
            events,
        };

        controller.events.emit(ControlEvent::SystemStarted);
        controller.events.emit(ControlEvent::InitialState {
            master_on: controller.settings.master_switch_on,
            main_led_on: controller.settings.main_led_on,
        });
        controller.apply_master_state();
        if controller.settings.master_switch_on {
            controller.reconcile_night_light(boot.time_of_day, boot.now_ms);
        }
        controller
    }

    pub fn report_boot(&mut self, abnormal: bool) {
        if abnormal {
            self.events.emit(ControlEvent::AbnormalBoot);
        }
    }

    /// Runs one reconciliation pass and returns the levels to write.
    pub fn tick<C: ClimateSensor + ?Sized>(
        &mut self,
        inputs: &TickInputs,
        sensor: &mut C,
    ) -> ActuatorOutputs {
        let now_ms = inputs.now_ms;
        self.clock_synced = inputs.time_of_day.is_some();

        if self.sampler.poll(now_ms) {
            let reading = sensor.read();
            self.apply_reading(reading);
        }
        self.light_raw = inputs.light_raw;

        if self.master_switch.update(inputs.master_switch_raw, now_ms) == Some(Edge::RisingLatched)
        {
            self.flip_master_switch();
        }

        // Gate is the master state at the moment the edge fires.
        if self.main_led_switch.update(inputs.main_led_switch_raw, now_ms)
            == Some(Edge::RisingLatched)
            && self.settings.master_switch_on
        {
            self.flip_main_led();
        }

        if self.settings.master_switch_on && self.fan.expire_if_due(now_ms) {
            self.outputs.fan_on = false;
            self.events.emit(ControlEvent::OverrideExpired);
        }
        self.apply_master_state();

        // Master off holds the night light at its last level.
        if !self.settings.master_switch_on {
            return self.outputs;
        }
        self.reconcile_night_light(inputs.time_of_day, now_ms);

        self.outputs
    }

    pub fn command_permanent_on(&mut self, now_ms: u64) -> ActuatorOutputs {
        self.fan.permanent_on(now_ms);
        self.events.emit(ControlEvent::FanPermanentOn);
        self.apply_master_state();
        self.outputs
    }

    pub fn command_timed_on(
        &mut self,
        now_ms: u64,
        duration_ms: u64,
    ) -> Result<ActuatorOutputs, ControlError> {
        if duration_ms == 0 {
            return Err(ControlError::InvalidParameter(
                "override duration must be greater than zero".to_string(),
            ));
        }

        self.fan.timed_on(now_ms, duration_ms);
        self.events.emit(ControlEvent::FanTimedOn {
            minutes: duration_ms / 60_000,
        });
        self.apply_master_state();
        Ok(self.outputs)
    }

    /// Back to automated control with the fan written OFF; hysteresis takes
    /// over from the next tick.
    pub fn command_off(&mut self) -> ActuatorOutputs {
        self.fan.off();
        self.outputs.fan_on = false;
        self.events.emit(ControlEvent::FanManualOff);
        self.outputs
    }

    pub fn set_on_threshold(&mut self, value: f32) -> Result<Thresholds, ControlError> {
        let thresholds = self.settings.thresholds().with_on(value)?;
        self.settings.on_threshold_c = value;
        self.persist(PersistedEntry::OnThreshold(value));
        self.events.emit(ControlEvent::OnThresholdSet { value });
        Ok(thresholds)
    }

    pub fn set_off_threshold(&mut self, value: f32) -> Result<Thresholds, ControlError> {
        let thresholds = self.settings.thresholds().with_off(value)?;
        self.settings.off_threshold_c = value;
        self.persist(PersistedEntry::OffThreshold(value));
        self.events.emit(ControlEvent::OffThresholdSet { value });
        Ok(thresholds)
    }

    pub fn set_night_led_duty(&mut self, duty: u32) -> Result<ActuatorOutputs, ControlError> {
        self.check_duty(duty)?;
        self.settings.night_led_duty = duty;
        self.persist(PersistedEntry::NightLedDuty(duty));
        self.events.emit(ControlEvent::NightLedBrightnessSet {
            percent: self.duty_percent(duty),
        });

        if self.night_active {
            self.outputs.night_led_duty = duty;
        }
        Ok(self.outputs)
    }

    pub fn set_main_led_duty(&mut self, duty: u32) -> Result<ActuatorOutputs, ControlError> {
        self.check_duty(duty)?;
        self.settings.main_led_duty = duty;
        self.persist(PersistedEntry::MainLedDuty(duty));
        self.events.emit(ControlEvent::MainLedBrightnessSet {
            percent: self.duty_percent(duty),
        });

        self.apply_master_state();
        Ok(self.outputs)
    }

    pub fn set_light_threshold(&mut self, value: u16) {
        self.settings.light_threshold = value;
        self.persist(PersistedEntry::LightThreshold(value));
        self.events.emit(ControlEvent::LightThresholdSet { value });
    }

    pub fn set_debounce_ms(&mut self, ms: u32) {
        self.settings.debounce_ms = ms;
        self.dark.set_window_ms(ms as u64);
        self.persist(PersistedEntry::DebounceMs(ms));
        self.events.emit(ControlEvent::DebounceDelaySet { ms });
    }

    pub fn set_night_window(&mut self, window: TimeWindow) {
        self.settings.night_window = window;
        self.persist(PersistedEntry::NightWindow(window));
        self.events.emit(ControlEvent::NightWindowSet { window });
    }

    /// `None` when the master switch is off; the press is reported, not applied.
    pub fn toggle_main_led(&mut self) -> Option<bool> {
        if !self.settings.master_switch_on {
            self.events.emit(ControlEvent::MainLedToggleIgnored);
            return None;
        }

        self.flip_main_led();
        self.apply_master_state();
        Some(self.settings.main_led_on)
    }

    pub fn toggle_master_switch(&mut self) -> bool {
        self.flip_master_switch();
        self.apply_master_state();
        self.settings.master_switch_on
    }

    /// Snapshot for the serialization layer. Never mutates control state.
    pub fn status(&self, now_ms: u64, diagnostics: Diagnostics) -> ControllerStatus {
        let timer = self.fan.timer();
        ControllerStatus {
            temperature: self.temperature_c,
            humidity: self.humidity,
            light: self.light_raw,
            gpio_status: on_off(self.outputs.fan_on),
            master_switch_state: on_off(self.settings.master_switch_on),
            main_led_status: on_off(self.settings.main_led_on),
            control_mode: self.fan.mode().as_str(),
            override_active: timer.is_active(),
            override_remaining_ms: timer.remaining_ms(now_ms),
            ldr_brightness_level: self.duty_percent(self.outputs.night_led_duty),
            main_led_brightness_level: self.duty_percent(self.outputs.main_led_duty),
            night_led_duty: self.settings.night_led_duty,
            main_led_duty: self.settings.main_led_duty,
            temp_on_threshold: self.settings.on_threshold_c,
            temp_off_threshold: self.settings.off_threshold_c,
            light_threshold: self.settings.light_threshold,
            debounce_delay_ms: self.settings.debounce_ms,
            night_light_policy: self.config.night_light_policy.as_str(),
            night_window_start: self.settings.night_window.start.to_string(),
            night_window_end: self.settings.night_window.end.to_string(),
            sensor_valid: self.temperature_c.is_some() && !self.last_read_failed,
            sensor_faults: self.sensor_faults,
            clock_synced: self.clock_synced,
            uptime_ms: now_ms.wrapping_sub(self.started_ms),
            free_heap_bytes: diagnostics.free_heap_bytes,
            boot_abnormal: diagnostics.boot_abnormal,
        }
    }

    pub fn mode(&self) -> OperatingMode {
        self.fan.mode()
    }

    pub fn outputs(&self) -> ActuatorOutputs {
        self.outputs
    }

    pub fn settings(&self) -> &PersistedConfig {
        &self.settings
    }

    pub fn temperature_c(&self) -> Option<f32> {
        self.temperature_c
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    fn apply_reading(&mut self, reading: ClimateReading) {
        let temperature = reading.temperature_c + self.config.temperature_offset_c;
        let humidity = reading.humidity + self.config.humidity_offset;

        // Each field keeps its last good value independently.
        if temperature.is_finite() {
            self.temperature_c = Some(temperature);
        }
        if humidity.is_finite() {
            self.humidity = Some(humidity);
        }

        self.last_read_failed = !reading.is_valid();
        if self.last_read_failed {
            self.sensor_faults = self.sensor_faults.saturating_add(1);
            self.events.emit(ControlEvent::SensorFault);
        }
    }

    /// Master switch off is a hard override of fan and main LED, independent
    /// of the recorded mode.
    fn apply_master_state(&mut self) {
        if !self.settings.master_switch_on {
            if self.outputs.fan_on {
                self.outputs.fan_on = false;
                self.events.emit(ControlEvent::MasterOffForcedFan);
            }
            if self.outputs.main_led_duty > 0 {
                self.outputs.main_led_duty = 0;
                self.events.emit(ControlEvent::MasterOffForcedMainLed);
            }
            return;
        }

        self.reconcile_fan();
        self.outputs.main_led_duty = if self.settings.main_led_on {
            self.settings.main_led_duty
        } else {
            0
        };
    }

    fn reconcile_fan(&mut self) {
        if let Some(forced) = self.fan.forced_state() {
            self.outputs.fan_on = forced;
            return;
        }

        let Some(temperature) = self.temperature_c else {
            return;
        };

        let next = hysteresis::evaluate(temperature, self.settings.thresholds(), self.outputs.fan_on);
        if next == self.outputs.fan_on {
            return;
        }

        self.outputs.fan_on = next;
        self.events.emit(if next {
            ControlEvent::FanAutoOn { temperature }
        } else {
            ControlEvent::FanAutoOff { temperature }
        });
    }

    fn reconcile_night_light(&mut self, time_of_day: Option<TimeOfDay>, now_ms: u64) {
        let dark_raw = self.light_raw < self.settings.light_threshold;
        self.dark.update(dark_raw, now_ms);
        let dark = self.dark.stable();

        let active = match self.config.night_light_policy {
            NightLightPolicy::LightSensor => dark,
            NightLightPolicy::Schedule => self.window_active(time_of_day),
            NightLightPolicy::Both => self.window_active(time_of_day) && dark,
        };

        if active != self.night_active {
            self.night_active = active;
            let light = self.light_raw;
            self.events.emit(if active {
                ControlEvent::NightLedOn { light }
            } else {
                ControlEvent::NightLedOff { light }
            });
        }

        self.outputs.night_led_duty = if active {
            self.settings.night_led_duty
        } else {
            0
        };
    }

    fn window_active(&mut self, time_of_day: Option<TimeOfDay>) -> bool {
        match self.settings.night_window.evaluate(time_of_day) {
            Ok(active) => active,
            Err(_) => {
                if !self.clock_warned {
                    self.clock_warned = true;
                    self.events.emit(ControlEvent::ClockUnsynchronized);
                }
                false
            }
        }
    }

    fn flip_master_switch(&mut self) {
        let on = !self.settings.master_switch_on;
        self.settings.master_switch_on = on;
        self.persist(PersistedEntry::MasterSwitch(on));
        self.events.emit(ControlEvent::MasterSwitchToggled { on });
    }

    fn flip_main_led(&mut self) {
        let on = !self.settings.main_led_on;
        self.settings.main_led_on = on;
        self.persist(PersistedEntry::MainLed(on));
        self.events.emit(ControlEvent::MainLedToggled { on });
    }

    fn persist(&mut self, entry: PersistedEntry) {
        if let Err(err) = self.store.put(entry) {
            self.events.emit(ControlEvent::PersistenceFault {
                key: entry.key(),
                reason: err.to_string(),
            });
        }
    }

    fn check_duty(&self, duty: u32) -> Result<(), ControlError> {
        if duty > self.config.pwm_max_duty {
            return Err(ControlError::InvalidParameter(format!(
                "duty must be between 0 and {}",
                self.config.pwm_max_duty
            )));
        }
        Ok(())
    }

    fn duty_percent(&self, duty: u32) -> f32 {
        duty as f32 / self.config.pwm_max_duty as f32 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::store::MemoryStore;

    struct FixedSensor(ClimateReading);

    impl ClimateSensor for FixedSensor {
        fn read(&mut self) -> ClimateReading {
            self.0
        }
    }

    fn sensor(temperature_c: f32) -> FixedSensor {
        FixedSensor(ClimateReading {
            temperature_c,
            humidity: 50.0,
        })
    }

    fn inputs(now_ms: u64) -> TickInputs {
        TickInputs {
            now_ms,
            master_switch_raw: false,
            main_led_switch_raw: false,
            light_raw: 4_000,
            time_of_day: None,
        }
    }

    fn controller(master_on: bool) -> RoomController<MemoryStore, Vec<ControlEvent>> {
        let config = ControllerConfig {
            temperature_offset_c: 0.0,
            humidity_offset: 0.0,
            ..ControllerConfig::default()
        };
        let settings = PersistedConfig {
            master_switch_on: master_on,
            ..PersistedConfig::default()
        };
        RoomController::new(config, settings, MemoryStore::default(), Vec::new(), &inputs(0))
    }

    #[test]
    fn boot_reports_start_and_initial_states() {
        let controller = controller(true);

        assert_eq!(
            controller.events()[..2].to_vec(),
            vec![
                ControlEvent::SystemStarted,
                ControlEvent::InitialState {
                    master_on: true,
                    main_led_on: false
                }
            ]
        );
    }

    #[test]
    fn calibration_offsets_are_applied() {
        let mut controller = RoomController::new(
            ControllerConfig::default(),
            PersistedConfig::default(),
            MemoryStore::default(),
            Vec::new(),
            &inputs(0),
        );

        controller.tick(&inputs(0), &mut sensor(25.0));
        let status = controller.status(0, Diagnostics::default());

        assert_eq!(status.temperature, Some(25.0 - 0.1));
        assert_eq!(status.humidity, Some(56.0));
    }

    #[test]
    fn failed_read_keeps_previous_values() {
        let mut controller = controller(true);
        controller.tick(&inputs(0), &mut sensor(30.0));
        assert!(controller.outputs().fan_on);

        controller.tick(&inputs(10_000), &mut FixedSensor(ClimateReading::failed()));

        assert_eq!(controller.temperature_c(), Some(30.0));
        assert!(controller.outputs().fan_on);
        assert_eq!(controller.events().last(), Some(&ControlEvent::SensorFault));
        let status = controller.status(10_000, Diagnostics::default());
        assert!(!status.sensor_valid);
        assert_eq!(status.sensor_faults, 1);
    }

    #[test]
    fn threshold_rejection_leaves_settings_and_store_unchanged() {
        let mut controller = controller(true);
        let before = controller.settings().clone();

        assert!(matches!(
            controller.set_on_threshold(28.0),
            Err(ControlError::InvariantViolation { .. })
        ));
        assert!(controller.set_off_threshold(29.0).is_err());

        assert_eq!(controller.settings(), &before);
        assert!(controller.store().writes.is_empty());
    }

    #[test]
    fn accepted_threshold_is_persisted() {
        let mut controller = controller(true);

        let thresholds = controller.set_off_threshold(27.5).unwrap();

        assert_eq!(thresholds.off_threshold, 27.5);
        assert_eq!(
            controller.store().writes,
            vec![PersistedEntry::OffThreshold(27.5)]
        );
    }

    #[test]
    fn out_of_range_duty_is_rejected() {
        let mut controller = controller(true);

        assert!(controller.set_night_led_duty(8_192).is_err());
        assert!(controller.set_main_led_duty(u32::MAX).is_err());
        assert_eq!(controller.settings().night_led_duty, 4_096);
        assert_eq!(controller.settings().main_led_duty, 8_191);
    }

    #[test]
    fn brightness_applies_immediately_while_night_led_lit() {
        let mut controller = controller(true);
        let mut dark = inputs(0);
        dark.light_raw = 100;
        controller.tick(&dark, &mut sensor(20.0));
        dark.now_ms = 100;
        controller.tick(&dark, &mut sensor(20.0));
        assert_eq!(controller.outputs().night_led_duty, 4_096);

        let outputs = controller.set_night_led_duty(1_000).unwrap();

        assert_eq!(outputs.night_led_duty, 1_000);
    }

    #[test]
    fn persistence_failure_still_commits_in_memory() {
        let config = ControllerConfig::default();
        let store = MemoryStore {
            fail_writes: true,
            ..MemoryStore::default()
        };
        let mut controller =
            RoomController::new(config, PersistedConfig::default(), store, Vec::new(), &inputs(0));

        controller.set_debounce_ms(250);

        assert_eq!(controller.settings().debounce_ms, 250);
        assert!(controller.events().iter().any(|event| matches!(
            event,
            ControlEvent::PersistenceFault {
                key: "debounceDelay",
                ..
            }
        )));
    }

    #[test]
    fn main_led_toggle_is_noop_while_master_off() {
        let mut controller = controller(false);

        assert_eq!(controller.toggle_main_led(), None);
        assert!(!controller.settings().main_led_on);
        assert_eq!(
            controller.events().last(),
            Some(&ControlEvent::MainLedToggleIgnored)
        );
    }

    #[test]
    fn main_led_toggle_drives_configured_duty() {
        let mut controller = controller(true);

        assert_eq!(controller.toggle_main_led(), Some(true));
        assert_eq!(controller.outputs().main_led_duty, 8_191);
        assert_eq!(
            controller.store().writes,
            vec![PersistedEntry::MainLed(true)]
        );

        controller.set_main_led_duty(2_000).unwrap();
        assert_eq!(controller.outputs().main_led_duty, 2_000);
    }

    #[test]
    fn physical_main_led_switch_is_gated_by_master() {
        let mut controller = controller(false);
        let mut pressed = inputs(0);
        pressed.main_led_switch_raw = true;

        pressed.now_ms = 10;
        controller.tick(&pressed, &mut sensor(20.0));
        pressed.now_ms = 100;
        controller.tick(&pressed, &mut sensor(20.0));

        assert!(!controller.settings().main_led_on);
    }

    #[test]
    fn physical_master_switch_toggles_on_debounced_press() {
        let mut controller = controller(false);
        let mut pressed = inputs(0);
        pressed.master_switch_raw = true;

        pressed.now_ms = 10;
        controller.tick(&pressed, &mut sensor(20.0));
        assert!(!controller.settings().master_switch_on);

        pressed.now_ms = 60;
        controller.tick(&pressed, &mut sensor(20.0));
        assert!(controller.settings().master_switch_on);

        pressed.now_ms = 500;
        controller.tick(&pressed, &mut sensor(20.0));
        assert!(controller.settings().master_switch_on);
        assert_eq!(
            controller.store().writes,
            vec![PersistedEntry::MasterSwitch(true)]
        );
    }

    #[test]
    fn timed_on_rejects_zero_duration() {
        let mut controller = controller(true);

        assert!(controller.command_timed_on(0, 0).is_err());
        assert_eq!(controller.mode(), OperatingMode::Automated);
    }

    #[test]
    fn off_command_clears_override_and_writes_fan_off() {
        let mut controller = controller(true);
        controller.command_timed_on(0, 60_000).unwrap();

        let outputs = controller.command_off();

        assert!(!outputs.fan_on);
        assert_eq!(controller.mode(), OperatingMode::Automated);
        let status = controller.status(1_000, Diagnostics::default());
        assert!(!status.override_active);
        assert_eq!(status.override_remaining_ms, None);
    }

    #[test]
    fn status_reports_override_remaining_and_diagnostics() {
        let mut controller = controller(true);
        controller.command_timed_on(1_000, 1_800_000).unwrap();

        let status = controller.status(
            601_000,
            Diagnostics {
                free_heap_bytes: Some(120_000),
                boot_abnormal: true,
            },
        );

        assert_eq!(status.control_mode, "Manual (Timed)");
        assert_eq!(status.gpio_status, "on");
        assert_eq!(status.override_remaining_ms, Some(1_200_000));
        assert_eq!(status.free_heap_bytes, Some(120_000));
        assert!(status.boot_abnormal);
        assert_eq!(status.uptime_ms, 601_000);
    }

    #[test]
    fn unsynchronized_clock_is_reported_once() {
        let config = ControllerConfig {
            night_light_policy: NightLightPolicy::Schedule,
            ..ControllerConfig::default()
        };
        let settings = PersistedConfig {
            master_switch_on: true,
            ..PersistedConfig::default()
        };
        let mut controller = RoomController::new(
            config,
            settings,
            MemoryStore::default(),
            Vec::new(),
            &inputs(0),
        );

        for now in [100, 200, 300] {
            controller.tick(&inputs(now), &mut sensor(20.0));
        }

        let warnings = controller
            .events()
            .iter()
            .filter(|event| **event == ControlEvent::ClockUnsynchronized)
            .count();
        assert_eq!(warnings, 1);
        assert_eq!(controller.outputs().night_led_duty, 0);
    }

    #[test]
    fn abnormal_boot_is_reported() {
        let mut controller = controller(true);
        controller.report_boot(false);
        assert_ne!(controller.events().last(), Some(&ControlEvent::AbnormalBoot));

        controller.report_boot(true);
        assert_eq!(controller.events().last(), Some(&ControlEvent::AbnormalBoot));
    }
}
