use std::collections::VecDeque;

use pretty_assertions::assert_eq;
use roomctl_common::{
    ClimateReading, ClimateSensor, ControlEvent, ControllerConfig, MemoryStore, NightLightPolicy,
    OperatingMode, PersistedConfig, PersistedEntry, RoomController, TickInputs, TimeOfDay,
    TimeWindow,
};

type Controller = RoomController<MemoryStore, Vec<ControlEvent>>;

/// Replays temperatures in order, repeating the last one when exhausted.
struct ScriptedSensor {
    readings: VecDeque<f32>,
    last: f32,
}

impl ScriptedSensor {
    fn new(readings: &[f32]) -> Self {
        Self {
            readings: readings.iter().copied().collect(),
            last: f32::NAN,
        }
    }

    fn constant(temperature_c: f32) -> Self {
        Self::new(&[temperature_c])
    }
}

impl ClimateSensor for ScriptedSensor {
    fn read(&mut self) -> ClimateReading {
        if let Some(next) = self.readings.pop_front() {
            self.last = next;
        }
        ClimateReading {
            temperature_c: self.last,
            humidity: 55.0,
        }
    }
}

fn uncalibrated() -> ControllerConfig {
    ControllerConfig {
        temperature_offset_c: 0.0,
        humidity_offset: 0.0,
        ..ControllerConfig::default()
    }
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

fn build(config: ControllerConfig, settings: PersistedConfig, store: MemoryStore) -> Controller {
    RoomController::new(config, settings, store, Vec::new(), &inputs(0))
}

fn master_on() -> PersistedConfig {
    PersistedConfig {
        master_switch_on: true,
        ..PersistedConfig::default()
    }
}

fn count(controller: &Controller, event: &ControlEvent) -> usize {
    controller.events().iter().filter(|seen| *seen == event).count()
}

#[test]
fn hysteresis_band_holds_fan_between_thresholds() {
    let settings = PersistedConfig {
        on_threshold_c: 28.9,
        off_threshold_c: 28.5,
        ..master_on()
    };
    let mut controller = build(uncalibrated(), settings, MemoryStore::default());
    let mut sensor = ScriptedSensor::new(&[27.0, 29.1, 28.6, 28.4]);

    let fan_states: Vec<bool> = [0, 10_000, 20_000, 30_000]
        .into_iter()
        .map(|now| controller.tick(&inputs(now), &mut sensor).fan_on)
        .collect();

    assert_eq!(fan_states, vec![false, true, true, false]);
}

#[test]
fn sensor_is_only_sampled_on_interval() {
    let mut controller = build(uncalibrated(), master_on(), MemoryStore::default());
    let mut sensor = ScriptedSensor::new(&[27.0, 30.0]);

    controller.tick(&inputs(0), &mut sensor);
    controller.tick(&inputs(9_999), &mut sensor);
    assert_eq!(controller.temperature_c(), Some(27.0));
    assert!(!controller.outputs().fan_on);

    controller.tick(&inputs(10_000), &mut sensor);
    assert_eq!(controller.temperature_c(), Some(30.0));
    assert!(controller.outputs().fan_on);
}

#[test]
fn timed_override_runs_for_exact_duration() {
    let mut controller = build(uncalibrated(), master_on(), MemoryStore::default());
    let mut sensor = ScriptedSensor::constant(20.0);

    controller.tick(&inputs(0), &mut sensor);
    let outputs = controller.command_timed_on(0, 1_800_000).unwrap();
    assert!(outputs.fan_on);

    let outputs = controller.tick(&inputs(1_799_999), &mut sensor);
    assert!(outputs.fan_on);
    assert_eq!(controller.mode(), OperatingMode::ManualTimed);

    let outputs = controller.tick(&inputs(1_800_000), &mut sensor);
    assert!(!outputs.fan_on);
    assert_eq!(controller.mode(), OperatingMode::Automated);

    controller.tick(&inputs(1_800_001), &mut sensor);
    assert_eq!(count(&controller, &ControlEvent::OverrideExpired), 1);
}

#[test]
fn expired_override_hands_back_to_hysteresis_in_same_tick() {
    let mut controller = build(uncalibrated(), master_on(), MemoryStore::default());
    let mut sensor = ScriptedSensor::constant(30.0);

    controller.command_timed_on(1_000, 5_000).unwrap();
    controller.tick(&inputs(5_999), &mut sensor);
    assert_eq!(controller.mode(), OperatingMode::ManualTimed);

    let outputs = controller.tick(&inputs(6_000), &mut sensor);

    assert_eq!(controller.mode(), OperatingMode::Automated);
    assert!(outputs.fan_on);
    let tail = &controller.events()[controller.events().len() - 2..];
    assert_eq!(
        tail.to_vec(),
        vec![
            ControlEvent::OverrideExpired,
            ControlEvent::FanAutoOn { temperature: 30.0 }
        ]
    );
}

#[test]
fn master_off_overrides_permanent_manual_mode() {
    let mut controller = build(uncalibrated(), master_on(), MemoryStore::default());
    let mut sensor = ScriptedSensor::constant(20.0);
    controller.tick(&inputs(0), &mut sensor);
    controller.toggle_main_led();
    let outputs = controller.command_permanent_on(0);
    assert!(outputs.fan_on);
    assert!(outputs.main_led_duty > 0);

    assert!(!controller.toggle_master_switch());
    let outputs = controller.outputs();

    assert!(!outputs.fan_on);
    assert_eq!(outputs.main_led_duty, 0);
    assert_eq!(controller.mode(), OperatingMode::ManualPermanent);
    assert_eq!(count(&controller, &ControlEvent::MasterOffForcedFan), 1);

    let outputs = controller.tick(&inputs(100), &mut sensor);
    assert!(!outputs.fan_on);

    assert!(controller.toggle_master_switch());
    assert!(controller.outputs().fan_on);
    assert_eq!(controller.outputs().main_led_duty, 8_191);
}

#[test]
fn physical_master_press_forces_outputs_off() {
    let mut controller = build(uncalibrated(), master_on(), MemoryStore::default());
    let mut sensor = ScriptedSensor::constant(30.0);
    controller.tick(&inputs(0), &mut sensor);
    assert!(controller.outputs().fan_on);

    let mut pressed = inputs(1_000);
    pressed.master_switch_raw = true;
    controller.tick(&pressed, &mut sensor);
    assert!(controller.outputs().fan_on);

    pressed.now_ms = 1_050;
    let outputs = controller.tick(&pressed, &mut sensor);

    assert!(!outputs.fan_on);
    assert!(!controller.settings().master_switch_on);
    assert_eq!(
        controller.store().writes,
        vec![PersistedEntry::MasterSwitch(false)]
    );
}

#[test]
fn threshold_updates_keep_on_above_off() {
    let mut controller = build(uncalibrated(), master_on(), MemoryStore::default());

    assert!(controller.set_on_threshold(28.0).is_err());
    assert!(controller.set_off_threshold(28.0).is_ok());
    assert!(controller.set_on_threshold(28.0).is_err());
    assert!(controller.set_off_threshold(f32::NAN).is_err());
    assert!(controller.set_on_threshold(31.0).is_ok());

    let settings = controller.settings();
    assert_eq!(
        (settings.on_threshold_c, settings.off_threshold_c),
        (31.0, 28.0)
    );
    assert_eq!(
        controller.store().writes,
        vec![
            PersistedEntry::OffThreshold(28.0),
            PersistedEntry::OnThreshold(31.0)
        ]
    );
}

#[test]
fn scheduled_night_light_follows_window_across_midnight() {
    let config = ControllerConfig {
        night_light_policy: NightLightPolicy::Schedule,
        ..uncalibrated()
    };
    let mut controller = build(config, master_on(), MemoryStore::default());
    let mut sensor = ScriptedSensor::constant(20.0);

    let mut duty_at = |now: u64, hour: u8, minute: u8| {
        let mut tick = inputs(now);
        tick.time_of_day = TimeOfDay::new(hour, minute);
        controller.tick(&tick, &mut sensor).night_led_duty
    };

    assert_eq!(duty_at(0, 23, 0), 4_096);
    assert_eq!(duty_at(100, 12, 0), 0);
    assert_eq!(duty_at(200, 6, 0), 4_096);
    assert_eq!(duty_at(300, 7, 15), 0);
    assert_eq!(duty_at(400, 19, 15), 4_096);
}

#[test]
fn updated_window_applies_on_next_tick() {
    let config = ControllerConfig {
        night_light_policy: NightLightPolicy::Schedule,
        ..uncalibrated()
    };
    let mut controller = build(config, master_on(), MemoryStore::default());
    let mut sensor = ScriptedSensor::constant(20.0);
    let window = TimeWindow::new(
        TimeOfDay::parse("11:00").unwrap(),
        TimeOfDay::parse("13:00").unwrap(),
    );

    controller.set_night_window(window);
    let mut tick = inputs(0);
    tick.time_of_day = TimeOfDay::new(12, 0);

    assert_eq!(controller.tick(&tick, &mut sensor).night_led_duty, 4_096);
    assert_eq!(
        controller.store().writes,
        vec![PersistedEntry::NightWindow(window)]
    );
}

#[test]
fn combined_policy_needs_window_and_darkness() {
    let config = ControllerConfig {
        night_light_policy: NightLightPolicy::Both,
        ..uncalibrated()
    };
    let mut controller = build(config, master_on(), MemoryStore::default());
    let mut sensor = ScriptedSensor::constant(20.0);

    let mut tick = inputs(0);
    tick.time_of_day = TimeOfDay::new(23, 0);
    assert_eq!(controller.tick(&tick, &mut sensor).night_led_duty, 0);

    tick.light_raw = 100;
    tick.now_ms = 10;
    controller.tick(&tick, &mut sensor);
    tick.now_ms = 60;
    assert_eq!(controller.tick(&tick, &mut sensor).night_led_duty, 4_096);

    tick.time_of_day = TimeOfDay::new(12, 0);
    tick.now_ms = 70;
    assert_eq!(controller.tick(&tick, &mut sensor).night_led_duty, 0);
}

#[test]
fn flickering_light_does_not_toggle_night_led() {
    let mut controller = build(uncalibrated(), master_on(), MemoryStore::default());
    let mut sensor = ScriptedSensor::constant(20.0);
    controller.set_debounce_ms(200);

    for step in 0..10u64 {
        let mut tick = inputs(step * 50);
        tick.light_raw = if step % 2 == 0 { 100 } else { 4_000 };
        assert_eq!(controller.tick(&tick, &mut sensor).night_led_duty, 0);
    }

    let mut tick = inputs(1_000);
    tick.light_raw = 100;
    controller.tick(&tick, &mut sensor);
    tick.now_ms = 1_199;
    assert_eq!(controller.tick(&tick, &mut sensor).night_led_duty, 0);
    tick.now_ms = 1_200;
    assert_eq!(controller.tick(&tick, &mut sensor).night_led_duty, 4_096);
    assert_eq!(count(&controller, &ControlEvent::NightLedOn { light: 100 }), 1);
}

#[test]
fn failed_writes_still_commit_state() {
    let store = MemoryStore {
        fail_writes: true,
        ..MemoryStore::default()
    };
    let mut controller = build(uncalibrated(), PersistedConfig::default(), store);

    assert!(controller.toggle_master_switch());
    controller.set_light_threshold(1_000);

    assert!(controller.settings().master_switch_on);
    assert_eq!(controller.settings().light_threshold, 1_000);
    let faults: Vec<&str> = controller
        .events()
        .iter()
        .filter_map(|event| match event {
            ControlEvent::PersistenceFault { key, .. } => Some(*key),
            _ => None,
        })
        .collect();
    assert_eq!(faults, vec!["proximityManualState", "lightThreshold"]);
}

#[test]
fn master_off_leaves_night_light_dark_until_master_returns() {
    let mut controller = build(uncalibrated(), PersistedConfig::default(), MemoryStore::default());
    let mut sensor = ScriptedSensor::constant(20.0);

    for now in [10, 100, 200] {
        let mut tick = inputs(now);
        tick.light_raw = 100;
        assert_eq!(controller.tick(&tick, &mut sensor).night_led_duty, 0);
    }
    assert_eq!(count(&controller, &ControlEvent::NightLedOn { light: 100 }), 0);

    assert!(controller.toggle_master_switch());
    let mut tick = inputs(300);
    tick.light_raw = 100;
    assert_eq!(controller.tick(&tick, &mut sensor).night_led_duty, 0);
    tick.now_ms = 350;
    assert_eq!(controller.tick(&tick, &mut sensor).night_led_duty, 4_096);
}

#[test]
fn master_off_holds_lit_night_light() {
    let mut controller = build(uncalibrated(), master_on(), MemoryStore::default());
    let mut sensor = ScriptedSensor::constant(20.0);
    let mut tick = inputs(0);
    tick.light_raw = 100;
    controller.tick(&tick, &mut sensor);
    tick.now_ms = 50;
    assert_eq!(controller.tick(&tick, &mut sensor).night_led_duty, 4_096);

    assert!(!controller.toggle_master_switch());
    for now in [100, 200, 300] {
        let outputs = controller.tick(&inputs(now), &mut sensor);
        assert_eq!(outputs.night_led_duty, 4_096);
        assert!(!outputs.fan_on);
        assert_eq!(outputs.main_led_duty, 0);
    }
    assert_eq!(count(&controller, &ControlEvent::NightLedOff { light: 4_000 }), 0);
}
