use std::fmt;

use crate::types::ActuatorOutputs;

/// Relay plus the two PWM channels, as seen by the platform layer.
pub trait ActuatorDriver {
    type Error: fmt::Display;

    fn set_fan(&mut self, on: bool) -> Result<(), Self::Error>;
    fn set_night_led_duty(&mut self, duty: u32) -> Result<(), Self::Error>;
    fn set_main_led_duty(&mut self, duty: u32) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorChannel {
    Fan,
    NightLed,
    MainLed,
}

impl ActuatorChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fan => "fan relay",
            Self::NightLed => "night LED",
            Self::MainLed => "main LED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    pub channel: ActuatorChannel,
    pub reason: String,
}

/// Writes only the channels whose level changed since the last call.
///
/// A failed write is reported once and the level is still recorded as
/// applied, so it is not retried on the next tick.
#[derive(Debug, Clone, Default)]
pub struct ActuatorLatch {
    applied: Option<ActuatorOutputs>,
}

impl ActuatorLatch {
    pub fn apply<D: ActuatorDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        outputs: ActuatorOutputs,
    ) -> Vec<WriteFailure> {
        let previous = self.applied;
        let mut failures = Vec::new();
        let mut record = |channel, result: Result<(), D::Error>| {
            if let Err(err) = result {
                failures.push(WriteFailure {
                    channel,
                    reason: err.to_string(),
                });
            }
        };

        if previous.map(|applied| applied.fan_on) != Some(outputs.fan_on) {
            record(ActuatorChannel::Fan, driver.set_fan(outputs.fan_on));
        }
        if previous.map(|applied| applied.night_led_duty) != Some(outputs.night_led_duty) {
            record(
                ActuatorChannel::NightLed,
                driver.set_night_led_duty(outputs.night_led_duty),
            );
        }
        if previous.map(|applied| applied.main_led_duty) != Some(outputs.main_led_duty) {
            record(
                ActuatorChannel::MainLed,
                driver.set_main_led_duty(outputs.main_led_duty),
            );
        }

        self.applied = Some(outputs);
        failures
    }

    pub fn applied(&self) -> Option<ActuatorOutputs> {
        self.applied
    }
}
