use std::{
    fmt,
    sync::mpsc::{SyncSender, TrySendError},
};

use crate::{types::LogRecord, window::TimeWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    SystemStarted,
    AbnormalBoot,
    InitialState { master_on: bool, main_led_on: bool },
    FanPermanentOn,
    FanTimedOn { minutes: u64 },
    FanManualOff,
    OverrideExpired,
    FanAutoOn { temperature: f32 },
    FanAutoOff { temperature: f32 },
    MasterSwitchToggled { on: bool },
    MasterOffForcedFan,
    MasterOffForcedMainLed,
    MainLedToggled { on: bool },
    MainLedToggleIgnored,
    NightLedOn { light: u16 },
    NightLedOff { light: u16 },
    OnThresholdSet { value: f32 },
    OffThresholdSet { value: f32 },
    NightLedBrightnessSet { percent: f32 },
    MainLedBrightnessSet { percent: f32 },
    LightThresholdSet { value: u16 },
    DebounceDelaySet { ms: u32 },
    NightWindowSet { window: TimeWindow },
    SensorFault,
    ClockUnsynchronized,
    PersistenceFault { key: &'static str, reason: String },
}

impl ControlEvent {
    pub fn level(&self) -> EventLevel {
        match self {
            Self::AbnormalBoot
            | Self::SensorFault
            | Self::ClockUnsynchronized
            | Self::PersistenceFault { .. } => EventLevel::Warning,
            _ => EventLevel::Info,
        }
    }

    pub fn to_record(&self) -> LogRecord {
        LogRecord {
            event_message: self.to_string(),
        }
    }
}

fn on_off_upper(value: bool) -> &'static str {
    if value {
        "ON"
    } else {
        "OFF"
    }
}

impl fmt::Display for ControlEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SystemStarted => write!(f, "System started."),
            Self::AbnormalBoot => write!(f, "Previous boot ended abnormally (watchdog, panic or brownout)."),
            Self::InitialState {
                master_on,
                main_led_on,
            } => write!(
                f,
                "Initial master switch state: {}, initial main LED state: {}.",
                on_off_upper(*master_on),
                on_off_upper(*main_led_on)
            ),
            Self::FanPermanentOn => write!(f, "Fan is now manually ON (permanent)."),
            Self::FanTimedOn { minutes } => {
                write!(f, "Fan is now manually ON for {minutes} minutes.")
            }
            Self::FanManualOff => write!(f, "Fan is now manually OFF. Automated control resumed."),
            Self::OverrideExpired => {
                write!(f, "Manual timer ended. Automated control resumed.")
            }
            Self::FanAutoOn { temperature } => write!(
                f,
                "Fan is now ON due to high temperature ({temperature:.1}C)."
            ),
            Self::FanAutoOff { temperature } => write!(
                f,
                "Fan is now OFF due to low temperature ({temperature:.1}C)."
            ),
            Self::MasterSwitchToggled { on } => {
                write!(f, "Master switch state toggled to {}.", on_off_upper(*on))
            }
            Self::MasterOffForcedFan => write!(f, "Master switch OFF. Fan is now OFF."),
            Self::MasterOffForcedMainLed => write!(f, "Master switch OFF. Main LED is now OFF."),
            Self::MainLedToggled { on } => {
                write!(f, "Main LED state toggled to {}.", on_off_upper(*on))
            }
            Self::MainLedToggleIgnored => {
                write!(f, "Master switch is OFF. Cannot toggle main LED.")
            }
            Self::NightLedOn { light } => write!(f, "Night LED ON. Light level is {light}."),
            Self::NightLedOff { light } => write!(f, "Night LED OFF. Light level is {light}."),
            Self::OnThresholdSet { value } => {
                write!(f, "Temperature ON threshold set to {value:.2}C.")
            }
            Self::OffThresholdSet { value } => {
                write!(f, "Temperature OFF threshold set to {value:.2}C.")
            }
            Self::NightLedBrightnessSet { percent } => {
                write!(f, "Night LED brightness level set to {percent:.1}%.")
            }
            Self::MainLedBrightnessSet { percent } => {
                write!(f, "Main LED brightness level set to {percent:.1}%.")
            }
            Self::LightThresholdSet { value } => {
                write!(f, "Light sensor threshold set to {value}.")
            }
            Self::DebounceDelaySet { ms } => {
                write!(f, "Night LED debounce delay set to {ms}ms.")
            }
            Self::NightWindowSet { window } => write!(
                f,
                "Night light window set to {}-{}.",
                window.start, window.end
            ),
            Self::SensorFault => write!(f, "Failed to read from DHT sensor!"),
            Self::ClockUnsynchronized => write!(
                f,
                "Wall clock not synchronized; night light window treated as inactive."
            ),
            Self::PersistenceFault { key, reason } => {
                write!(f, "Failed to persist `{key}`: {reason}")
            }
        }
    }
}

/// Destination for control events. `emit` must never block the control tick.
pub trait EventSink {
    fn emit(&mut self, event: ControlEvent);
}

impl EventSink for Vec<ControlEvent> {
    fn emit(&mut self, event: ControlEvent) {
        self.push(event);
    }
}

/// Bounded-channel sink; events are dropped when the drain falls behind.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: SyncSender<ControlEvent>,
    dropped: u64,
}

impl ChannelSink {
    pub fn new(sender: SyncSender<ControlEvent>) -> Self {
        Self { sender, dropped: 0 }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl EventSink for ChannelSink {
    fn emit(&mut self, event: ControlEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped = self.dropped.saturating_add(1);
            }
        }
    }
}
