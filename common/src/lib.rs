pub mod actuators;
pub mod clock;
pub mod config;
pub mod controller;
pub mod debounce;
pub mod error;
pub mod events;
pub mod hysteresis;
pub mod mode;
pub mod override_timer;
pub mod sensor;
pub mod store;
pub mod topics;
pub mod types;
pub mod window;

pub use actuators::{ActuatorChannel, ActuatorDriver, ActuatorLatch, WriteFailure};
pub use clock::{elapsed_ms, TimeOfDay};
pub use config::{ControllerConfig, NetworkConfig, PersistedConfig, RuntimeConfig};
pub use controller::{RoomController, TickInputs};
pub use debounce::{DebouncedInput, Edge};
pub use error::ControlError;
pub use events::{ChannelSink, ControlEvent, EventLevel, EventSink};
pub use hysteresis::Thresholds;
pub use mode::FanArbiter;
pub use override_timer::OverrideTimer;
pub use sensor::{ClimateReading, ClimateSensor, SensorSampler};
pub use store::{ConfigStore, MemoryStore, PersistedEntry, StoreError};
pub use topics::*;
pub use types::{
    ActuatorOutputs, ControllerStatus, Diagnostics, LogRecord, NightLightPolicy, OperatingMode,
};
pub use window::TimeWindow;
