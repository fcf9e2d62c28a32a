use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("on-threshold ({on:.2}) must be greater than off-threshold ({off:.2})")]
    InvariantViolation { on: f32, off: f32 },
    #[error("sensor read returned no valid data")]
    SensorFault,
    #[error("wall clock is not synchronized")]
    ClockUnsynchronized,
    #[error("failed to persist `{key}`: {reason}")]
    PersistenceFault { key: &'static str, reason: String },
}
