use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum AnnealError {
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("hardware not ready")]
    HardwareNotReady,
    #[error("unknown step type: {0}")]
    UnknownStepType(String),
    #[error("cancelled")]
    Cancelled,
    #[error("actuator fault: {0}")]
    ActuatorFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(String),
}

pub type Result<T, E = eyre::Report> = std::result::Result<T, E>;
pub use eyre::Report;
