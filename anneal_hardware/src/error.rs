use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("daq used before initialize()")]
    NotInitialized,
    #[error("unknown device: {0}")]
    UnknownDevice(String),
    #[error("channel fault on {channel}: {message}")]
    Channel { channel: String, message: String },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
