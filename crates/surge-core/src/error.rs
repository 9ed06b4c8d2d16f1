use thiserror::Error;

#[derive(Error, Debug)]
pub enum SurgeError {
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connect(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode payload: {0}")]
    PayloadDecode(#[from] serde_json::Error),

    #[error("Malformed frame: {0}")]
    FrameDecode(String),
}

pub type Result<T> = std::result::Result<T, SurgeError>;
