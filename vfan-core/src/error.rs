//! Error types for the vfan bridge

use thiserror::Error;

/// Core error type for bridge operations
#[derive(Error, Debug)]
pub enum VfanError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Hardware discovery errors (port enumeration, sysfs walk)
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(String),

    /// Value the wire protocol cannot carry
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON from or for the device
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Device disconnected (USB unplugged, power cycle)
    #[error("Device disconnected: {0}")]
    DeviceDisconnected(String),

    /// Anything else, e.g. workers stopping without a cause
    #[error("{0}")]
    Other(String),
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, VfanError>;

impl From<serde_json::Error> for VfanError {
    fn from(err: serde_json::Error) -> Self {
        VfanError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for VfanError {
    fn from(err: toml::de::Error) -> Self {
        VfanError::Config(err.to_string())
    }
}
