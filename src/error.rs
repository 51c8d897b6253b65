//! Error types for the robot controller

use crate::control::IntentSource;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Controller error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial device could not be opened. Fatal at startup.
    #[error("Failed to open serial port {port}: {source}")]
    Connection {
        port: String,
        source: serialport::Error,
    },

    /// Serial port error after the device was opened
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error on a single read or write
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed telemetry line or frame
    #[error("Malformed telemetry: {0}")]
    Telemetry(String),

    /// Malformed datagram command
    #[error("Malformed command: {0}")]
    Command(String),

    /// No complete telemetry frame within the staleness threshold
    #[error("Sensor data is stale (last frame age: {age_ms:?} ms)")]
    StaleSensorData {
        /// Milliseconds since the last committed frame, `None` if never
        age_ms: Option<u64>,
    },

    /// Intent write from a source that does not hold control authority
    #[error("{requester:?} does not hold control authority")]
    NotInControl { requester: IntentSource },

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// TOML parse failure
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
