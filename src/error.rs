//! Error types for DhvaniIO

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// DhvaniIO error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport unavailable or closed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Metadata line body unparsable or missing required keys
    #[error("Malformed metadata: {0}")]
    MalformedMetadata(String),

    /// Raw-audio line body is not valid hex
    #[error("Malformed raw audio: {0}")]
    MalformedRawAudio(String),

    /// Record violates a structural invariant
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Record could not be durably stored
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration file unreadable or invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Config(e.to_string())
    }
}
