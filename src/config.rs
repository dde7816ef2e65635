//! Configuration for the DhvaniIO receiver daemon
//!
//! Loads configuration from a TOML file with the minimal parameters needed
//! to run the serial receiver: transport, protocol tuning, and storage.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub hardware: HardwareConfig,
    pub protocol: ProtocolConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Hardware configuration (serial link to the sensor board)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HardwareConfig {
    /// Sensor board serial port
    pub port: String,
    /// Baud rate (sensor firmware prints at 115200)
    pub baud_rate: u32,
    /// Send a wake sequence (CR-LF) after connecting to nudge the board's REPL
    pub wake_on_connect: bool,
}

/// Protocol tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProtocolConfig {
    /// How long a metadata line may wait for its raw-audio line before it is
    /// emitted as orphaned (milliseconds)
    pub pairing_timeout_ms: u64,
    /// Upper bound on a single line; longer input is truncated and discarded
    /// as unrecognized rather than growing the buffer without limit
    pub max_line_len: usize,
}

/// Detection persistence
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Whether detections are written to disk at all
    pub enabled: bool,
    /// Directory for .raw heat-map files and .json sidecars (created on first use)
    pub directory: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl AppConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Default configuration for a MaixPy-class microphone-array board on USB serial
    pub fn maix_defaults() -> Self {
        Self {
            hardware: HardwareConfig {
                port: "/dev/ttyUSB0".to_string(),
                baud_rate: 115200,
                wake_on_connect: true,
            },
            protocol: ProtocolConfig {
                pairing_timeout_ms: 1000,
                max_line_len: 4096,
            },
            storage: StorageConfig {
                enabled: true,
                directory: "maix_audio_data".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::maix_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::maix_defaults();
        assert_eq!(config.hardware.port, "/dev/ttyUSB0");
        assert_eq!(config.hardware.baud_rate, 115200);
        assert_eq!(config.protocol.pairing_timeout_ms, 1000);
        assert!(config.storage.enabled);
        assert_eq!(config.storage.directory, "maix_audio_data");
    }

    #[test]
    fn test_toml_serialization() {
        let config = AppConfig::maix_defaults();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[hardware]"));
        assert!(toml_string.contains("[protocol]"));
        assert!(toml_string.contains("[storage]"));
        assert!(toml_string.contains("[logging]"));

        assert!(toml_string.contains("baud_rate = 115200"));
        assert!(toml_string.contains("port = \"/dev/ttyUSB0\""));
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[hardware]
port = "/dev/ttyACM1"
baud_rate = 230400
wake_on_connect = false

[protocol]
pairing_timeout_ms = 500
max_line_len = 2048

[storage]
enabled = false
directory = "/var/lib/dhvani"

[logging]
level = "debug"
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.hardware.port, "/dev/ttyACM1");
        assert_eq!(config.hardware.baud_rate, 230400);
        assert!(!config.hardware.wake_on_connect);
        assert_eq!(config.protocol.pairing_timeout_ms, 500);
        assert!(!config.storage.enabled);
        assert_eq!(config.logging.level, "debug");
    }
}
