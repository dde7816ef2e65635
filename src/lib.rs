//! DhvaniIO - Host-side receiver for a serial acoustic direction-finding sensor
//!
//! The sensor board estimates the dominant direction of incoming sound over
//! 12 fixed bearings and prints detections as text lines over its serial
//! link. This library recovers those messages from the byte stream, pairs
//! each detection summary with its optional 16x16 energy heat-map, validates
//! the result, and persists it.
//!
//! ## Pipeline
//!
//! bytes → [`protocol::LineFramer`] → [`protocol::classify`] →
//! [`protocol::PacketPairer`] → [`record::validate`] →
//! [`storage::DetectionStore`] / display channel

pub mod config;
pub mod display;
pub mod error;
pub mod protocol;
pub mod record;
pub mod storage;
pub mod supervisor;
pub mod transport;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{Error, Result};
pub use record::DetectionRecord;
pub use supervisor::{ConnectionSupervisor, Event};
