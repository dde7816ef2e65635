//! Wire protocol: line framing, classification, and packet pairing.
//!
//! The sensor speaks newline-terminated text over the serial link. Three
//! stages turn its byte stream into detections:
//!
//! 1. [`framer::LineFramer`] — bytes to complete lines
//! 2. [`classifier::classify`] — lines to tagged protocol roles
//! 3. [`pairing::PacketPairer`] — metadata/raw-audio pairs to records

pub mod classifier;
pub mod framer;
pub mod pairing;

pub use classifier::{classify, Line, METADATA_PREFIX, RAW_AUDIO_PREFIX};
pub use framer::{FramedLine, LineFramer};
pub use pairing::{PacketPairer, PairingOutput, DEFAULT_PAIRING_TIMEOUT};
