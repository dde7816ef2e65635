//! Detection records: wire metadata parsing, invariants, validation.
//!
//! The sensor reports energy on 12 fixed bearings, 30 degrees apart. A
//! detection names the winning bearing three ways at once (`direction` index,
//! `angle` in degrees, `intensity` value) plus the full per-bearing vector,
//! so the host can cross-check what the firmware claims before trusting it.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// Bearing index to degrees, 12 bearings at 30 degree spacing
pub const ANGLE_TABLE: [u16; 12] = [0, 30, 60, 90, 120, 150, 180, 210, 240, 270, 300, 330];

/// Number of fixed bearings
pub const BEARING_COUNT: usize = 12;

/// Expected heat-map payload size: 16x16 row-major energy cells
pub const RAW_FRAME_LEN: usize = 256;

/// Wire shape of an `AUDIO_PACKET:` body.
///
/// `timestamp` is optional (host substitutes receive time), everything else
/// is required; a missing key fails deserialization and the line is dropped
/// as malformed. `audio_map` non-null is the producer's promise that a
/// `RAW_AUDIO:` line follows.
#[derive(Debug, Deserialize)]
struct WireMetadata {
    #[serde(default)]
    timestamp: Option<f64>,
    angle: i64,
    intensity: u32,
    direction: i64,
    all_directions: Vec<u32>,
    #[serde(default)]
    audio_map: Option<serde_json::Value>,
}

/// A detection as parsed off the wire, before validation.
///
/// Field types are deliberately loose (`i64` angle/direction) so that
/// out-of-range values survive parsing and are rejected by [`validate`]
/// with a proper validation error instead of a parse failure.
#[derive(Debug, Clone)]
pub struct ProvisionalRecord {
    pub timestamp: Option<f64>,
    pub angle: i64,
    pub intensity: u32,
    pub direction: i64,
    pub all_directions: Vec<u32>,
    /// Producer indicated a raw frame will follow this metadata
    pub wants_raw: bool,
    /// Heat-map bytes, attached by the pairing state machine
    pub raw_frame: Option<Vec<u8>>,
    /// The promised raw frame never arrived
    pub orphaned: bool,
    /// Host receive time, used when the producer sent no timestamp
    pub received_at: f64,
}

/// A validated, immutable detection.
#[derive(Debug, Clone)]
pub struct DetectionRecord {
    /// Seconds since epoch (producer clock, or host receive time)
    pub timestamp: f64,
    /// Winning bearing in degrees, always `ANGLE_TABLE[direction]`
    pub angle: u16,
    /// Peak bearing energy at detection time
    pub intensity: u32,
    /// Winning bearing index, 0..=11
    pub direction: usize,
    /// Energy per bearing
    pub all_directions: [u32; BEARING_COUNT],
    /// 16x16 heat-map bytes, when the producer sent them
    pub raw_frame: Option<Vec<u8>>,
    /// Metadata-only record whose promised raw frame never arrived
    pub orphaned: bool,
    /// Raw frame present but not exactly 256 bytes
    pub frame_anomaly: bool,
}

/// Seconds since epoch as f64 (matches the producer's timestamp unit)
pub fn unix_time_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Parse an `AUDIO_PACKET:` body into a provisional record.
///
/// Fails with [`Error::MalformedMetadata`] on invalid JSON or missing
/// required keys. No invariant checking happens here; see [`validate`].
pub fn parse_metadata(body: &str) -> Result<ProvisionalRecord> {
    let wire: WireMetadata =
        serde_json::from_str(body).map_err(|e| Error::MalformedMetadata(e.to_string()))?;

    Ok(ProvisionalRecord {
        timestamp: wire.timestamp,
        angle: wire.angle,
        intensity: wire.intensity,
        direction: wire.direction,
        all_directions: wire.all_directions,
        wants_raw: wire.audio_map.is_some_and(|v| !v.is_null()),
        raw_frame: None,
        orphaned: false,
        received_at: unix_time_now(),
    })
}

/// Validate a provisional record against the bearing-table invariants.
///
/// Rejects (never silently fixes) a direction outside 0..=11, an angle that
/// disagrees with `ANGLE_TABLE[direction]`, or a per-bearing vector that is
/// not exactly 12 entries. A raw frame of the wrong length is accepted but
/// flagged: a partially transmitted heat-map still has diagnostic value.
pub fn validate(provisional: ProvisionalRecord) -> Result<DetectionRecord> {
    let direction = usize::try_from(provisional.direction).map_err(|_| {
        Error::Validation(format!("direction {} out of range", provisional.direction))
    })?;
    if direction >= BEARING_COUNT {
        return Err(Error::Validation(format!(
            "direction {} out of range",
            direction
        )));
    }

    let expected_angle = ANGLE_TABLE[direction];
    if provisional.angle != i64::from(expected_angle) {
        return Err(Error::Validation(format!(
            "angle {} does not match direction {} (expected {})",
            provisional.angle, direction, expected_angle
        )));
    }

    let all_directions: [u32; BEARING_COUNT] =
        provisional.all_directions.as_slice().try_into().map_err(|_| {
            Error::Validation(format!(
                "expected {} bearing intensities, got {}",
                BEARING_COUNT,
                provisional.all_directions.len()
            ))
        })?;

    // The winning bearing should carry the reported peak. The firmware
    // computes this itself, so a mismatch is suspicious but not worth
    // discarding the detection over.
    if all_directions[direction] != provisional.intensity
        || all_directions.iter().any(|&v| v > provisional.intensity)
    {
        log::warn!(
            "intensity {} inconsistent with bearing vector {:?}",
            provisional.intensity,
            all_directions
        );
    }

    let frame_anomaly = provisional
        .raw_frame
        .as_ref()
        .is_some_and(|f| f.len() != RAW_FRAME_LEN);

    Ok(DetectionRecord {
        timestamp: provisional.timestamp.unwrap_or(provisional.received_at),
        angle: expected_angle,
        intensity: provisional.intensity,
        direction,
        all_directions,
        raw_frame: provisional.raw_frame,
        orphaned: provisional.orphaned,
        frame_anomaly,
    })
}

/// Min/max/mean over heat-map cells, for the console summary
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub min: u8,
    pub max: u8,
    pub mean: f32,
}

impl DetectionRecord {
    /// Heat-map statistics, if a frame is attached and non-empty
    pub fn frame_stats(&self) -> Option<FrameStats> {
        let frame = self.raw_frame.as_deref()?;
        if frame.is_empty() {
            return None;
        }
        let sum: u64 = frame.iter().map(|&b| u64::from(b)).sum();
        Some(FrameStats {
            min: *frame.iter().min().expect("non-empty"),
            max: *frame.iter().max().expect("non-empty"),
            mean: sum as f32 / frame.len() as f32,
        })
    }
}
