//! Packet pairing state machine.
//!
//! A complete detection is two consecutive lines: metadata, then optionally
//! the hex heat-map it promised. The transport drops and mangles lines, so
//! the pairer holds at most one pending metadata record and resolves it in
//! exactly one of three ways: paired with the next raw-audio line, orphaned
//! by a newer metadata line, or orphaned by timeout. A raw-audio line can
//! never attach to anything but the most recently pending metadata.

use crate::error::Error;
use crate::record::{self, ProvisionalRecord};
use std::time::{Duration, Instant};

/// Default wait for a promised raw-audio line before orphaning
pub const DEFAULT_PAIRING_TIMEOUT: Duration = Duration::from_secs(1);

/// A metadata record waiting for its raw-audio counterpart
struct PendingPairing {
    record: ProvisionalRecord,
    since: Instant,
}

/// One result of feeding a line to the pairer
#[derive(Debug)]
pub enum PairingOutput {
    /// A detection ready for validation (complete, metadata-only, or orphaned)
    Record(ProvisionalRecord),
    /// A protocol-level failure on this line; counted and logged, never fatal
    Error(Error),
    /// A raw-audio line with no metadata waiting for it
    StrayRawAudio,
}

/// Two-state pairing machine: idle, or awaiting one raw-audio line
pub struct PacketPairer {
    pending: Option<PendingPairing>,
    timeout: Duration,
}

impl PacketPairer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: None,
            timeout,
        }
    }

    /// Whether a metadata record is currently awaiting its raw frame
    pub fn is_awaiting_raw(&self) -> bool {
        self.pending.is_some()
    }

    /// Handle an `AUDIO_PACKET:` body.
    ///
    /// May emit up to two outputs: the orphan of a previously pending record
    /// superseded by this line, then this line's own outcome.
    pub fn on_metadata(&mut self, body: &str, now: Instant) -> Vec<PairingOutput> {
        let mut outputs = Vec::new();

        // A second metadata line before pairing means the promised raw frame
        // was lost in transit; the older record goes out metadata-only.
        if let Some(pending) = self.pending.take() {
            outputs.push(PairingOutput::Record(orphan(pending.record)));
        }

        match record::parse_metadata(body) {
            Ok(provisional) => {
                if provisional.wants_raw {
                    self.pending = Some(PendingPairing {
                        record: provisional,
                        since: now,
                    });
                } else {
                    outputs.push(PairingOutput::Record(provisional));
                }
            }
            Err(e) => outputs.push(PairingOutput::Error(e)),
        }

        outputs
    }

    /// Handle a `RAW_AUDIO:` body.
    pub fn on_raw_audio(&mut self, body: &str, _now: Instant) -> Vec<PairingOutput> {
        let Some(pending) = self.pending.take() else {
            return vec![PairingOutput::StrayRawAudio];
        };

        if body.is_empty() {
            return vec![PairingOutput::Error(Error::MalformedRawAudio(
                "empty payload".to_string(),
            ))];
        }

        match hex::decode(body) {
            Ok(bytes) => {
                let mut record = pending.record;
                record.raw_frame = Some(bytes);
                vec![PairingOutput::Record(record)]
            }
            // The pending metadata is discarded with its corrupt payload:
            // the pair is unrecoverable and the next detection must not
            // inherit it.
            Err(e) => vec![PairingOutput::Error(Error::MalformedRawAudio(
                e.to_string(),
            ))],
        }
    }

    /// Orphan the pending record if its raw frame is overdue.
    ///
    /// Driven by the reader loop on every iteration, so it fires even when
    /// the transport goes quiet.
    pub fn check_timeout(&mut self, now: Instant) -> Option<ProvisionalRecord> {
        let overdue = self
            .pending
            .as_ref()
            .is_some_and(|p| now.duration_since(p.since) >= self.timeout);
        if !overdue {
            return None;
        }
        self.pending.take().map(|p| orphan(p.record))
    }
}

impl Default for PacketPairer {
    fn default() -> Self {
        Self::new(DEFAULT_PAIRING_TIMEOUT)
    }
}

fn orphan(mut record: ProvisionalRecord) -> ProvisionalRecord {
    record.orphaned = true;
    record.raw_frame = None;
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    const META_WITH_RAW: &str = r#"{"timestamp":1700000000.0,"angle":90,"intensity":12,
        "direction":3,"all_directions":[1,2,3,12,4,5,6,7,8,9,10,11],"audio_map":[0]}"#;
    const META_NO_RAW: &str = r#"{"timestamp":1700000000.0,"angle":90,"intensity":12,
        "direction":3,"all_directions":[1,2,3,12,4,5,6,7,8,9,10,11]}"#;

    fn records(outputs: Vec<PairingOutput>) -> Vec<ProvisionalRecord> {
        outputs
            .into_iter()
            .filter_map(|o| match o {
                PairingOutput::Record(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_metadata_then_raw_pairs() {
        let mut pairer = PacketPairer::default();
        let now = Instant::now();

        assert!(records(pairer.on_metadata(META_WITH_RAW, now)).is_empty());
        assert!(pairer.is_awaiting_raw());

        let hex_body = "00".repeat(256);
        let recs = records(pairer.on_raw_audio(&hex_body, now));
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].raw_frame.as_ref().unwrap().len(), 256);
        assert!(!recs[0].orphaned);
        assert!(!pairer.is_awaiting_raw());
    }

    #[test]
    fn test_metadata_without_raw_emits_immediately() {
        let mut pairer = PacketPairer::default();
        let recs = records(pairer.on_metadata(META_NO_RAW, Instant::now()));
        assert_eq!(recs.len(), 1);
        assert!(recs[0].raw_frame.is_none());
        assert!(!recs[0].orphaned);
        assert!(!pairer.is_awaiting_raw());
    }

    #[test]
    fn test_second_metadata_orphans_first() {
        let mut pairer = PacketPairer::default();
        let now = Instant::now();

        pairer.on_metadata(META_WITH_RAW, now);
        let recs = records(pairer.on_metadata(META_WITH_RAW, now));

        // First record out orphaned, second now pending
        assert_eq!(recs.len(), 1);
        assert!(recs[0].orphaned);
        assert!(recs[0].raw_frame.is_none());
        assert!(pairer.is_awaiting_raw());
    }

    #[test]
    fn test_timeout_orphans_pending() {
        let mut pairer = PacketPairer::new(Duration::from_millis(100));
        let start = Instant::now();

        pairer.on_metadata(META_WITH_RAW, start);
        assert!(pairer.check_timeout(start).is_none());
        assert!(pairer
            .check_timeout(start + Duration::from_millis(50))
            .is_none());

        let orphaned = pairer
            .check_timeout(start + Duration::from_millis(150))
            .unwrap();
        assert!(orphaned.orphaned);
        assert!(!pairer.is_awaiting_raw());

        // A raw line arriving after the orphan must not attach to anything
        let out = pairer.on_raw_audio(&"00".repeat(256), start + Duration::from_millis(200));
        assert!(matches!(out[0], PairingOutput::StrayRawAudio));
    }

    #[test]
    fn test_malformed_metadata_stays_idle() {
        let mut pairer = PacketPairer::default();
        let out = pairer.on_metadata("{broken", Instant::now());
        assert_eq!(out.len(), 1);
        assert!(matches!(
            out[0],
            PairingOutput::Error(Error::MalformedMetadata(_))
        ));
        assert!(!pairer.is_awaiting_raw());
    }

    #[test]
    fn test_malformed_raw_discards_pending() {
        let mut pairer = PacketPairer::default();
        let now = Instant::now();

        pairer.on_metadata(META_WITH_RAW, now);
        let out = pairer.on_raw_audio("zz-not-hex", now);
        assert_eq!(out.len(), 1);
        assert!(matches!(
            out[0],
            PairingOutput::Error(Error::MalformedRawAudio(_))
        ));
        assert!(!pairer.is_awaiting_raw());
    }

    #[test]
    fn test_empty_raw_body_is_malformed() {
        let mut pairer = PacketPairer::default();
        pairer.on_metadata(META_WITH_RAW, Instant::now());
        let out = pairer.on_raw_audio("", Instant::now());
        assert!(matches!(
            out[0],
            PairingOutput::Error(Error::MalformedRawAudio(_))
        ));
    }

    #[test]
    fn test_stray_raw_in_idle() {
        let mut pairer = PacketPairer::default();
        let out = pairer.on_raw_audio("00ff", Instant::now());
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], PairingOutput::StrayRawAudio));
    }

    #[test]
    fn test_hex_round_trip() {
        let frame: Vec<u8> = (0..=255u8).collect();
        let mut pairer = PacketPairer::default();
        let now = Instant::now();

        pairer.on_metadata(META_WITH_RAW, now);
        let recs = records(pairer.on_raw_audio(&hex::encode(&frame), now));
        assert_eq!(recs[0].raw_frame.as_deref(), Some(frame.as_slice()));
    }

    #[test]
    fn test_short_frame_still_pairs() {
        // 150 bytes instead of 256: the validator flags it, the pairer
        // attaches it as-is
        let mut pairer = PacketPairer::default();
        let now = Instant::now();
        pairer.on_metadata(META_WITH_RAW, now);
        let recs = records(pairer.on_raw_audio(&"00".repeat(150), now));
        assert_eq!(recs[0].raw_frame.as_ref().unwrap().len(), 150);
    }
}
