//! Detection persistence: heat-map binary plus JSON sidecar.
//!
//! Layout matches the deployed receivers: one directory per deployment,
//! per detection a `<base>.raw` (heat-map bytes, only when present) and a
//! `<base>.json` (full scalar record), with `<base>` derived from the
//! detection timestamp at microsecond resolution.

use crate::error::{Error, Result};
use crate::record::DetectionRecord;
use chrono::{Local, LocalResult, TimeZone};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Where a persisted detection landed
#[derive(Debug, Clone)]
pub struct StoredPaths {
    /// Binary heat-map file, absent for metadata-only records
    pub raw: Option<PathBuf>,
    /// Scalar sidecar, always written
    pub sidecar: PathBuf,
}

/// Scalar sidecar shape. The heat-map itself lives in the `.raw` file;
/// the sidecar records how many bytes of it actually arrived.
#[derive(Serialize)]
struct Sidecar<'a> {
    timestamp: f64,
    angle: u16,
    intensity: u32,
    direction: usize,
    all_directions: &'a [u32],
    orphaned: bool,
    frame_anomaly: bool,
    raw_frame_len: Option<usize>,
}

/// Writes validated detections under a configured directory
pub struct DetectionStore {
    dir: PathBuf,
}

impl DetectionStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Durably store one record.
    ///
    /// The binary payload goes first, the sidecar second: a crash between
    /// the two leaves an unnamed `.raw`, never a sidecar pointing at a
    /// missing payload. Base-name collisions get a counter suffix rather
    /// than overwriting an earlier detection.
    pub fn persist(&self, record: &DetectionRecord) -> Result<StoredPaths> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            Error::Persistence(format!("create {}: {}", self.dir.display(), e))
        })?;

        let base = self.unique_base(&base_name(record.timestamp));
        let sidecar_path = self.dir.join(format!("{}.json", base));

        let raw_path = match &record.raw_frame {
            Some(frame) => {
                let path = self.dir.join(format!("{}.raw", base));
                fs::write(&path, frame)
                    .map_err(|e| Error::Persistence(format!("write {}: {}", path.display(), e)))?;
                Some(path)
            }
            None => None,
        };

        let sidecar = Sidecar {
            timestamp: record.timestamp,
            angle: record.angle,
            intensity: record.intensity,
            direction: record.direction,
            all_directions: &record.all_directions,
            orphaned: record.orphaned,
            frame_anomaly: record.frame_anomaly,
            raw_frame_len: record.raw_frame.as_ref().map(Vec::len),
        };
        let json = serde_json::to_vec_pretty(&sidecar)
            .map_err(|e| Error::Persistence(e.to_string()))?;
        fs::write(&sidecar_path, json).map_err(|e| {
            Error::Persistence(format!("write {}: {}", sidecar_path.display(), e))
        })?;

        log::debug!("Stored detection as {}", base);
        Ok(StoredPaths {
            raw: raw_path,
            sidecar: sidecar_path,
        })
    }

    /// First base name (suffixed if needed) whose files do not exist yet
    fn unique_base(&self, base: &str) -> String {
        let free = |candidate: &str| {
            !self.dir.join(format!("{}.json", candidate)).exists()
                && !self.dir.join(format!("{}.raw", candidate)).exists()
        };

        if free(base) {
            return base.to_string();
        }
        let mut n = 1u32;
        loop {
            let candidate = format!("{}_{}", base, n);
            if free(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// `audio_YYYYmmdd_HHMMSS_ffffff` in local time at microsecond resolution
fn base_name(timestamp: f64) -> String {
    let micros = (timestamp * 1e6).round() as i64;
    match Local.timestamp_micros(micros) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
            format!("audio_{}", dt.format("%Y%m%d_%H%M%S_%6f"))
        }
        // Timestamp outside the representable range (a producer clock gone
        // wild); keep it storable rather than failing the write
        LocalResult::None => format!("audio_{}us", micros),
    }
}
