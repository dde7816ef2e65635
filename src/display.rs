//! Console sink for decoded events.
//!
//! Mirrors what the field receivers printed: a one-glance summary per
//! detection, heat-map statistics when a frame came through, and the
//! board's own chatter prefixed so it can't be mistaken for host output.

use crate::record::DetectionRecord;
use crate::storage::StoredPaths;
use crate::supervisor::Event;
use chrono::{Local, LocalResult, TimeZone};

/// Prints events to stdout
pub struct ConsoleSink {
    /// Include the full 12-bearing intensity vector per detection
    pub show_bearings: bool,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self {
            show_bearings: true,
        }
    }

    pub fn handle(&self, event: &Event) {
        match event {
            Event::Detection { record, stored } => self.print_detection(record, stored.as_ref()),
            Event::DeviceLog(text) => println!("[device] {}", text),
        }
    }

    fn print_detection(&self, record: &DetectionRecord, stored: Option<&StoredPaths>) {
        println!(
            "[{}] sound detected  angle={}\u{b0}  intensity={}  direction={}{}",
            format_time(record.timestamp),
            record.angle,
            record.intensity,
            record.direction,
            if record.orphaned { "  (orphaned)" } else { "" },
        );

        if self.show_bearings {
            println!("  bearings: {:?}", record.all_directions);
        }

        if let Some(stats) = record.frame_stats() {
            let len = record.raw_frame.as_ref().map_or(0, Vec::len);
            println!(
                "  heat-map: {} bytes  min={} max={} mean={:.1}{}",
                len,
                stats.min,
                stats.max,
                stats.mean,
                if record.frame_anomaly {
                    "  (length anomaly)"
                } else {
                    ""
                },
            );
        }

        if let Some(paths) = stored {
            println!("  saved: {}", paths.sidecar.display());
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Local wall-clock `HH:MM:SS.mmm` for a detection timestamp
fn format_time(timestamp: f64) -> String {
    let millis = (timestamp * 1e3).round() as i64;
    match Local.timestamp_millis_opt(millis) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
            dt.format("%H:%M:%S%.3f").to_string()
        }
        LocalResult::None => format!("{:.3}", timestamp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time_is_wall_clock() {
        let formatted = format_time(1700000000.25);
        // HH:MM:SS.mmm
        assert_eq!(formatted.len(), 12);
        assert!(formatted.ends_with(".250"));
    }

    #[test]
    fn test_format_time_out_of_range_falls_back() {
        let formatted = format_time(1e18);
        assert!(formatted.contains('.'));
    }
}
