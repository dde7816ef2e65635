//! Line classifier: tags each framed line by protocol role.
//!
//! The sensor firmware interleaves protocol lines with free-form prints
//! (boot banners, REPL prompts, detection logs in the board's own format).
//! Everything that is not a recognized protocol line is device chatter,
//! forwarded for display and never parsed.

use super::framer::FramedLine;

/// Prefix of a structured detection summary line
pub const METADATA_PREFIX: &str = "AUDIO_PACKET:";

/// Prefix of a hex-encoded heat-map line
pub const RAW_AUDIO_PREFIX: &str = "RAW_AUDIO:";

/// A line tagged by its role in the wire protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// JSON detection summary (body after the prefix)
    Metadata(String),
    /// Hex heat-map payload (body after the prefix)
    RawAudio(String),
    /// Free-form producer output, display only
    DeviceLog(String),
    /// Truncated or mangled input that matches neither protocol prefix
    /// nor plausible device chatter
    Unrecognized(String),
}

/// Classify one framed line; `None` for empty lines, which carry nothing.
///
/// Leading/trailing whitespace is not significant on this link and is
/// stripped before matching.
pub fn classify(line: FramedLine) -> Option<Line> {
    let text = line.text.trim();
    if text.is_empty() {
        return None;
    }

    if line.truncated {
        return Some(Line::Unrecognized(text.to_string()));
    }

    if let Some(body) = text.strip_prefix(METADATA_PREFIX) {
        return Some(Line::Metadata(body.to_string()));
    }

    if let Some(body) = text.strip_prefix(RAW_AUDIO_PREFIX) {
        return Some(Line::RawAudio(body.to_string()));
    }

    // A line that starts like a protocol line but doesn't complete either
    // prefix is corruption, not chatter. Displaying it would leak fragments
    // of hex or JSON into the console.
    if text.starts_with("AUDIO_") || text.starts_with("RAW_") {
        return Some(Line::Unrecognized(text.to_string()));
    }

    Some(Line::DeviceLog(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(text: &str) -> FramedLine {
        FramedLine {
            text: text.to_string(),
            truncated: false,
        }
    }

    #[test]
    fn test_metadata_line() {
        let line = classify(framed("AUDIO_PACKET:{\"angle\":90}")).unwrap();
        assert_eq!(line, Line::Metadata("{\"angle\":90}".to_string()));
    }

    #[test]
    fn test_raw_audio_line() {
        let line = classify(framed("RAW_AUDIO:00ff00ff")).unwrap();
        assert_eq!(line, Line::RawAudio("00ff00ff".to_string()));
    }

    #[test]
    fn test_empty_body_still_classified() {
        // Prefix with nothing after it: a protocol line with an empty body.
        // The pairing layer decides what that means.
        assert_eq!(
            classify(framed("RAW_AUDIO:")).unwrap(),
            Line::RawAudio(String::new())
        );
    }

    #[test]
    fn test_device_log_line() {
        let line = classify(framed("mic array initialized")).unwrap();
        assert_eq!(line, Line::DeviceLog("mic array initialized".to_string()));
    }

    #[test]
    fn test_repl_prompt_is_device_log() {
        let line = classify(framed(">>> ")).unwrap();
        assert!(matches!(line, Line::DeviceLog(_)));
    }

    #[test]
    fn test_empty_line_discarded() {
        assert_eq!(classify(framed("")), None);
    }

    #[test]
    fn test_mangled_prefix_unrecognized() {
        assert!(matches!(
            classify(framed("AUDIO_PACK{\"angle\"")).unwrap(),
            Line::Unrecognized(_)
        ));
        assert!(matches!(
            classify(framed("RAW_AU00ff")).unwrap(),
            Line::Unrecognized(_)
        ));
    }

    #[test]
    fn test_truncated_line_unrecognized() {
        let line = classify(FramedLine {
            text: "AUDIO_PACKET:{\"angle\":9".to_string(),
            truncated: true,
        })
        .unwrap();
        assert!(matches!(line, Line::Unrecognized(_)));
    }
}
