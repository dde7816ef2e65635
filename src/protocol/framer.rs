//! Line framer: unbounded byte stream in, complete text lines out.
//!
//! The transport delivers bytes in arbitrary-sized chunks with no respect
//! for line boundaries. The framer buffers the unterminated tail across
//! reads and only releases a line once its `\n` arrives. Decoding is lossy:
//! a glitched byte becomes U+FFFD instead of killing the stream.

/// Default cap on a single line; a stuck producer cannot grow the buffer
/// past this. The longest legitimate line is a metadata packet carrying an
/// inline 256-cell audio_map, well under 2 KiB.
pub const DEFAULT_MAX_LINE_LEN: usize = 4096;

/// One decoded line with its terminator stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramedLine {
    pub text: String,
    /// Line exceeded the length cap and lost its tail
    pub truncated: bool,
}

/// Reassembles newline-terminated lines from arbitrary byte chunks
pub struct LineFramer {
    buf: Vec<u8>,
    max_line_len: usize,
    /// Currently discarding an over-long line's tail until its terminator
    overflowed: bool,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::with_max_line_len(DEFAULT_MAX_LINE_LEN)
    }

    pub fn with_max_line_len(max_line_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_line_len: max_line_len.max(1),
            overflowed: false,
        }
    }

    /// Feed a chunk of bytes, returning every line completed by it.
    ///
    /// A line split across chunks is held back until its `\n` arrives.
    /// Terminators (`\n`, optionally preceded by `\r`) are stripped.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<FramedLine> {
        let mut lines = Vec::new();

        for &b in bytes {
            if b == b'\n' {
                lines.push(self.take_line());
                continue;
            }

            if self.overflowed {
                // Drop the tail of an over-long line, keep waiting for '\n'
                continue;
            }

            if self.buf.len() >= self.max_line_len {
                self.overflowed = true;
                continue;
            }

            self.buf.push(b);
        }

        lines
    }

    fn take_line(&mut self) -> FramedLine {
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        let text = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        let truncated = self.overflowed;
        self.overflowed = false;
        FramedLine { text, truncated }
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_complete_line() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"hello\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "hello");
        assert!(!lines[0].truncated);
    }

    #[test]
    fn test_crlf_stripped() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"hello\r\n");
        assert_eq!(lines[0].text, "hello");
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"AUDIO_PA").is_empty());
        assert!(framer.push(b"CKET:{}").is_empty());
        let lines = framer.push(b"\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "AUDIO_PACKET:{}");
    }

    #[test]
    fn test_split_at_every_offset() {
        let input = b"AUDIO_PACKET:{\"angle\":90}\r\n";
        for split in 0..input.len() {
            let mut framer = LineFramer::new();
            let mut lines = framer.push(&input[..split]);
            lines.extend(framer.push(&input[split..]));
            assert_eq!(lines.len(), 1, "split at {}", split);
            assert_eq!(lines[0].text, "AUDIO_PACKET:{\"angle\":90}");
        }
    }

    #[test]
    fn test_multiple_lines_one_chunk() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"one\ntwo\nthree\n");
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, ["one", "two", "three"]);
    }

    #[test]
    fn test_trailing_partial_held_back() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"done\npart");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "done");
        let lines = framer.push(b"ial\n");
        assert_eq!(lines[0].text, "partial");
    }

    #[test]
    fn test_invalid_utf8_replaced() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"ok \xff\xfe glitch\n");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].text.contains('\u{FFFD}'));
        assert!(lines[0].text.starts_with("ok "));
    }

    #[test]
    fn test_overlong_line_truncated_and_flagged() {
        let mut framer = LineFramer::with_max_line_len(8);
        let lines = framer.push(b"0123456789abcdef\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "01234567");
        assert!(lines[0].truncated);
    }

    #[test]
    fn test_overflow_recovers_on_next_line() {
        let mut framer = LineFramer::with_max_line_len(8);
        let mut lines = framer.push(b"0123456789abcdef\nshort\n");
        assert_eq!(lines.len(), 2);
        assert!(lines[0].truncated);
        let second = lines.pop().unwrap();
        assert_eq!(second.text, "short");
        assert!(!second.truncated);
    }

    #[test]
    fn test_overflow_spanning_chunks() {
        let mut framer = LineFramer::with_max_line_len(4);
        assert!(framer.push(b"abcdef").is_empty());
        assert!(framer.push(b"ghij").is_empty());
        let lines = framer.push(b"kl\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "abcd");
        assert!(lines[0].truncated);
    }

    #[test]
    fn test_empty_lines_emitted() {
        // The framer reports them; the classifier discards them
        let mut framer = LineFramer::new();
        let lines = framer.push(b"\n\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "");
    }
}
