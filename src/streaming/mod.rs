//! Line framing for incrementally delivered response bodies
//!
//! The upstream inference endpoint answers with NDJSON: one JSON record per
//! line, delivered in network chunks that do not respect line boundaries.

/// Buffer for accumulating incomplete lines across chunk boundaries.
///
/// Bytes are kept raw until a `\n` arrives, so multi-byte UTF-8 sequences
/// split between two chunks decode correctly.
///
/// # Example
/// ```
/// use notion2api::streaming::LineBuffer;
///
/// let mut buffer = LineBuffer::new();
///
/// let lines1 = buffer.feed(b"{\"type\":\"pat");
/// assert!(lines1.is_empty());
///
/// let lines2 = buffer.feed(b"ch\"}\n");
/// assert_eq!(lines2, vec!["{\"type\":\"patch\"}"]);
/// ```
#[derive(Debug, Default)]
pub struct LineBuffer {
    /// Bytes after the last newline seen
    incomplete: Vec<u8>,
}

impl LineBuffer {
    /// Create a new empty buffer
    pub fn new() -> Self {
        Self {
            incomplete: Vec::new(),
        }
    }

    /// Feed bytes into the buffer and return any complete lines.
    ///
    /// Lines are returned without their `\n` (and without a trailing `\r`).
    /// Blank lines are dropped. Invalid UTF-8 inside a complete line is
    /// replaced with U+FFFD.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.incomplete.extend_from_slice(bytes);

        let mut complete_lines = Vec::new();
        let mut start = 0;

        while let Some(offset) = self.incomplete[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            if let Some(line) = decode_line(&self.incomplete[start..end]) {
                complete_lines.push(line);
            }
            start = end + 1;
        }

        self.incomplete.drain(..start);
        complete_lines
    }

    /// Check if there's any incomplete data remaining in the buffer.
    pub fn has_incomplete(&self) -> bool {
        !self.incomplete.is_empty()
    }

    /// Take the trailing line that never received a newline.
    ///
    /// Call this once the body has ended; some servers omit the final `\n`.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.incomplete);
        decode_line(&rest)
    }
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = String::from_utf8_lossy(raw);
    if line.trim().is_empty() {
        None
    } else {
        Some(line.into_owned())
    }
}
