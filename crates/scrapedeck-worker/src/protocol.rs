//! Worker stdout protocol: line splitting and event classification
//!
//! The worker writes newline-delimited UTF-8. A line that starts with
//! [`EVENT_MARKER`] followed by a JSON object is a structured event; every other
//! non-blank line is plain log text. Malformed event JSON degrades to a log line
//! so the worker's text protocol can never take the supervisor down.

use scrapedeck_core::StructuredEvent;

/// Literal prefix of a structured event line
pub const EVENT_MARKER: &str = "EVENT:";

// ─────────────────────────────────────────────────────────
// Line Splitter
// ─────────────────────────────────────────────────────────

/// Turns arbitrarily chunked bytes into complete lines.
///
/// Bytes after the last `\n` are carried over to the next [`push`](Self::push).
/// Decoding happens per complete line, so a multi-byte character split across
/// two chunks decodes the same as if it had arrived whole.
#[derive(Debug, Default)]
pub struct LineSplitter {
    carry: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed (terminators stripped)
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.carry.extend_from_slice(&rest[..pos]);
            lines.push(decode_line(&self.carry));
            self.carry.clear();
            rest = &rest[pos + 1..];
        }

        self.carry.extend_from_slice(rest);
        lines
    }

    /// Flush the trailing partial line, if any.
    ///
    /// Called once the stream hits EOF; output without a final newline is
    /// treated as a complete line.
    pub fn finish(&mut self) -> Option<String> {
        if self.carry.is_empty() {
            return None;
        }
        let line = decode_line(&self.carry);
        self.carry.clear();
        Some(line)
    }

    /// Number of buffered bytes not yet terminated by a newline
    pub fn pending_len(&self) -> usize {
        self.carry.len()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

// ─────────────────────────────────────────────────────────
// Event Classifier
// ─────────────────────────────────────────────────────────

/// A classified line of worker stdout
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerLine {
    Event(StructuredEvent),
    Text(String),
}

/// Classify one complete stdout line.
///
/// Returns `None` for blank or whitespace-only lines. Lines carrying the event
/// marker but invalid JSON come back as `Text` holding the whole trimmed line.
pub fn parse_worker_line(line: &str) -> Option<WorkerLine> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let Some(payload) = trimmed.strip_prefix(EVENT_MARKER) else {
        return Some(WorkerLine::Text(trimmed.to_string()));
    };

    match serde_json::from_str::<StructuredEvent>(payload) {
        Ok(event) => Some(WorkerLine::Event(event)),
        Err(e) => {
            tracing::debug!("Malformed worker event, treating as log line: {}", e);
            Some(WorkerLine::Text(trimmed.to_string()))
        }
    }
}
