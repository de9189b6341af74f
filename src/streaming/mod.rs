use bytes::{Buf, BytesMut};
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{RequestFailure, UNSET_ERROR_CODE};
use crate::models::openai::ChatCompletionChunk;

/// Prefix of every SSE data line
const DATA_PREFIX: &str = "data:";

/// Sentinel payload marking the end of the stream
const DONE_MARKER: &str = "[DONE]";

/// Delta fields that may carry generated text, in priority order.
///
/// The first non-empty one wins.
pub const CONTENT_FIELDS: &[&str] = &["content", "reasoning_content"];

// ==================================================================================================
// Line framing
// ==================================================================================================

/// Splits a chunked byte stream into complete text lines.
///
/// Bytes are buffered until a `\n` arrives, so a multi-byte UTF-8 character
/// split across two chunks is decoded intact.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buffer: BytesMut,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the decoder and return every line completed by them.
    ///
    /// Returned lines have their terminator (`\n` or `\r\n`) removed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos);
            self.buffer.advance(1);
            lines.push(decode_line(&line));
        }
        lines
    }

    /// Flush a final line that was not newline-terminated
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = self.buffer.split();
        Some(decode_line(&line))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

// ==================================================================================================
// Event parsing
// ==================================================================================================

/// One parsed server-sent event payload
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A delta; `content` is empty when the delta carried no text
    TokenDelta { content: String },
    /// The `[DONE]` sentinel
    Done,
    /// A provider error object inside the stream
    ErrorPayload { message: String, code: i64 },
    /// A payload that could not be decoded; ignored
    Unparseable,
}

impl StreamEvent {
    /// Parse a single line of the stream.
    ///
    /// Returns `None` for blank lines and SSE comments, which carry no event.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with(':') {
            return None;
        }

        let payload = line
            .strip_prefix(DATA_PREFIX)
            .map(str::trim_start)
            .unwrap_or(line);

        if payload == DONE_MARKER {
            return Some(StreamEvent::Done);
        }

        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    error = %e,
                    chunk = %truncate(payload, 100),
                    "Skipping chunk that is not valid JSON"
                );
                return Some(StreamEvent::Unparseable);
            }
        };

        // An error object aborts the stream whatever shape the other fields have
        if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
            let (message, code) = parse_error_object(error);
            return Some(StreamEvent::ErrorPayload { message, code });
        }

        let chunk: ChatCompletionChunk = match serde_json::from_value(value) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(
                    error = %e,
                    chunk = %truncate(payload, 100),
                    "Skipping chunk with unexpected shape"
                );
                return Some(StreamEvent::Unparseable);
            }
        };

        if let Some(reason) = chunk.finish_reason() {
            debug!(finish_reason = reason, "Choice finished");
        }

        let content = chunk.first_delta().map(extract_content).unwrap_or_default();
        Some(StreamEvent::TokenDelta { content })
    }
}

/// First non-empty candidate content field of a delta
pub fn extract_content(delta: &Map<String, Value>) -> String {
    CONTENT_FIELDS
        .iter()
        .filter_map(|field| delta.get(*field).and_then(Value::as_str))
        .find(|text| !text.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Extract `(message, code)` from a provider error value.
///
/// Codes may arrive as numbers or numeric strings; anything else maps to the
/// unset sentinel.
fn parse_error_object(error: &Value) -> (String, i64) {
    match error {
        Value::String(message) => (message.clone(), UNSET_ERROR_CODE),
        Value::Object(obj) => {
            let message = match obj.get("message") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            let code = obj
                .get("code")
                .and_then(|code| match code {
                    Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
                    Value::String(s) => s.trim().parse().ok(),
                    _ => None,
                })
                .unwrap_or(UNSET_ERROR_CODE);
            (message, code)
        }
        other => (other.to_string(), UNSET_ERROR_CODE),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

// ==================================================================================================
// Timing
// ==================================================================================================

/// Inter-arrival durations of token-bearing deltas, in arrival order.
///
/// Entry 0 is time-to-first-token; entry `i` is the gap before token `i`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingTrace {
    entries: Vec<Duration>,
}

impl TimingTrace {
    pub fn push(&mut self, duration: Duration) {
        self.entries.push(duration);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Duration] {
        &self.entries
    }

    pub fn time_to_first_token(&self) -> Option<Duration> {
        self.entries.first().copied()
    }

    /// Mean of all entries, including the first
    pub fn mean(&self) -> Option<Duration> {
        if self.entries.is_empty() {
            return None;
        }
        let total: Duration = self.entries.iter().sum();
        Some(total / self.entries.len() as u32)
    }
}

// ==================================================================================================
// Per-request accumulator
// ==================================================================================================

/// Per-request stream state: timing trace plus generated text.
///
/// Owned by a single `execute` call and never shared.
#[derive(Debug)]
pub struct StreamAccumulator {
    start: Instant,
    last_token_at: Option<Instant>,
    trace: TimingTrace,
    generated_text: String,
    finished: bool,
}

impl StreamAccumulator {
    /// Start accumulating for a request dispatched at `start`
    pub fn new(start: Instant) -> Self {
        Self {
            start,
            last_token_at: None,
            trace: TimingTrace::default(),
            generated_text: String::new(),
            finished: false,
        }
    }

    /// Process one raw line that arrived at `now`.
    ///
    /// Returns an error when the line carries a provider error; the caller
    /// must stop reading.
    pub fn on_line(&mut self, line: &str, now: Instant) -> Result<(), RequestFailure> {
        match StreamEvent::parse(line) {
            Some(event) => self.on_event(event, now),
            None => Ok(()),
        }
    }

    /// Apply a parsed event that arrived at `now`
    pub fn on_event(&mut self, event: StreamEvent, now: Instant) -> Result<(), RequestFailure> {
        match event {
            StreamEvent::TokenDelta { content } => {
                if content.is_empty() {
                    return Ok(());
                }
                let gap = match self.last_token_at {
                    None => now.saturating_duration_since(self.start),
                    Some(previous) => now.saturating_duration_since(previous),
                };
                self.trace.push(gap);
                self.last_token_at = Some(now);
                self.generated_text.push_str(&content);
                Ok(())
            }
            StreamEvent::Done => {
                debug!("Received [DONE] marker");
                self.finished = true;
                Ok(())
            }
            StreamEvent::ErrorPayload { message, code } => {
                warn!(code, message = %message, "Provider returned an error inside the stream");
                Err(RequestFailure::StreamProtocol { code, message })
            }
            StreamEvent::Unparseable => Ok(()),
        }
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn trace(&self) -> &TimingTrace {
        &self.trace
    }

    pub fn generated_text(&self) -> &str {
        &self.generated_text
    }

    /// Whether the `[DONE]` sentinel has been seen
    pub fn saw_done(&self) -> bool {
        self.finished
    }

    /// Consume the accumulator, returning the trace and generated text
    pub fn into_parts(self) -> (TimingTrace, String) {
        (self.trace, self.generated_text)
    }
}
