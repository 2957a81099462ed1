//! Delta extraction from chat-completion SSE frames
//!
//! Interprets one frame at a time. Extraction is stateless: every frame is
//! judged on its own and a bad frame never affects the next one.

use serde_json::Value;
use tracing::debug;

/// Prefix marking a data-bearing frame
pub const DATA_PREFIX: &str = "data: ";

/// Payload of the end-of-stream sentinel frame
pub const DONE_TOKEN: &str = "[DONE]";

/// Outcome of interpreting a single frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Newly produced assistant text (may be empty)
    Fragment(String),
    /// Explicit `data: [DONE]` sentinel
    Done,
    /// Blank, comment, or unrecognized line
    Skip,
    /// Data frame whose payload failed to parse
    Malformed { error: String },
}

/// Parsed payload of a data frame
///
/// Logically `{ choices: [ { delta: { content } } ] }`; other fields are ignored.
#[derive(Debug, Clone)]
pub struct DeltaRecord {
    json: Value,
}

impl DeltaRecord {
    pub fn parse(payload: &str) -> serde_json::Result<Self> {
        let json = serde_json::from_str::<Value>(payload)?;
        Ok(Self { json })
    }

    fn first_choice(&self) -> Option<&Value> {
        self.json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
    }

    /// Text at `choices[0].delta.content`, or `""` when absent or not a string
    pub fn fragment(&self) -> &str {
        self.first_choice()
            .and_then(|choice| choice.get("delta"))
            .and_then(|delta| delta.get("content"))
            .and_then(|t| t.as_str())
            .unwrap_or("")
    }

    /// `choices[0].finish_reason`, when the provider sets it
    pub fn finish_reason(&self) -> Option<&str> {
        self.first_choice()
            .and_then(|choice| choice.get("finish_reason"))
            .and_then(|r| r.as_str())
    }
}

/// Interpret one frame as a protocol event
pub fn extract(frame: &str) -> SseEvent {
    // Tolerate CRLF line endings
    let line = frame.strip_suffix('\r').unwrap_or(frame);

    if line.trim().is_empty() {
        return SseEvent::Skip;
    }

    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        // Comments (":"), "event:" lines and anything newer are ignored
        return SseEvent::Skip;
    };

    if payload == DONE_TOKEN {
        return SseEvent::Done;
    }

    match DeltaRecord::parse(payload) {
        Ok(record) => {
            if let Some(reason) = record.finish_reason() {
                debug!("Delta carries finish_reason={}", reason);
            }
            SseEvent::Fragment(record.fragment().to_string())
        }
        Err(e) => SseEvent::Malformed {
            error: e.to_string(),
        },
    }
}
