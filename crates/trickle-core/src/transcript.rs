//! Conversation transcript
//!
//! The host owns the transcript. Stream decoding only ever touches it through
//! [`TranscriptSink`]: open an assistant message, then append to it.

use serde::{Deserialize, Serialize};

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single transcript entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The two operations a decoder needs from its host
pub trait TranscriptSink {
    /// Start a new, empty assistant message for this turn
    fn open_assistant_message(&mut self);

    /// Append to the last message if and only if it is an assistant message
    fn append_fragment(&mut self, fragment: &str);
}

/// Ordered list of messages for one conversation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    /// Append to the trailing assistant message
    ///
    /// Returns false (and changes nothing) if the last message is not from the
    /// assistant.
    pub fn append_to_assistant(&mut self, fragment: &str) -> bool {
        match self.messages.last_mut() {
            Some(last) if last.role == Role::Assistant => {
                last.content.push_str(fragment);
                true
            }
            _ => false,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl TranscriptSink for Transcript {
    fn open_assistant_message(&mut self) {
        self.messages.push(Message::assistant(String::new()));
    }

    fn append_fragment(&mut self, fragment: &str) {
        if !self.append_to_assistant(fragment) {
            tracing::debug!(
                "Dropping {} byte fragment: last message is not an assistant message",
                fragment.len()
            );
        }
    }
}
