//! Trickle core library
//!
//! Decodes streamed chat-completion responses into a growing transcript.

pub mod agent;
pub mod ai;
pub mod config;
pub mod error;
pub mod transcript;

pub use agent::cancellation::StreamCancellation;
pub use ai::client::ChatClient;
pub use ai::sse::{decode_stream, StreamOutcome, StreamStats, StreamSummary};
pub use config::ChatConfig;
pub use error::StreamError;
pub use transcript::{Message, Role, Transcript, TranscriptSink};
