//! Stream-fatal errors
//!
//! Only transport-level failures end a stream. Malformed bytes and frames are
//! absorbed by the decoder and never show up here.

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum StreamError {
    /// Connection failure or body read error
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// Server answered with a non-success status
    #[error("request failed: {status} {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("no API key configured (set TRICKLE_API_KEY or api_key in config.toml)")]
    MissingApiKey,
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        StreamError::Transport(Box::new(err))
    }
}
