//! Cancellation support for streaming turns
//!
//! Allows interrupting an in-flight request and the stream that follows it.

use tokio_util::sync::CancellationToken;

/// Wrapper around CancellationToken for turn cancellation
#[derive(Clone)]
pub struct StreamCancellation {
    token: CancellationToken,
}

impl StreamCancellation {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Cancel the current turn
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token for the current turn
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Create a fresh token (for starting a new request)
    pub fn reset(&mut self) {
        self.token = CancellationToken::new();
    }
}

impl Default for StreamCancellation {
    fn default() -> Self {
        Self::new()
    }
}
