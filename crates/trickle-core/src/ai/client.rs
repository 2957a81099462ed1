//! Streaming chat-completion client
//!
//! Sends the transcript, checks the response status, then hands the body to
//! the SSE decoder. Transport retries are deliberately not attempted.

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::sse::{decode_stream, SseStreamProcessor, StreamOutcome, StreamSummary};
use crate::config::ChatConfig;
use crate::error::StreamError;
use crate::transcript::{Message, TranscriptSink};

/// HTTP client for one chat endpoint
pub struct ChatClient {
    http: reqwest::Client,
    config: ChatConfig,
}

impl ChatClient {
    pub fn new(config: ChatConfig) -> Self {
        Self::with_http(config, reqwest::Client::new())
    }

    /// Use a preconfigured `reqwest::Client` (proxies, timeouts, ...)
    pub fn with_http(config: ChatConfig, http: reqwest::Client) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Request body: system prompt, then the whole transcript, streaming on
    pub fn request_body(&self, messages: &[Message]) -> Value {
        let mut all = Vec::with_capacity(messages.len() + 1);
        all.push(serde_json::json!({
            "role": "system",
            "content": self.config.system_prompt,
        }));
        all.extend(messages.iter().map(|m| serde_json::json!(m)));

        serde_json::json!({
            "model": self.config.model,
            "messages": all,
            "stream": true,
        })
    }

    /// Send `messages` and stream the reply into `sink`
    ///
    /// The assistant message is opened only once the server has accepted the
    /// request. Cancelling before response headers arrive opens nothing.
    pub async fn stream_reply<S: TranscriptSink + ?Sized>(
        &self,
        messages: &[Message],
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<StreamSummary, StreamError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(StreamError::MissingApiKey)?;

        let request = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(api_key)
            .json(&self.request_body(messages));

        info!(
            "Streaming chat request: model={}, {} messages",
            self.config.model,
            messages.len()
        );

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Request cancelled before response");
                return Ok(SseStreamProcessor::new().finish(StreamOutcome::Cancelled));
            }
            response = request.send() => response?,
        };
        let response = handle_error_response(response).await?;

        sink.open_assistant_message();
        decode_stream(response.bytes_stream(), sink, cancel).await
    }
}

/// Turn a non-success status into `StreamError::Status`
async fn handle_error_response(
    response: reqwest::Response,
) -> Result<reqwest::Response, StreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!("Chat request failed: {} {}", status, body);
    Err(StreamError::Status { status, body })
}
