//! SSE (Server-Sent Events) stream processing
//!
//! Drives frame splitting and delta extraction over a chat-completion body,
//! applying fragments to the host transcript strictly in arrival order.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::delta::{extract, SseEvent};
use super::frame::DecodeBuffer;
use crate::error::{BoxError, StreamError};
use crate::transcript::TranscriptSink;

/// How a stream ended (transport failures are reported as `Err` instead)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Transport signalled end of body
    Completed,
    /// Caller cancelled; nothing was applied after the request
    Cancelled,
}

/// Counters collected while decoding one stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub bytes_received: usize,
    pub frames: usize,
    pub fragments: usize,
    /// Data frames whose payload failed to parse
    pub dropped_frames: usize,
    /// Whether a `data: [DONE]` sentinel was seen
    pub done_received: bool,
    /// Unterminated bytes thrown away at end of stream
    pub discarded_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct StreamSummary {
    pub outcome: StreamOutcome,
    pub stats: StreamStats,
    pub elapsed: Duration,
}

/// Per-stream processor that handles partial frames and delta extraction
pub struct SseStreamProcessor {
    /// Undecoded bytes and the unterminated frame from previous chunks
    buffer: DecodeBuffer,
    /// When the stream started
    stream_start: Instant,
    stats: StreamStats,
}

impl SseStreamProcessor {
    pub fn new() -> Self {
        debug!("SSE stream processor created");
        Self {
            buffer: DecodeBuffer::new(),
            stream_start: Instant::now(),
            stats: StreamStats::default(),
        }
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// Process a chunk of bytes from the SSE stream
    ///
    /// Returns `false` if cancellation was observed before every completed
    /// frame could be applied. Remaining frames are not applied.
    pub fn process_chunk<S: TranscriptSink + ?Sized>(
        &mut self,
        bytes: &[u8],
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> bool {
        self.stats.bytes_received += bytes.len();
        debug!(
            "SSE chunk received: {} bytes (total: {} bytes)",
            bytes.len(),
            self.stats.bytes_received
        );

        for frame in self.buffer.push(bytes) {
            if cancel.is_cancelled() {
                debug!("Cancellation observed mid-chunk, not applying remaining frames");
                return false;
            }
            self.process_frame(&frame, sink);
        }
        true
    }

    /// Interpret one complete frame and apply its fragment, if any
    fn process_frame<S: TranscriptSink + ?Sized>(&mut self, frame: &str, sink: &mut S) {
        self.stats.frames += 1;

        match extract(frame) {
            SseEvent::Fragment(text) => {
                debug!("  -> Fragment: {} chars", text.len());
                if self.stats.done_received {
                    warn!("SSE fragment received after [DONE] marker");
                }
                self.stats.fragments += 1;
                sink.append_fragment(&text);
            }
            SseEvent::Done => {
                info!(
                    "SSE stream [DONE] marker received after {:?}, {} frames, {} bytes",
                    self.stream_start.elapsed(),
                    self.stats.frames,
                    self.stats.bytes_received
                );
                self.stats.done_received = true;
            }
            SseEvent::Skip => {}
            SseEvent::Malformed { error } => {
                self.stats.dropped_frames += 1;
                warn!(
                    "Failed to parse SSE JSON (frame #{}): {}: {}",
                    self.stats.frames, error, frame
                );
            }
        }
    }

    /// Finish processing; any unterminated frame is discarded
    pub fn finish(self, outcome: StreamOutcome) -> StreamSummary {
        let elapsed = self.stream_start.elapsed();
        let mut stats = self.stats;
        stats.discarded_bytes = self.buffer.finish();
        info!(
            "SSE stream {:?} after {:?}: {} frames, {} fragments, {} dropped, {} bytes total",
            outcome,
            elapsed,
            stats.frames,
            stats.fragments,
            stats.dropped_frames,
            stats.bytes_received
        );
        StreamSummary {
            outcome,
            stats,
            elapsed,
        }
    }
}

impl Default for SseStreamProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Consume a byte stream to completion, appending fragments to `sink`
///
/// Chunks are processed one at a time in delivery order. Each pull races the
/// cancellation token; once cancelled, no further fragments are applied. The
/// stream is owned here and dropped on every return path, which releases the
/// underlying connection.
pub async fn decode_stream<St, E, S>(
    stream: St,
    sink: &mut S,
    cancel: &CancellationToken,
) -> Result<StreamSummary, StreamError>
where
    St: Stream<Item = Result<Bytes, E>>,
    E: Into<BoxError>,
    S: TranscriptSink + ?Sized,
{
    let mut stream = std::pin::pin!(stream);
    let mut processor = SseStreamProcessor::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Ok(processor.finish(StreamOutcome::Cancelled));
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                if !processor.process_chunk(&chunk, sink, cancel) {
                    return Ok(processor.finish(StreamOutcome::Cancelled));
                }
            }
            Some(Err(e)) => {
                let err = StreamError::Transport(e.into());
                warn!(
                    "SSE stream failed after {} bytes, {} fragments applied: {}",
                    processor.stats().bytes_received,
                    processor.stats().fragments,
                    err
                );
                return Err(err);
            }
            None => return Ok(processor.finish(StreamOutcome::Completed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::{Message, Transcript};
    use futures::stream;
    use std::io;

    fn data_frame(content: &str) -> String {
        let payload = serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]
        });
        format!("data: {}\n", payload)
    }

    fn ok_chunks(chunks: Vec<Vec<u8>>) -> impl Stream<Item = Result<Bytes, io::Error>> {
        stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c))))
    }

    fn open_transcript() -> Transcript {
        let mut transcript = Transcript::new();
        transcript.push_user("Say hello");
        transcript.open_assistant_message();
        transcript
    }

    fn assistant_text(transcript: &Transcript) -> &str {
        &transcript.last().expect("assistant message").content
    }

    #[tokio::test]
    async fn test_fragment_split_across_chunks() {
        let chunks = vec![
            b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel".to_vec(),
            b"lo\"}}]}\n".to_vec(),
            b"data: [DONE]\n".to_vec(),
        ];
        let mut transcript = open_transcript();
        let cancel = CancellationToken::new();

        let summary = decode_stream(ok_chunks(chunks), &mut transcript, &cancel)
            .await
            .unwrap();

        assert_eq!(summary.outcome, StreamOutcome::Completed);
        assert_eq!(summary.stats.fragments, 1);
        assert!(summary.stats.done_received);
        assert_eq!(summary.stats.dropped_frames, 0);
        assert_eq!(transcript.len(), 2);
        assert_eq!(assistant_text(&transcript), "Hello");
    }

    #[tokio::test]
    async fn test_fragments_concatenate_in_order_for_any_chunking() {
        let pieces = ["Rust ", "流式", " 🦀", "", "\"quoted\"", "\n", "end"];
        let mut body: String = pieces.iter().map(|p| data_frame(p)).collect();
        body.push_str("data: [DONE]\n");
        let bytes = body.into_bytes();

        for size in [1, 2, 3, 5, 7, 64, bytes.len()] {
            let chunks = bytes.chunks(size).map(<[u8]>::to_vec).collect();
            let mut transcript = open_transcript();
            let summary =
                decode_stream(ok_chunks(chunks), &mut transcript, &CancellationToken::new())
                    .await
                    .unwrap();

            assert_eq!(assistant_text(&transcript), pieces.concat(), "chunk size {}", size);
            assert_eq!(summary.stats.fragments, pieces.len());
            assert_eq!(summary.stats.bytes_received, bytes.len());
        }
    }

    #[tokio::test]
    async fn test_malformed_frame_is_dropped() {
        let body = format!(
            "{}data: {{\"choices\":[{{\"delta\":\n{}data: [DONE]\n",
            data_frame("a"),
            data_frame("b")
        );
        let mut transcript = open_transcript();

        let summary = decode_stream(
            ok_chunks(vec![body.into_bytes()]),
            &mut transcript,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.outcome, StreamOutcome::Completed);
        assert_eq!(summary.stats.dropped_frames, 1);
        assert_eq!(assistant_text(&transcript), "ab");
    }

    #[tokio::test]
    async fn test_frames_after_done_are_still_applied() {
        let body = format!("{}data: [DONE]\n{}", data_frame("a"), data_frame("b"));
        let mut transcript = open_transcript();

        let summary = decode_stream(
            ok_chunks(vec![body.into_bytes()]),
            &mut transcript,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.outcome, StreamOutcome::Completed);
        assert!(summary.stats.done_received);
        assert_eq!(summary.stats.fragments, 2);
        assert_eq!(assistant_text(&transcript), "ab");
    }

    #[tokio::test]
    async fn test_comments_blank_lines_and_crlf() {
        let body = ": keep-alive\r\n\r\nevent: message\r\ndata: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\r\n\r\ndata: [DONE]\r\n";
        let mut transcript = open_transcript();

        let summary = decode_stream(
            ok_chunks(vec![body.as_bytes().to_vec()]),
            &mut transcript,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(assistant_text(&transcript), "ok");
        assert!(summary.stats.done_received);
        assert_eq!(summary.stats.dropped_frames, 0);
    }

    #[tokio::test]
    async fn test_unterminated_tail_is_not_interpreted() {
        let body = format!(
            "{}data: {{\"choices\":[{{\"delta\":{{\"content\":\"x\"}}}}]}}",
            data_frame("kept")
        );
        let mut transcript = open_transcript();

        let summary = decode_stream(
            ok_chunks(vec![body.into_bytes()]),
            &mut transcript,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(assistant_text(&transcript), "kept");
        assert!(summary.stats.discarded_bytes > 0);
        assert!(!summary.stats.done_received);
    }

    #[tokio::test]
    async fn test_transport_error_keeps_applied_fragments() {
        let items: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from(data_frame("partial"))),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer")),
            Ok(Bytes::from(data_frame("never"))),
        ];
        let mut transcript = open_transcript();

        let result =
            decode_stream(stream::iter(items), &mut transcript, &CancellationToken::new()).await;

        assert!(matches!(result, Err(StreamError::Transport(_))));
        assert_eq!(assistant_text(&transcript), "partial");
    }

    #[tokio::test]
    async fn test_cancel_between_chunks() {
        let cancel = CancellationToken::new();
        let chunks = vec![
            Bytes::from_static(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel"),
            Bytes::from_static(b"lo\"}}]}\n"),
            Bytes::from_static(b"data: [DONE]\n"),
        ];

        // Transport that gets cancelled after delivering the first chunk
        let token = cancel.clone();
        let transport = stream::unfold(0usize, move |i| {
            let token = token.clone();
            let chunk = chunks.get(i).cloned();
            async move {
                if i == 1 {
                    token.cancel();
                }
                chunk.map(|c| (Ok::<_, io::Error>(c), i + 1))
            }
        });

        let mut transcript = open_transcript();
        let summary = decode_stream(transport, &mut transcript, &cancel)
            .await
            .unwrap();

        assert_eq!(summary.outcome, StreamOutcome::Cancelled);
        assert_eq!(summary.stats.fragments, 0);
        assert_eq!(assistant_text(&transcript), "");
    }

    #[tokio::test]
    async fn test_cancel_while_transport_is_waiting() {
        let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, io::Error>>(4);
        let transport = tokio_stream::wrappers::ReceiverStream::new(rx);
        let cancel = CancellationToken::new();
        let mut transcript = open_transcript();

        let driver = async {
            tx.send(Ok(Bytes::from(data_frame("first")))).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
            // Delivered after cancellation; must not be applied
            let _ = tx.send(Ok(Bytes::from(data_frame("late")))).await;
        };

        let (summary, _) = tokio::join!(decode_stream(transport, &mut transcript, &cancel), driver);
        let summary = summary.unwrap();

        assert_eq!(summary.outcome, StreamOutcome::Cancelled);
        assert_eq!(assistant_text(&transcript), "first");
    }

    #[test]
    fn test_process_chunk_with_cancelled_token_applies_nothing() {
        let mut processor = SseStreamProcessor::new();
        let mut transcript = open_transcript();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let finished =
            processor.process_chunk(data_frame("x").as_bytes(), &mut transcript, &cancel);

        assert!(!finished);
        assert_eq!(transcript.last(), Some(&Message::assistant("")));
    }
}
