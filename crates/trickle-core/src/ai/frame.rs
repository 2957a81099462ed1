//! Frame splitting for chunked SSE bodies
//!
//! Turns arbitrarily aligned byte chunks into complete `\n`-terminated lines.
//! Multi-byte characters split across chunks are carried until complete.

use tracing::debug;

/// Replacement for byte sequences that are not valid UTF-8
const REPLACEMENT: char = '\u{FFFD}';

/// Accumulated decoder state for one stream
///
/// Owned exclusively by a single stream; never share one between turns.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DecodeBuffer {
    /// Trailing bytes of an incomplete UTF-8 sequence (at most 3)
    pending: Vec<u8>,
    /// Text after the last newline seen so far
    carry: String,
}

impl DecodeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Undecoded bytes held back from the previous chunk
    pub fn pending_bytes(&self) -> &[u8] {
        &self.pending
    }

    /// Text of the frame still waiting for its terminator
    pub fn carry(&self) -> &str {
        &self.carry
    }

    /// Feed one chunk and return the frames it completed, in order
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        // The carry holds no newline before this push; only new text is searched
        let searched_from = self.carry.len();
        self.decode_into_carry(chunk);

        let Some(last_newline) = self.carry[searched_from..]
            .rfind('\n')
            .map(|i| searched_from + i)
        else {
            return Vec::new();
        };

        let rest = self.carry.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.carry, rest);

        // `complete` ends with '\n', so the final split piece is always empty
        let mut frames: Vec<String> = complete.split('\n').map(str::to_string).collect();
        frames.pop();
        frames
    }

    /// End of stream: drop the unterminated remainder
    ///
    /// Returns the number of bytes discarded (carry text plus pending bytes).
    pub fn finish(self) -> usize {
        let discarded = self.carry.len() + self.pending.len();
        if discarded > 0 {
            debug!(
                "Discarding {} bytes of unterminated frame at end of stream",
                discarded
            );
        }
        discarded
    }

    /// Incremental UTF-8 decode of `chunk` (prefixed by any pending bytes)
    fn decode_into_carry(&mut self, chunk: &[u8]) {
        let joined;
        let mut input: &[u8] = if self.pending.is_empty() {
            chunk
        } else {
            let mut bytes = std::mem::take(&mut self.pending);
            bytes.extend_from_slice(chunk);
            joined = bytes;
            &joined
        };

        loop {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    self.carry.push_str(text);
                    return;
                }
                Err(e) => {
                    let (valid, after) = input.split_at(e.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        self.carry.push_str(text);
                    }

                    match e.error_len() {
                        Some(bad) => {
                            self.carry.push(REPLACEMENT);
                            input = &after[bad..];
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more bytes
                            self.pending = after.to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Pure step function: `(DecodeBuffer, chunk) -> (DecodeBuffer', frames)`
pub fn split_frames(mut buffer: DecodeBuffer, chunk: &[u8]) -> (DecodeBuffer, Vec<String>) {
    let frames = buffer.push(chunk);
    (buffer, frames)
}
