//! Chat-completion streaming
//!
//! Bytes flow `client` -> `frame` -> `delta` -> transcript, driven by `sse`.

pub mod client;
pub mod delta;
pub mod frame;
pub mod sse;
