//! Core streaming types.

use futures::Stream;
use std::pin::Pin;

use crate::error::LlmError;
use crate::types::ChatSegment;
use crate::utils::cancel::CancelHandle;

/// Segment stream: the uniform output of every adapter.
///
/// Pull-based: nothing is read from the upstream body until the consumer polls.
pub type SegmentStream = Pin<Box<dyn Stream<Item = Result<ChatSegment, LlmError>> + Send>>;

/// JSON payloads decoded from an upstream body (SSE `data:` frames or array elements).
pub type JsonValueStream = Pin<Box<dyn Stream<Item = Result<serde_json::Value, LlmError>> + Send>>;

/// Segment stream paired with the handle that cancels it.
pub struct SegmentStreamHandle {
    pub stream: SegmentStream,
    pub cancel: CancelHandle,
}

/// Provider-specific decoding state for one response.
///
/// Implementations are plain state structs: one JSON chunk in, zero or more segments
/// out. They are owned by a single stream and never shared across turns.
pub trait ChunkDecoder: Send + 'static {
    /// Decode one upstream JSON chunk.
    fn decode(&mut self, chunk: serde_json::Value) -> Result<Vec<ChatSegment>, LlmError>;

    /// Segments to emit once the upstream body ends.
    fn finish(&mut self) -> Result<Vec<ChatSegment>, LlmError> {
        Ok(Vec::new())
    }
}
