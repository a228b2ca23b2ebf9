//! SSE framing on top of `eventsource-stream`.

use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use std::pin::Pin;

use crate::error::LlmError;

pub type SseStream = Pin<Box<dyn Stream<Item = Result<Event, LlmError>> + Send>>;

/// Split a byte stream into SSE events.
///
/// Transport errors are passed through unchanged so timeouts keep their shape; framing
/// errors become [`LlmError::StreamError`].
pub trait SseStreamExt {
    fn into_sse_stream(self) -> SseStream;
}

impl<S, B> SseStreamExt for S
where
    S: Stream<Item = Result<B, LlmError>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    fn into_sse_stream(self) -> SseStream {
        Box::pin(self.eventsource().map(|item| {
            item.map_err(|e| match e {
                EventStreamError::Transport(inner) => inner,
                other => LlmError::StreamError(format!("SSE parsing error: {other}")),
            })
        }))
    }
}
