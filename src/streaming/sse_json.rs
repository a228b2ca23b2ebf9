//! SSE JSON streaming helpers
//!
//! For providers that emit one JSON object per SSE `data:` payload.

use futures_util::Stream;
use futures_util::StreamExt;

use super::sse::SseStreamExt;
use super::types::JsonValueStream;
use crate::error::LlmError;

#[derive(Debug, Clone)]
pub struct SseJsonStreamConfig {
    /// Provider label used in logs and errors
    pub label: String,
    /// SSE `data` payloads that mark the end of the stream and are ignored
    pub done_markers: Vec<String>,
}

impl SseJsonStreamConfig {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            done_markers: vec!["[DONE]".to_string()],
        }
    }
}

/// Convert a byte stream into JSON values by parsing SSE `data:` payloads.
///
/// - Empty payloads (keep-alives) and done markers are ignored.
/// - A payload that is not valid JSON is logged and skipped; the stream continues.
/// - Transport and framing errors end the stream.
///
/// When the SSE `event:` name is set and the payload has no `type` field, the name is
/// copied into `type` so decoders can dispatch on one field.
pub fn stream_sse_json_values<S, B>(byte_stream: S, cfg: SseJsonStreamConfig) -> JsonValueStream
where
    S: Stream<Item = Result<B, LlmError>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let done_markers = cfg.done_markers;
    let label = cfg.label;

    let out = async_stream::stream! {
        let mut sse_stream = byte_stream.into_sse_stream();

        while let Some(item) = sse_stream.next().await {
            let event = match item {
                Ok(ev) => ev,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let data = event.data.trim();
            if data.is_empty() || done_markers.iter().any(|m| m == data) {
                continue;
            }

            let mut payload: serde_json::Value = match serde_json::from_str(data) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(
                        provider = %label,
                        error = %e,
                        frame = %data.chars().take(200).collect::<String>(),
                        "skipping malformed SSE frame"
                    );
                    continue;
                }
            };

            if let Some(obj) = payload.as_object_mut()
                && !obj.contains_key("type")
                && !event.event.is_empty()
                && event.event != "message"
            {
                obj.insert("type".to_string(), serde_json::Value::String(event.event.clone()));
            }

            yield Ok(payload);
        }
    };

    Box::pin(out)
}
