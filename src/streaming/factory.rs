//! Stream Factory
//!
//! Sends one upstream request, classifies failures, and turns the response body into a
//! [`SegmentStream`] through a provider [`ChunkDecoder`].

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use super::json_array::stream_json_array_values;
use super::sse_json::{SseJsonStreamConfig, stream_sse_json_values};
use super::types::{ChunkDecoder, JsonValueStream, SegmentStream};
use crate::error::{LlmError, classify_error_response, map_send_error};

pub struct StreamFactory;

impl StreamFactory {
    /// Send `request` and return the response if its status is a success.
    ///
    /// Send failures keep their timeout/connection shape; non-success statuses become
    /// [`LlmError::UpstreamProtocol`] with the body verbatim.
    pub async fn send(
        provider_id: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, LlmError> {
        let response = request.send().await.map_err(map_send_error)?;
        if !response.status().is_success() {
            return Err(classify_error_response(provider_id, response).await);
        }
        Ok(response)
    }

    /// Unary call: send, then decode the whole body as one JSON document.
    ///
    /// A body that is not JSON is fatal here, unlike single SSE frames.
    pub async fn send_json(
        provider_id: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<serde_json::Value, LlmError> {
        let response = Self::send(provider_id, request).await?;
        let text = response.text().await.map_err(map_body_error)?;
        serde_json::from_str(&text).map_err(|e| {
            LlmError::MalformedUpstreamPayload(format!(
                "{provider_id}: {e}: {}",
                text.chars().take(200).collect::<String>()
            ))
        })
    }

    /// Response body as a byte stream with body errors mapped.
    pub fn body_bytes(
        response: reqwest::Response,
    ) -> impl Stream<Item = Result<Bytes, LlmError>> + Send + 'static {
        response.bytes_stream().map(|chunk| chunk.map_err(map_body_error))
    }

    /// Lazily send `request` and decode its SSE body with `decoder`.
    ///
    /// Nothing happens until the returned stream is first polled.
    pub fn sse_segments<D: ChunkDecoder>(
        provider_id: impl Into<String>,
        request: reqwest::RequestBuilder,
        decoder: D,
    ) -> SegmentStream {
        let provider_id = provider_id.into();
        Box::pin(async_stream::stream! {
            tracing::debug!(provider = %provider_id, "sending streaming request");
            let response = match Self::send(&provider_id, request).await {
                Ok(r) => r,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            let values = stream_sse_json_values(
                Self::body_bytes(response),
                SseJsonStreamConfig::new(provider_id.clone()),
            );
            let mut segments = Self::decode_values(values, decoder);
            while let Some(item) = segments.next().await {
                yield item;
            }
        })
    }

    /// Lazily send `request` and decode a streamed top-level JSON array body.
    pub fn json_array_segments<D: ChunkDecoder>(
        provider_id: impl Into<String>,
        request: reqwest::RequestBuilder,
        decoder: D,
    ) -> SegmentStream {
        let provider_id = provider_id.into();
        Box::pin(async_stream::stream! {
            tracing::debug!(provider = %provider_id, "sending streaming request");
            let response = match Self::send(&provider_id, request).await {
                Ok(r) => r,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            let values = stream_json_array_values(Self::body_bytes(response), provider_id.clone());
            let mut segments = Self::decode_values(values, decoder);
            while let Some(item) = segments.next().await {
                yield item;
            }
        })
    }

    /// Run decoded JSON values through `decoder`, in order.
    ///
    /// The first error ends the stream; `finish` runs only on a clean end of body.
    pub fn decode_values<D: ChunkDecoder>(values: JsonValueStream, decoder: D) -> SegmentStream {
        let mut values = values;
        let mut decoder = decoder;
        Box::pin(async_stream::stream! {
            while let Some(item) = values.next().await {
                let value = match item {
                    Ok(v) => v,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                match decoder.decode(value) {
                    Ok(segments) => {
                        for segment in segments {
                            yield Ok(segment);
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
            match decoder.finish() {
                Ok(segments) => {
                    for segment in segments {
                        yield Ok(segment);
                    }
                }
                Err(e) => yield Err(e),
            }
        })
    }
}

/// Errors while reading an already-accepted body.
fn map_body_error(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::TimeoutError(format!("Response body timed out: {err}"))
    } else {
        LlmError::StreamError(format!("Stream error: {err}"))
    }
}
