//! Test fixtures utilities: load SSE/JSON streaming bodies and drive decoders

#![allow(dead_code)]

use bytes::Bytes;
use chatwire::error::LlmError;
use chatwire::streaming::{
    ChunkDecoder, SseJsonStreamConfig, StreamFactory, stream_json_array_values,
    stream_sse_json_values,
};
use chatwire::types::ChatSegment;
use futures_util::StreamExt;

/// Path of a fixture relative to the crate root.
pub fn fixture_path(name: &str) -> String {
    format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"))
}

/// Raw fixture body with line endings normalized.
pub fn load_fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name))
        .unwrap_or_else(|e| panic!("load fixture {name}: {e}"))
        .replace("\r\n", "\n")
}

/// Split a fixture into SSE events (each terminated by a blank line), one chunk each
pub fn load_sse_fixture_as_bytes(name: &str) -> Vec<Result<Bytes, LlmError>> {
    load_fixture(name)
        .split("\n\n")
        .map(|chunk| chunk.trim_end_matches('\n'))
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| Ok(Bytes::from(format!("{chunk}\n\n"))))
        .collect()
}

/// Split a fixture into fixed-size byte chunks that ignore event and UTF-8 boundaries
pub fn load_fixture_in_chunks(name: &str, size: usize) -> Vec<Result<Bytes, LlmError>> {
    load_fixture(name)
        .into_bytes()
        .chunks(size)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect()
}

/// Decode SSE byte chunks with `decoder`, keeping errors in place
pub async fn decode_sse<D: ChunkDecoder>(
    chunks: Vec<Result<Bytes, LlmError>>,
    decoder: D,
) -> Vec<Result<ChatSegment, LlmError>> {
    let values = stream_sse_json_values(
        futures_util::stream::iter(chunks),
        SseJsonStreamConfig::new("fixture"),
    );
    StreamFactory::decode_values(values, decoder).collect().await
}

/// Decode a streamed JSON-array body with `decoder`
pub async fn decode_json_array<D: ChunkDecoder>(
    chunks: Vec<Result<Bytes, LlmError>>,
    decoder: D,
) -> Vec<Result<ChatSegment, LlmError>> {
    let values = stream_json_array_values(futures_util::stream::iter(chunks), "fixture");
    StreamFactory::decode_values(values, decoder).collect().await
}

/// Unwrap every item, panicking on the first error
pub fn ok_segments(items: Vec<Result<ChatSegment, LlmError>>) -> Vec<ChatSegment> {
    items
        .into_iter()
        .map(|item| item.expect("segment"))
        .collect()
}
