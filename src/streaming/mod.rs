//! Streaming
//!
//! Byte-level decoding (SSE, JSON arrays), the per-provider [`ChunkDecoder`] seam, and the
//! segment-stream wrappers that re-assemble reasoning, usage and tool calls.

pub mod factory;
pub mod json_array;
pub mod sse;
pub mod sse_json;
pub mod think_tag;
pub mod tool_calls;
pub mod types;
pub mod usage;

pub use factory::StreamFactory;
pub use json_array::{JsonArrayDecoder, stream_json_array_values};
pub use sse::{SseStream, SseStreamExt};
pub use sse_json::{SseJsonStreamConfig, stream_sse_json_values};
pub use think_tag::{ThinkTagParser, apply_think_tag_parser, apply_think_tag_parser_with};
pub use tool_calls::{ToolCallAggregator, aggregate_tool_calls};
pub use types::{ChunkDecoder, JsonValueStream, SegmentStream, SegmentStreamHandle};
pub use usage::{UsageAccumulator, with_usage_accounting};
