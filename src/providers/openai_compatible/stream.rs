//! Chat-completions response decoding, streaming and unary.

use serde_json::Value;

use super::strategy::ProviderStrategy;
use crate::error::LlmError;
use crate::streaming::ChunkDecoder;
use crate::types::{ChatSegment, ChatTokenUsage, FinishReason};

/// Decodes `chat.completion.chunk` payloads.
#[derive(Debug, Clone)]
pub struct OpenAiChunkDecoder {
    strategy: ProviderStrategy,
}

impl OpenAiChunkDecoder {
    pub fn new(strategy: ProviderStrategy) -> Self {
        Self { strategy }
    }
}

impl ChunkDecoder for OpenAiChunkDecoder {
    fn decode(&mut self, chunk: Value) -> Result<Vec<ChatSegment>, LlmError> {
        if let Some(error) = chunk.get("error").filter(|e| !e.is_null()) {
            return Err(LlmError::upstream_stream(
                self.strategy.provider_id,
                error.to_string(),
            ));
        }

        let choice = chunk
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first());
        let usage = chunk.get("usage").and_then(parse_usage);

        let Some(choice) = choice else {
            return Ok(usage.map(ChatSegment::Usage).into_iter().collect());
        };

        let mut out = Vec::new();
        if let Some(delta) = choice.get("delta") {
            if let Some(text) = delta
                .get("content")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
            {
                out.push(ChatSegment::text(text));
            }
            if let Some(refusal) = refusal(delta) {
                out.push(refusal);
            }
            // Structured reasoning fragments are not kept as signatures while streaming;
            // replay rebuilds them from the merged thinking text.
            if let Some((think, _)) = thinking_payload(delta, self.strategy.reasoning_field) {
                out.push(ChatSegment::think(think));
            }
            if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
                for call in calls {
                    out.push(tool_call_fragment(call, None));
                }
            }
        }

        if let Some(usage) = usage {
            out.push(ChatSegment::Usage(usage));
        }
        if let Some(reason) = choice
            .get("finish_reason")
            .and_then(Value::as_str)
            .and_then(|r| self.strategy.finish_reason(r))
        {
            out.push(ChatSegment::FinishReason(reason));
        }
        Ok(out)
    }
}

/// Decode a unary `chat.completion` envelope.
///
/// Emits content, reasoning (with its structured signature when present), tool calls,
/// usage and a finish reason, which defaults to `Stop`.
pub fn decode_completion(
    strategy: &ProviderStrategy,
    root: &Value,
) -> Result<Vec<ChatSegment>, LlmError> {
    if let Some(error) = root.get("error").filter(|e| !e.is_null()) {
        return Err(LlmError::upstream_stream(strategy.provider_id, error.to_string()));
    }

    let mut out = Vec::new();
    let mut finish = None;
    let choice = root
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|c| c.first());

    if let Some(choice) = choice {
        if let Some(message) = choice.get("message") {
            if let Some(text) = message
                .get("content")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
            {
                out.push(ChatSegment::text(text));
            }
            if let Some(refusal) = refusal(message) {
                out.push(refusal);
            }
            if let Some((think, signature)) = thinking_payload(message, strategy.reasoning_field) {
                out.push(ChatSegment::think(think));
                if let Some(signature) = signature {
                    out.push(ChatSegment::signature(signature));
                }
            }
            if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
                for (index, call) in calls.iter().enumerate() {
                    let index = u32::try_from(index).unwrap_or(u32::MAX);
                    out.push(tool_call_fragment(call, Some(index)));
                }
            }
        }
        finish = choice
            .get("finish_reason")
            .and_then(Value::as_str)
            .and_then(|r| strategy.finish_reason(r));
    }

    if let Some(usage) = root.get("usage").and_then(parse_usage) {
        out.push(ChatSegment::Usage(usage));
    }
    out.push(ChatSegment::FinishReason(finish.unwrap_or(FinishReason::Stop)));
    Ok(out)
}

/// A model refusal is content, not a transport fault.
fn refusal(obj: &Value) -> Option<ChatSegment> {
    obj.get("refusal")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(|content| ChatSegment::Error {
            content: content.to_string(),
        })
}

/// `index` overrides the wire index (unary responses number calls by position).
fn tool_call_fragment(call: &Value, index: Option<u32>) -> ChatSegment {
    let index = index.unwrap_or_else(|| {
        call.get("index")
            .and_then(Value::as_u64)
            .map_or(0, |i| u32::try_from(i).unwrap_or(u32::MAX))
    });
    let function = call.get("function");
    ChatSegment::tool_call(
        index,
        call.get("id").and_then(Value::as_str).map(str::to_string),
        function
            .and_then(|f| f.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string),
        Some(
            function
                .and_then(|f| f.get("arguments"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
    )
}

/// Reasoning text under `field`, plus the raw payload when it is structured.
fn thinking_payload(obj: &Value, field: &str) -> Option<(String, Option<String>)> {
    let raw = obj.get(field)?;
    let text = thinking_text(raw).filter(|t| !t.is_empty())?;
    let signature = (raw.is_array() || raw.is_object()).then(|| raw.to_string());
    Some((text, signature))
}

fn thinking_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("text").and_then(Value::as_str).map(str::to_string),
        Value::Array(items) => {
            let joined: String = items.iter().filter_map(thinking_text).collect();
            (!joined.is_empty()).then_some(joined)
        }
        _ => None,
    }
}

/// OpenAI usage object. Cached tokens come from `prompt_tokens_details`, or from a
/// top-level `cached_tokens` as some providers report it.
pub fn parse_usage(usage: &Value) -> Option<ChatTokenUsage> {
    if !usage.is_object() {
        return None;
    }
    let count = |v: Option<&Value>| {
        v.and_then(Value::as_u64)
            .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX))
    };
    let cached = usage
        .get("prompt_tokens_details")
        .and_then(|d| d.get("cached_tokens"))
        .or_else(|| usage.get("cached_tokens"));
    Some(ChatTokenUsage {
        input_tokens: count(usage.get("prompt_tokens")),
        output_tokens: count(usage.get("completion_tokens")),
        reasoning_tokens: count(
            usage
                .get("completion_tokens_details")
                .and_then(|d| d.get("reasoning_tokens")),
        ),
        cache_tokens: count(cached),
        cache_creation_tokens: 0,
    })
}
