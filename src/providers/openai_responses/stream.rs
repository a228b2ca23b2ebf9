//! Responses API event decoding.

use serde_json::Value;

use crate::error::LlmError;
use crate::streaming::ChunkDecoder;
use crate::types::{ChatSegment, ChatTokenUsage, FinishReason};

/// Streaming state: the index of the function call being built and whether any call
/// was seen (a completed response with calls finishes as `ToolCalls`).
#[derive(Debug, Clone)]
pub struct ResponsesDecoder {
    provider_id: &'static str,
    function_index: u32,
    has_tools: bool,
}

impl ResponsesDecoder {
    pub fn new(provider_id: &'static str) -> Self {
        Self {
            provider_id,
            function_index: 0,
            has_tools: false,
        }
    }
}

impl ChunkDecoder for ResponsesDecoder {
    fn decode(&mut self, event: Value) -> Result<Vec<ChatSegment>, LlmError> {
        let Some(kind) = event.get("type").and_then(Value::as_str) else {
            return Ok(Vec::new());
        };
        let delta = || {
            event
                .get("delta")
                .and_then(Value::as_str)
                .filter(|d| !d.is_empty())
        };

        let out = match kind {
            "error" => {
                let payload = event.get("error").unwrap_or(&event).to_string();
                return Err(LlmError::upstream_stream(self.provider_id, payload));
            }
            "response.output_text.delta" => delta().map(ChatSegment::text).into_iter().collect(),
            "response.output_item.added" => {
                let item = &event["item"];
                if item["type"] == "function_call" {
                    self.has_tools = true;
                    vec![ChatSegment::tool_call(
                        self.function_index,
                        item.get("call_id").and_then(Value::as_str).map(str::to_string),
                        item.get("name").and_then(Value::as_str).map(str::to_string),
                        Some(String::new()),
                    )]
                } else {
                    Vec::new()
                }
            }
            "response.function_call_arguments.delta" => vec![ChatSegment::tool_call(
                self.function_index,
                None,
                None,
                Some(delta().unwrap_or_default().to_string()),
            )],
            "response.output_item.done" => {
                let item = &event["item"];
                match item["type"].as_str() {
                    Some("function_call") => {
                        self.function_index += 1;
                        Vec::new()
                    }
                    Some("reasoning") => item
                        .get("encrypted_content")
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .map(ChatSegment::signature)
                        .into_iter()
                        .collect(),
                    _ => Vec::new(),
                }
            }
            "response.reasoning_summary_text.delta" => {
                delta().map(ChatSegment::think).into_iter().collect()
            }
            "response.reasoning_summary_text.done" => vec![ChatSegment::think("\n\n")],
            "response.completed" | "response.incomplete" | "response.failed" => {
                let response = &event["response"];
                let mut out = Vec::new();
                if let Some(usage) = parse_usage(&response["usage"]) {
                    out.push(ChatSegment::Usage(usage));
                }
                if let Some(reason) = response["status"]
                    .as_str()
                    .and_then(|s| status_finish_reason(s, self.has_tools))
                {
                    out.push(ChatSegment::FinishReason(reason));
                }
                out
            }
            _ => Vec::new(),
        };
        Ok(out)
    }
}

fn status_finish_reason(status: &str, has_tools: bool) -> Option<FinishReason> {
    match status {
        "completed" if has_tools => Some(FinishReason::ToolCalls),
        "completed" => Some(FinishReason::Stop),
        "incomplete" => Some(FinishReason::Length),
        "failed" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

/// Decode a complete (unary) response object.
pub fn decode_response(provider_id: &str, response: &Value) -> Result<Vec<ChatSegment>, LlmError> {
    let status = response["status"].as_str().unwrap_or("completed");
    let usage = parse_usage(&response["usage"]);
    let mut out = Vec::new();

    if status == "failed" {
        let payload = response
            .get("error")
            .filter(|e| !e.is_null())
            .map_or_else(|| "Response failed".to_string(), Value::to_string);
        return Err(LlmError::upstream_stream(provider_id, payload));
    }

    let mut function_index = 0u32;
    for item in response["output"].as_array().into_iter().flatten() {
        match item["type"].as_str() {
            Some("reasoning") => {
                let summary: Vec<&str> = item["summary"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter(|p| p["type"] == "summary_text")
                    .filter_map(|p| p["text"].as_str())
                    .filter(|t| !t.is_empty())
                    .collect();
                if !summary.is_empty() {
                    out.push(ChatSegment::think(summary.join("\n\n")));
                }
                let encrypted = item["encrypted_content"].as_str();
                if let Some(encrypted) = encrypted.filter(|s| !s.is_empty()) {
                    out.push(ChatSegment::signature(encrypted));
                }
            }
            Some("function_call") => {
                out.push(ChatSegment::tool_call(
                    function_index,
                    item["call_id"].as_str().map(str::to_string),
                    item["name"].as_str().map(str::to_string),
                    Some(item["arguments"].as_str().unwrap_or_default().to_string()),
                ));
                function_index += 1;
            }
            Some("message") => {
                for part in item["content"].as_array().into_iter().flatten() {
                    match part["type"].as_str() {
                        Some("output_text") => {
                            if let Some(text) = part["text"].as_str().filter(|t| !t.is_empty()) {
                                out.push(ChatSegment::text(text));
                            }
                        }
                        Some("refusal") => out.push(ChatSegment::Error {
                            content: part["refusal"].as_str().unwrap_or("Refusal").to_string(),
                        }),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    if let Some(usage) = usage {
        out.push(ChatSegment::Usage(usage));
    }
    if let Some(reason) = status_finish_reason(status, function_index > 0) {
        out.push(ChatSegment::FinishReason(reason));
    }
    Ok(out)
}

pub fn parse_usage(usage: &Value) -> Option<ChatTokenUsage> {
    if !usage.is_object() {
        return None;
    }
    let count = |v: &Value| v.as_u64().map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX));
    Some(ChatTokenUsage {
        input_tokens: count(&usage["input_tokens"]),
        output_tokens: count(&usage["output_tokens"]),
        reasoning_tokens: count(&usage["output_tokens_details"]["reasoning_tokens"]),
        cache_tokens: count(&usage["input_tokens_details"]["cached_tokens"]),
        cache_creation_tokens: 0,
    })
}
