//! Anthropic Messages event decoding.

use std::time::Instant;

use serde_json::Value;

use crate::error::LlmError;
use crate::streaming::ChunkDecoder;
use crate::types::{ChatSegment, ChatTokenUsage, FinishReason};

/// Per-turn decoding state.
#[derive(Debug)]
pub struct AnthropicStreamState {
    provider_id: &'static str,
    /// Index of the current tool-use block; -1 before the first one
    tool_call_index: i64,
    /// Running server-side code execution: tool-use id and start time
    code_execution: Option<(String, Instant)>,
    /// Signatures after visible text belong to no replayable thinking block
    has_emitted_text: bool,
    start_usage: ChatTokenUsage,
}

impl AnthropicStreamState {
    pub fn new(provider_id: &'static str) -> Self {
        Self {
            provider_id,
            tool_call_index: -1,
            code_execution: None,
            has_emitted_text: false,
            start_usage: ChatTokenUsage::default(),
        }
    }

    fn next_tool_index(&mut self) -> u32 {
        self.tool_call_index += 1;
        self.tool_call_index as u32
    }

    fn current_tool_index(&self) -> u32 {
        self.tool_call_index.max(0) as u32
    }

    fn elapsed_ms(&mut self, tool_use_id: &str) -> u64 {
        match self.code_execution.take() {
            Some((id, started)) if id == tool_use_id => started.elapsed().as_millis() as u64,
            other => {
                self.code_execution = other;
                0
            }
        }
    }

    fn block_start(&mut self, block: &Value) -> Vec<ChatSegment> {
        match block["type"].as_str() {
            Some(kind @ ("tool_use" | "server_tool_use")) => {
                let index = self.next_tool_index();
                let id = block["id"].as_str().unwrap_or_default().to_string();
                let name = block["name"].as_str().unwrap_or_default().to_string();
                if kind == "server_tool_use" && name == "code_execution" {
                    self.code_execution = Some((id.clone(), Instant::now()));
                }
                vec![ChatSegment::tool_call(
                    index,
                    Some(id),
                    Some(name),
                    Some(String::new()),
                )]
            }
            Some("web_search_tool_result") => vec![web_search_result(block)],
            Some("code_execution_tool_result" | "bash_code_execution_tool_result") => {
                let tool_use_id = block["tool_use_id"].as_str().unwrap_or_default();
                let duration = self.elapsed_ms(tool_use_id);
                vec![code_execution_result(block, duration)]
            }
            Some("redacted_thinking") => block["data"]
                .as_str()
                .map(ChatSegment::signature)
                .into_iter()
                .collect(),
            _ => Vec::new(),
        }
    }

    fn block_delta(&mut self, delta: &Value) -> Vec<ChatSegment> {
        let non_empty = |field: &str| delta[field].as_str().filter(|s| !s.is_empty());
        match delta["type"].as_str() {
            Some("thinking_delta") => {
                non_empty("thinking").map(ChatSegment::think).into_iter().collect()
            }
            Some("text_delta") => match non_empty("text") {
                Some(text) => {
                    self.has_emitted_text = true;
                    vec![ChatSegment::text(text)]
                }
                None => Vec::new(),
            },
            Some("input_json_delta") => vec![ChatSegment::tool_call(
                self.current_tool_index(),
                None,
                None,
                Some(delta["partial_json"].as_str().unwrap_or_default().to_string()),
            )],
            Some("signature_delta") if !self.has_emitted_text => non_empty("signature")
                .map(ChatSegment::signature)
                .into_iter()
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl ChunkDecoder for AnthropicStreamState {
    fn decode(&mut self, event: Value) -> Result<Vec<ChatSegment>, LlmError> {
        let out = match event["type"].as_str() {
            Some("message_start") => {
                self.start_usage = parse_usage(&event["message"]["usage"]);
                vec![ChatSegment::Usage(self.start_usage)]
            }
            Some("content_block_start") => self.block_start(&event["content_block"]),
            Some("content_block_delta") => self.block_delta(&event["delta"]),
            Some("message_delta") => {
                let mut out = Vec::new();
                if let Some(reason) = event["delta"]["stop_reason"]
                    .as_str()
                    .and_then(FinishReason::from_anthropic)
                {
                    out.push(ChatSegment::FinishReason(reason));
                }
                let delta_usage = &event["usage"];
                if delta_usage.is_object() {
                    out.push(ChatSegment::Usage(ChatTokenUsage {
                        output_tokens: count(&delta_usage["output_tokens"]),
                        ..self.start_usage
                    }));
                }
                out
            }
            Some("error") => {
                return Err(LlmError::upstream_stream(self.provider_id, event.to_string()));
            }
            _ => Vec::new(),
        };
        Ok(out)
    }
}

/// Decode a complete (unary) message object.
pub fn decode_message(
    provider_id: &'static str,
    message: &Value,
) -> Result<Vec<ChatSegment>, LlmError> {
    if message["type"] == "error" {
        return Err(LlmError::upstream_stream(provider_id, message.to_string()));
    }

    let mut state = AnthropicStreamState::new(provider_id);
    let mut out = Vec::new();
    for block in message["content"].as_array().into_iter().flatten() {
        match block["type"].as_str() {
            Some("text") => {
                if let Some(text) = block["text"].as_str().filter(|t| !t.is_empty()) {
                    state.has_emitted_text = true;
                    out.push(ChatSegment::text(text));
                }
            }
            Some("thinking") => {
                if let Some(thinking) = block["thinking"].as_str().filter(|t| !t.is_empty()) {
                    out.push(ChatSegment::think(thinking));
                }
                if let Some(signature) = block["signature"].as_str().filter(|s| !s.is_empty()) {
                    out.push(ChatSegment::signature(signature));
                }
            }
            Some("tool_use" | "server_tool_use") => {
                let mut started = state.block_start(block);
                if let Some(ChatSegment::ToolCall { arguments, .. }) = started.first_mut() {
                    *arguments = Some(block["input"].to_string());
                }
                out.extend(started);
            }
            _ => out.extend(state.block_start(block)),
        }
    }

    let usage = parse_usage(&message["usage"]);
    out.push(ChatSegment::Usage(usage));
    if let Some(reason) = message["stop_reason"].as_str().and_then(FinishReason::from_anthropic) {
        out.push(ChatSegment::FinishReason(reason));
    }
    Ok(out)
}

fn web_search_result(block: &Value) -> ChatSegment {
    let mut content = block["content"].clone();
    if let Some(items) = content.as_array_mut() {
        for item in items {
            if let Some(map) = item.as_object_mut() {
                map.remove("encrypted_content");
            }
        }
    }
    ChatSegment::ToolCallResponse {
        tool_call_id: block["tool_use_id"].as_str().unwrap_or_default().to_string(),
        is_success: content.is_array(),
        response: content.to_string(),
        duration_ms: 0,
    }
}

fn code_execution_result(block: &Value, duration_ms: u64) -> ChatSegment {
    let content = &block["content"];
    ChatSegment::ToolCallResponse {
        tool_call_id: block["tool_use_id"].as_str().unwrap_or_default().to_string(),
        response: content.to_string(),
        duration_ms,
        is_success: content["return_code"].as_i64() == Some(0),
    }
}

fn count(value: &Value) -> u32 {
    value.as_u64().map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX))
}

pub fn parse_usage(usage: &Value) -> ChatTokenUsage {
    ChatTokenUsage {
        input_tokens: count(&usage["input_tokens"]),
        output_tokens: count(&usage["output_tokens"]),
        reasoning_tokens: 0,
        cache_tokens: count(&usage["cache_read_input_tokens"]),
        cache_creation_tokens: count(&usage["cache_creation_input_tokens"]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(events: Vec<Value>) -> Result<Vec<ChatSegment>, LlmError> {
        let mut state = AnthropicStreamState::new("anthropic");
        let mut out = Vec::new();
        for event in events {
            out.extend(state.decode(event)?);
        }
        Ok(out)
    }

    #[test]
    fn thinking_then_tool_use_with_usage() {
        let out = run(vec![
            json!({"type": "message_start", "message": {"usage": {
                "input_tokens": 12, "output_tokens": 1, "cache_read_input_tokens": 5
            }}}),
            json!({"type": "content_block_start", "index": 0,
                "content_block": {"type": "thinking", "thinking": ""}}),
            json!({"type": "content_block_delta", "index": 0,
                "delta": {"type": "thinking_delta", "thinking": "hmm"}}),
            json!({"type": "content_block_delta", "index": 0,
                "delta": {"type": "signature_delta", "signature": "sig"}}),
            json!({"type": "content_block_stop", "index": 0}),
            json!({"type": "content_block_start", "index": 1, "content_block": {
                "type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {}
            }}),
            json!({"type": "content_block_delta", "index": 1,
                "delta": {"type": "input_json_delta", "partial_json": "{\"city\":"}}),
            json!({"type": "content_block_delta", "index": 1,
                "delta": {"type": "input_json_delta", "partial_json": "\"Paris\"}"}}),
            json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"},
                "usage": {"output_tokens": 40}}),
            json!({"type": "message_stop"}),
        ])
        .expect("decode");

        assert!(matches!(
            out[0],
            ChatSegment::Usage(u) if u.input_tokens == 12 && u.cache_tokens == 5
        ));
        assert_eq!(out[1], ChatSegment::think("hmm"));
        assert_eq!(out[2], ChatSegment::signature("sig"));
        let calls = crate::streaming::aggregate_tool_calls(out.clone()).expect("calls");
        assert_eq!(calls[0].id, "toolu_1");
        assert_eq!(calls[0].arguments, "{\"city\":\"Paris\"}");
        let n = out.len();
        assert_eq!(out[n - 2], ChatSegment::FinishReason(FinishReason::ToolCalls));
        assert!(matches!(
            out[n - 1],
            ChatSegment::Usage(u) if u.input_tokens == 12 && u.output_tokens == 40
        ));
    }

    #[test]
    fn signature_after_text_is_dropped() {
        let out = run(vec![
            json!({"type": "content_block_delta", "delta": {"type": "text_delta", "text": "hi"}}),
            json!({"type": "content_block_delta",
                "delta": {"type": "signature_delta", "signature": "late"}}),
        ])
        .expect("decode");
        assert_eq!(out, vec![ChatSegment::text("hi")]);
    }

    #[test]
    fn web_search_results_lose_encrypted_content() {
        let out = run(vec![json!({
            "type": "content_block_start",
            "content_block": {
                "type": "web_search_tool_result",
                "tool_use_id": "srv_1",
                "content": [
                    {"type": "web_search_result", "url": "https://a", "encrypted_content": "xxx"}
                ]
            }
        })])
        .expect("decode");
        let ChatSegment::ToolCallResponse { tool_call_id, response, is_success, .. } = &out[0]
        else {
            panic!("expected a tool response, got {out:?}");
        };
        assert_eq!(tool_call_id, "srv_1");
        assert!(is_success);
        assert!(!response.contains("encrypted_content"));
    }

    #[test]
    fn code_execution_success_follows_return_code() {
        let out = run(vec![
            json!({"type": "content_block_start", "content_block": {
                "type": "server_tool_use", "id": "ce_1", "name": "code_execution"
            }}),
            json!({"type": "content_block_start", "content_block": {
                "type": "code_execution_tool_result",
                "tool_use_id": "ce_1",
                "content": {
                    "type": "code_execution_result",
                    "stdout": "",
                    "stderr": "boom",
                    "return_code": 1
                }
            }}),
        ])
        .expect("decode");
        assert!(matches!(&out[1], ChatSegment::ToolCallResponse { is_success: false, .. }));
    }

    #[test]
    fn redacted_thinking_is_a_signature() {
        let out = run(vec![json!({
            "type": "content_block_start",
            "content_block": {"type": "redacted_thinking", "data": "opaque"}
        })])
        .expect("decode");
        assert_eq!(out, vec![ChatSegment::signature("opaque")]);
    }

    #[test]
    fn error_event_is_fatal() {
        let err = run(vec![json!({
            "type": "error",
            "error": {"type": "overloaded_error", "message": "Overloaded"}
        })])
        .expect_err("error");
        assert!(matches!(
            err,
            LlmError::UpstreamStream { ref payload, .. } if payload.contains("overloaded_error")
        ));
    }

    #[test]
    fn unary_message_blocks() {
        let out = decode_message(
            "anthropic",
            &json!({
                "type": "message",
                "content": [
                    {"type": "thinking", "thinking": "t", "signature": "s"},
                    {"type": "text", "text": "answer"},
                    {"type": "tool_use", "id": "a", "name": "f", "input": {"k": 1}}
                ],
                "stop_reason": "tool_use",
                "usage": {"input_tokens": 3, "output_tokens": 4}
            }),
        )
        .expect("decode");
        assert_eq!(out[0], ChatSegment::think("t"));
        assert_eq!(out[1], ChatSegment::signature("s"));
        assert_eq!(out[2], ChatSegment::text("answer"));
        assert_eq!(
            out[3],
            ChatSegment::tool_call(0, Some("a".into()), Some("f".into()), Some("{\"k\":1}".into()))
        );
        assert_eq!(out.last(), Some(&ChatSegment::FinishReason(FinishReason::ToolCalls)));
    }
}
