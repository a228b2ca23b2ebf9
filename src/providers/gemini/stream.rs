//! `streamGenerateContent` chunk decoding.
//!
//! A streamed response is a JSON array of `GenerateContentResponse` objects; each
//! element goes through [`GeminiDecoder::decode`]. The unary response is a single
//! element of the same shape.

use std::time::Instant;

use serde_json::Value;

use crate::error::LlmError;
use crate::streaming::ChunkDecoder;
use crate::types::{ChatSegment, ChatTokenUsage, FinishReason};

#[derive(Debug)]
pub struct GeminiDecoder {
    provider_id: &'static str,
    tool_call_index: u32,
    /// Signature waiting for the next function call or first text part
    pending_signature: Option<String>,
    has_emitted_text: bool,
    code_execution: Option<(String, Instant)>,
}

impl GeminiDecoder {
    pub fn new(provider_id: &'static str) -> Self {
        Self {
            provider_id,
            tool_call_index: 0,
            pending_signature: None,
            has_emitted_text: false,
            code_execution: None,
        }
    }

    fn take_signature(&mut self, out: &mut Vec<ChatSegment>) {
        if let Some(signature) = self.pending_signature.take() {
            out.push(ChatSegment::signature(signature));
        }
    }

    fn next_index(&mut self) -> u32 {
        let index = self.tool_call_index;
        self.tool_call_index += 1;
        index
    }

    fn decode_part(&mut self, part: &Value, out: &mut Vec<ChatSegment>) {
        if let Some(signature) = part["thoughtSignature"].as_str().filter(|s| !s.is_empty()) {
            self.pending_signature = Some(signature.to_string());
        }

        if let Some(text) = part["text"].as_str().filter(|t| !t.is_empty()) {
            if !self.has_emitted_text {
                self.take_signature(out);
            }
            if part["thought"].as_bool() == Some(true) {
                out.push(ChatSegment::think(text));
            } else {
                self.has_emitted_text = true;
                out.push(ChatSegment::text(text));
            }
        }

        if let Some(data) = part["inlineData"]["data"].as_str().filter(|d| !d.is_empty()) {
            let mime = part["inlineData"]["mimeType"]
                .as_str()
                .unwrap_or(crate::utils::mime::OCTET_STREAM);
            out.push(ChatSegment::base64_image(data, mime));
        }

        if let Some(code) = part["executableCode"]["code"].as_str() {
            self.take_signature(out);
            let language = part["executableCode"]["language"]
                .as_str()
                .unwrap_or("code_execution");
            let id = format!("ce-{}", chrono::Utc::now().timestamp_millis());
            self.code_execution = Some((id.clone(), Instant::now()));
            let index = self.next_index();
            out.push(ChatSegment::tool_call(
                index,
                Some(id),
                Some(language.to_string()),
                Some(serde_json::json!({ "code": code }).to_string()),
            ));
        }

        let result = &part["codeExecutionResult"];
        if result.is_object()
            && let Some((id, started)) = self.code_execution.take()
        {
            out.push(ChatSegment::ToolCallResponse {
                tool_call_id: id,
                response: result["output"].as_str().unwrap_or_default().to_string(),
                duration_ms: started.elapsed().as_millis() as u64,
                is_success: result["outcome"]
                    .as_str()
                    .is_some_and(|o| o.eq_ignore_ascii_case("OUTCOME_OK")),
            });
        }

        let call = &part["functionCall"];
        if call.is_object() {
            self.take_signature(out);
            let index = self.next_index();
            let id = call["id"]
                .as_str()
                .filter(|s| !s.is_empty())
                .map_or_else(|| format!("call_{index}"), str::to_string);
            let arguments = match &call["args"] {
                Value::Null => "{}".to_string(),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out.push(ChatSegment::tool_call(
                index,
                Some(id),
                call["name"].as_str().map(str::to_string),
                Some(arguments),
            ));
        }
    }
}

impl ChunkDecoder for GeminiDecoder {
    fn decode(&mut self, chunk: Value) -> Result<Vec<ChatSegment>, LlmError> {
        if !chunk.is_object() {
            return Ok(Vec::new());
        }
        if let Some(error) = chunk.get("error").filter(|e| !e.is_null()) {
            let message = error["message"]
                .as_str()
                .map_or_else(|| error.to_string(), str::to_string);
            return Err(LlmError::upstream_stream(self.provider_id, message));
        }

        let mut out = Vec::new();
        let mut finish = None;
        if let Some(candidate) = chunk["candidates"].as_array().and_then(|c| c.first()) {
            for part in candidate["content"]["parts"].as_array().into_iter().flatten() {
                self.decode_part(part, &mut out);
            }
            finish = candidate["finishReason"]
                .as_str()
                .and_then(|r| FinishReason::from_gemini(&r.to_ascii_uppercase()));
        } else if chunk["promptFeedback"]["blockReason"].is_string() {
            finish = Some(FinishReason::ContentFilter);
        }

        if let Some(usage) = parse_usage(&chunk["usageMetadata"]) {
            out.push(ChatSegment::Usage(usage));
        }
        if let Some(reason) = finish {
            out.push(ChatSegment::FinishReason(reason));
        }
        Ok(out)
    }
}

/// Output tokens are `total - prompt`, which includes thoughts; `candidatesTokenCount`
/// is the fallback when that difference is zero.
pub fn parse_usage(usage: &Value) -> Option<ChatTokenUsage> {
    if !usage.is_object() {
        return None;
    }
    let count = |v: &Value| v.as_u64().map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX));
    let prompt = count(&usage["promptTokenCount"]);
    let total = count(&usage["totalTokenCount"]);
    let mut output = total.saturating_sub(prompt);
    if output == 0 {
        output = count(&usage["candidatesTokenCount"]);
    }
    Some(ChatTokenUsage {
        input_tokens: prompt,
        output_tokens: output,
        reasoning_tokens: count(&usage["thoughtsTokenCount"]),
        cache_tokens: count(&usage["cachedContentTokenCount"]),
        cache_creation_tokens: 0,
    })
}
