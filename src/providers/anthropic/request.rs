//! Anthropic Messages request body.
//!
//! Neutral conversations differ from Anthropic's in two places: tool results travel as
//! separate tool-role turns (Anthropic wants them inside a user turn), and server-side
//! tool results may sit inside assistant turns. Both are rewritten before the blocks
//! are built.

use serde_json::{Map, Value, json};

use crate::error::LlmError;
use crate::providers::float_value;
use crate::types::{
    ChatRequest, ChatTool, NeutralContent, NeutralMessage, NeutralRole, NeutralSystemMessage,
};

/// Used when neither the config nor the model sets an output limit.
pub const DEFAULT_MAX_TOKENS: u32 = 32000;

pub const WEB_SEARCH_TOOL: &str = "web_search_20250305";
pub const CODE_EXECUTION_TOOL: &str = "code_execution_20250825";

/// Whether thinking blocks may be replayed, and whether thinking may be requested.
///
/// Anthropic rejects a tool-use history whose thinking blocks lost their signatures, so
/// with tool calls present every Think must be signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkingGate {
    pub allow_thinking_blocks: bool,
    pub allow_thinking: bool,
}

impl ThinkingGate {
    pub fn for_messages(messages: &[NeutralMessage]) -> Self {
        let mut thinks = messages
            .iter()
            .flat_map(|m| m.contents.iter())
            .filter_map(|c| match c {
                NeutralContent::Think { signature, .. } => Some(signature),
                _ => None,
            })
            .peekable();
        let any_think = thinks.peek().is_some();
        let all_signed = thinks.all(|s| s.as_deref().is_some_and(|s| !s.is_empty()));
        let allow_thinking_blocks = any_think && all_signed;
        let has_tool_call = messages.iter().any(NeutralMessage::has_tool_call);
        Self {
            allow_thinking_blocks,
            allow_thinking: !has_tool_call || allow_thinking_blocks,
        }
    }
}

pub fn build_body(request: &ChatRequest, stream: bool) -> Result<Value, LlmError> {
    let config = &request.chat_config;
    let model = request.model();
    let messages = switch_server_tool_responses_as_user(merge_tool_messages(&request.messages));
    let gate = ThinkingGate::for_messages(&messages);

    let mut body = Map::new();
    body.insert("model".into(), Value::String(model.deployment_name.clone()));
    body.insert(
        "max_tokens".into(),
        json!(
            config
                .max_output_tokens
                .or(model.max_response_tokens)
                .unwrap_or(DEFAULT_MAX_TOKENS)
        ),
    );
    if let Some(system) = system_blocks(request) {
        body.insert("system".into(), system);
    }
    body.insert("messages".into(), build_messages(&messages, gate)?);
    if stream {
        body.insert("stream".into(), Value::Bool(true));
    }
    if let Some(temperature) = config.temperature {
        body.insert("temperature".into(), float_value(temperature));
    }
    if let Some(top_p) = request.top_p {
        body.insert("top_p".into(), float_value(top_p));
    }
    if let Some(budget) = config.thinking_budget
        && gate.allow_thinking
    {
        body.insert(
            "thinking".into(),
            json!({ "type": "enabled", "budget_tokens": budget }),
        );
    }

    let tools = build_tools(request);
    if !tools.is_empty() {
        body.insert("tools".into(), Value::Array(tools));
    }
    if let Some(user) = &request.end_user_id {
        body.insert("metadata".into(), json!({ "user_id": user }));
    }
    Ok(Value::Object(body))
}

/// Body for `/v1/messages/count_tokens`: the prompt-shaping fields only.
pub fn build_count_tokens_body(request: &ChatRequest) -> Result<Value, LlmError> {
    let full = build_body(request, false)?;
    let mut body = Map::new();
    for field in ["model", "system", "messages", "tools", "thinking"] {
        if let Some(value) = full.get(field) {
            body.insert(field.into(), value.clone());
        }
    }
    Ok(Value::Object(body))
}

fn system_blocks(request: &ChatRequest) -> Option<Value> {
    let system = match &request.system {
        Some(system) => system.clone(),
        None => NeutralSystemMessage::from_text(request.chat_config.system_prompt.clone()?),
    };
    let blocks: Vec<Value> = system
        .blocks
        .iter()
        .filter(|b| !b.text.is_empty())
        .map(|b| {
            let mut block = json!({ "type": "text", "text": b.text });
            if b.cache_control {
                block["cache_control"] = json!({ "type": "ephemeral" });
            }
            block
        })
        .collect();
    (!blocks.is_empty()).then_some(Value::Array(blocks))
}

fn build_tools(request: &ChatRequest) -> Vec<Value> {
    let config = &request.chat_config;
    let model = request.model();
    let mut tools: Vec<Value> = request.tools.iter().map(custom_tool).collect();
    if config.web_search_enabled && model.allow_search {
        tools.push(json!({ "type": WEB_SEARCH_TOOL, "name": "web_search" }));
    }
    if config.code_execution_enabled && model.allow_code_execution {
        tools.push(json!({ "type": CODE_EXECUTION_TOOL, "name": "code_execution" }));
    }
    tools
}

fn custom_tool(tool: &ChatTool) -> Value {
    let mut out = Map::new();
    out.insert("name".into(), Value::String(tool.name.clone()));
    if let Some(description) = &tool.description {
        out.insert("description".into(), Value::String(description.clone()));
    }
    let schema = if tool.parameters.is_null() {
        json!({ "type": "object", "properties": {} })
    } else {
        tool.parameters.clone()
    };
    out.insert("input_schema".into(), schema);
    Value::Object(out)
}

/// Fold each run of tool-role messages into one user message.
pub fn merge_tool_messages(messages: &[NeutralMessage]) -> Vec<NeutralMessage> {
    let mut out: Vec<NeutralMessage> = Vec::with_capacity(messages.len());
    let mut pending: Vec<NeutralContent> = Vec::new();
    for message in messages {
        if message.role == NeutralRole::Tool {
            pending.extend(message.contents.iter().cloned());
            continue;
        }
        if !pending.is_empty() {
            out.push(NeutralMessage::new(NeutralRole::User, std::mem::take(&mut pending)));
        }
        out.push(message.clone());
    }
    if !pending.is_empty() {
        out.push(NeutralMessage::new(NeutralRole::User, pending));
    }
    out
}

/// Split tool responses out of assistant turns into user turns, keeping the order of
/// everything around them.
pub fn switch_server_tool_responses_as_user(messages: Vec<NeutralMessage>) -> Vec<NeutralMessage> {
    let mut out = Vec::with_capacity(messages.len());
    for message in messages {
        if message.role != NeutralRole::Assistant
            || !message.contents.iter().any(NeutralContent::is_tool_response)
        {
            out.push(message);
            continue;
        }

        let mut run_role = NeutralRole::Assistant;
        let mut run: Vec<NeutralContent> = Vec::new();
        for content in message.contents {
            let role = if content.is_tool_response() {
                NeutralRole::User
            } else {
                NeutralRole::Assistant
            };
            if role != run_role && !run.is_empty() {
                out.push(NeutralMessage::new(run_role, std::mem::take(&mut run)));
            }
            run_role = role;
            run.push(content);
        }
        if !run.is_empty() {
            out.push(NeutralMessage::new(run_role, run));
        }
    }
    out
}

fn build_messages(messages: &[NeutralMessage], gate: ThinkingGate) -> Result<Value, LlmError> {
    let mut out = Vec::with_capacity(messages.len());
    for message in messages {
        let role = match message.role {
            NeutralRole::Assistant => "assistant",
            NeutralRole::User | NeutralRole::Tool => "user",
        };
        let mut blocks = Vec::with_capacity(message.contents.len());
        for content in &message.contents {
            if let Some(block) = content_block(content, gate)? {
                blocks.push(block);
            }
        }
        if !blocks.is_empty() {
            out.push(json!({ "role": role, "content": blocks }));
        }
    }
    Ok(Value::Array(out))
}

fn content_block(content: &NeutralContent, gate: ThinkingGate) -> Result<Option<Value>, LlmError> {
    let block = match content {
        NeutralContent::Text { content } | NeutralContent::Error { content } => {
            if content.is_empty() {
                return Ok(None);
            }
            json!({ "type": "text", "text": content })
        }
        NeutralContent::Think { content, signature } => {
            let Some(signature) = signature.as_deref().filter(|s| !s.is_empty()) else {
                return Ok(None);
            };
            if !gate.allow_thinking_blocks {
                return Ok(None);
            }
            if content.is_empty() {
                json!({ "type": "redacted_thinking", "data": signature })
            } else {
                json!({ "type": "thinking", "thinking": content, "signature": signature })
            }
        }
        NeutralContent::FileUrl { url } => json!({
            "type": "image",
            "source": { "type": "url", "url": url },
        }),
        NeutralContent::FileBlob { media_type, bytes } => {
            use base64::Engine;
            json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": media_type,
                    "data": base64::engine::general_purpose::STANDARD.encode(bytes),
                },
            })
        }
        NeutralContent::File { .. } => {
            return Err(LlmError::InternalConfigIssue(
                "File content must be resolved to a URL or blob before sending".into(),
            ));
        }
        NeutralContent::ToolCall {
            id,
            name,
            arguments,
        } => {
            let input = if arguments.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str(arguments).map_err(|e| {
                    LlmError::InvalidParameter(format!("tool call {id} has invalid arguments: {e}"))
                })?
            };
            json!({ "type": "tool_use", "id": id, "name": name, "input": input })
        }
        NeutralContent::ToolCallResponse {
            tool_call_id,
            response,
            is_success,
            ..
        } => {
            let mut block = json!({
                "type": "tool_result",
                "tool_use_id": tool_call_id,
                "content": response,
            });
            if !is_success {
                block["is_error"] = Value::Bool(true);
            }
            block
        }
    };
    Ok(Some(block))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ApiType, Model, ModelProvider, SystemBlock};

    fn request(messages: Vec<NeutralMessage>) -> ChatRequest {
        let model = Model::new(1, "claude-x", ModelProvider::Anthropic, ApiType::AnthropicMessages);
        ChatRequest::simple("x", model).with_messages(messages)
    }

    fn assistant(contents: Vec<NeutralContent>) -> NeutralMessage {
        NeutralMessage::new(NeutralRole::Assistant, contents)
    }

    #[test]
    fn consecutive_tool_messages_become_one_user_turn() {
        let merged = merge_tool_messages(&[
            NeutralMessage::user("q"),
            assistant(vec![
                NeutralContent::tool_call("a", "f", "{}"),
                NeutralContent::tool_call("b", "f", "{}"),
            ]),
            NeutralMessage::tool("a", "1"),
            NeutralMessage::tool("b", "2"),
            NeutralMessage::assistant("done"),
        ]);
        assert_eq!(merged.len(), 4);
        assert_eq!(merged[2].role, NeutralRole::User);
        assert_eq!(merged[2].contents.len(), 2);
        assert_eq!(merged[3].text(), "done");
    }

    #[test]
    fn server_tool_responses_move_to_a_user_turn() {
        let switched = switch_server_tool_responses_as_user(vec![assistant(vec![
            NeutralContent::text("searching"),
            NeutralContent::tool_call("s1", "web_search", "{}"),
            NeutralContent::tool_response("s1", "[]"),
            NeutralContent::text("found it"),
        ])]);
        let roles: Vec<NeutralRole> = switched.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![NeutralRole::Assistant, NeutralRole::User, NeutralRole::Assistant]
        );
        assert_eq!(switched[0].contents.len(), 2);
        assert_eq!(switched[2].text(), "found it");
    }

    #[test]
    fn unsigned_think_with_tool_calls_closes_the_gate() {
        let messages = vec![
            NeutralMessage::user("q"),
            assistant(vec![
                NeutralContent::think("plan", None),
                NeutralContent::think("more", Some("sig".into())),
                NeutralContent::tool_call("a", "f", "{}"),
            ]),
            NeutralMessage::tool("a", "1"),
        ];
        let gate = ThinkingGate::for_messages(&messages);
        assert!(!gate.allow_thinking_blocks);
        assert!(!gate.allow_thinking);

        let mut req = request(messages);
        req.chat_config.thinking_budget = Some(2048);
        let body = build_body(&req, true).expect("body");
        assert!(body.get("thinking").is_none());
        let blocks = body["messages"][1]["content"].as_array().expect("blocks");
        assert!(blocks.iter().all(|b| b["type"] == "tool_use"));
    }

    #[test]
    fn mixed_signatures_without_tool_calls_replay_no_thinking() {
        let messages = vec![
            NeutralMessage::user("q"),
            assistant(vec![
                NeutralContent::think("unsigned", None),
                NeutralContent::think("signed", Some("sig".into())),
                NeutralContent::text("answer"),
            ]),
            NeutralMessage::user("again"),
        ];
        let gate = ThinkingGate::for_messages(&messages);
        assert!(!gate.allow_thinking_blocks);
        assert!(gate.allow_thinking);

        let mut req = request(messages);
        req.chat_config.thinking_budget = Some(1024);
        let body = build_body(&req, true).expect("body");
        assert_eq!(body["thinking"]["budget_tokens"], 1024);
        let blocks = body["messages"][1]["content"].as_array().expect("blocks");
        assert_eq!(blocks, &vec![json!({"type": "text", "text": "answer"})]);
    }

    #[test]
    fn signed_thinking_is_replayed_and_empty_becomes_redacted() {
        let messages = vec![
            NeutralMessage::user("q"),
            assistant(vec![
                NeutralContent::think("plan", Some("sig-1".into())),
                NeutralContent::think("", Some("opaque".into())),
                NeutralContent::tool_call("a", "f", "{\"x\":1}"),
            ]),
            NeutralMessage::tool("a", "1"),
        ];
        let mut req = request(messages);
        req.chat_config.thinking_budget = Some(2048);
        let body = build_body(&req, false).expect("body");
        assert_eq!(body["thinking"]["budget_tokens"], 2048);
        let blocks = &body["messages"][1]["content"];
        assert_eq!(
            blocks[0],
            json!({"type": "thinking", "thinking": "plan", "signature": "sig-1"})
        );
        assert_eq!(blocks[1], json!({"type": "redacted_thinking", "data": "opaque"}));
        assert_eq!(blocks[2]["input"], json!({"x": 1}));
        assert_eq!(body["messages"][2]["content"][0]["type"], "tool_result");
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn body_defaults_and_hosted_tools() {
        let mut req = request(vec![NeutralMessage::user("hi")]);
        req.system = Some(NeutralSystemMessage {
            blocks: vec![
                SystemBlock { text: "cached".into(), cache_control: true },
                SystemBlock { text: "plain".into(), cache_control: false },
            ],
        });
        req.chat_config.model.allow_search = true;
        req.chat_config.web_search_enabled = true;
        req.end_user_id = Some("u-1".into());
        let body = build_body(&req, true).expect("body");
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["system"][0]["cache_control"]["type"], "ephemeral");
        assert!(body["system"][1].get("cache_control").is_none());
        assert_eq!(body["tools"][0]["type"], WEB_SEARCH_TOOL);
        assert_eq!(body["metadata"]["user_id"], "u-1");
        assert_eq!(body["stream"], true);
    }
}
