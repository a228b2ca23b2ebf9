//! Responses API request body.

use serde_json::{Map, Value, json};

use crate::error::LlmError;
use crate::providers::float_value;
use crate::types::{ChatRequest, ChatTool, NeutralContent, NeutralMessage, NeutralRole, TextFormat};

pub fn build_body(request: &ChatRequest, stream: bool) -> Result<Value, LlmError> {
    let config = &request.chat_config;
    let mut body = Map::new();
    body.insert(
        "model".into(),
        Value::String(config.model.deployment_name.clone()),
    );
    body.insert("input".into(), Value::Array(build_input(request)?));
    body.insert("stream".into(), Value::Bool(stream));
    body.insert("store".into(), Value::Bool(false));

    if let Some(temperature) = config.temperature {
        body.insert("temperature".into(), float_value(temperature));
    }
    if let Some(user) = &request.end_user_id {
        body.insert("user".into(), Value::String(user.clone()));
    }
    if let Some(max) = config.max_output_tokens {
        body.insert("max_output_tokens".into(), json!(max));
    }
    if let Some(effort) = config.reasoning_effort.as_wire_str() {
        body.insert(
            "reasoning".into(),
            json!({ "effort": effort, "summary": "detailed" }),
        );
        body.insert("include".into(), json!(["reasoning.encrypted_content"]));
    }
    if let Some(format) = &request.text_format {
        body.insert("text".into(), json!({ "format": text_format(format) }));
    }

    let tools: Vec<Value> = request.tools.iter().map(function_tool).collect();
    if !tools.is_empty() {
        body.insert("tools".into(), Value::Array(tools));
    }
    Ok(Value::Object(body))
}

/// Responses tools are flat: no nested `function` object.
fn function_tool(tool: &ChatTool) -> Value {
    let mut out = Map::new();
    out.insert("type".into(), Value::String("function".into()));
    out.insert("name".into(), Value::String(tool.name.clone()));
    if let Some(description) = &tool.description {
        out.insert("description".into(), Value::String(description.clone()));
    }
    if !tool.parameters.is_null() {
        out.insert("parameters".into(), tool.parameters.clone());
    }
    if let Some(strict) = tool.strict {
        out.insert("strict".into(), Value::Bool(strict));
    }
    Value::Object(out)
}

fn text_format(format: &TextFormat) -> Value {
    match format {
        TextFormat::Text => json!({ "type": "text" }),
        TextFormat::JsonObject => json!({ "type": "json_object" }),
        TextFormat::JsonSchema {
            name,
            schema,
            strict,
        } => {
            let mut out = json!({ "type": "json_schema", "name": name, "schema": schema });
            if let Some(strict) = strict {
                out["strict"] = Value::Bool(*strict);
            }
            out
        }
    }
}

pub fn build_input(request: &ChatRequest) -> Result<Vec<Value>, LlmError> {
    let mut input = Vec::new();
    if let Some(system) = request.effective_system_prompt() {
        input.push(json!({
            "type": "message",
            "role": "system",
            "content": [{ "type": "input_text", "text": system }],
        }));
    }
    for message in &request.messages {
        push_message(&mut input, message)?;
    }
    Ok(input)
}

fn push_message(input: &mut Vec<Value>, message: &NeutralMessage) -> Result<(), LlmError> {
    match message.role {
        NeutralRole::User => {
            let mut parts = Vec::new();
            for content in &message.contents {
                match content {
                    NeutralContent::Text { content } | NeutralContent::Error { content } => {
                        parts.push(json!({ "type": "input_text", "text": content }));
                    }
                    NeutralContent::FileUrl { url } => {
                        parts.push(json!({ "type": "input_image", "image_url": url }));
                    }
                    NeutralContent::FileBlob { media_type, bytes } => parts.push(json!({
                        "type": "input_image",
                        "image_url": NeutralContent::data_url(media_type, bytes),
                    })),
                    NeutralContent::File { .. } => {
                        return Err(LlmError::InternalConfigIssue(
                            "File content must be resolved to a URL or blob before sending".into(),
                        ));
                    }
                    _ => {}
                }
            }
            input.push(json!({ "type": "message", "role": "user", "content": parts }));
        }
        NeutralRole::Assistant => {
            for content in &message.contents {
                if let NeutralContent::Think {
                    signature: Some(signature),
                    ..
                } = content
                    && !signature.trim().is_empty()
                {
                    input.push(json!({
                        "type": "reasoning",
                        "encrypted_content": signature,
                        "summary": [],
                    }));
                }
            }
            for content in &message.contents {
                if let NeutralContent::ToolCall {
                    id,
                    name,
                    arguments,
                } = content
                {
                    input.push(json!({
                        "type": "function_call",
                        "call_id": id,
                        "name": name,
                        "arguments": arguments,
                    }));
                }
            }
            let parts: Vec<Value> = message
                .contents
                .iter()
                .filter_map(|c| match c {
                    NeutralContent::Text { content } | NeutralContent::Error { content } => {
                        Some(json!({ "type": "output_text", "text": content }))
                    }
                    _ => None,
                })
                .collect();
            if !parts.is_empty() {
                input.push(json!({ "type": "message", "role": "assistant", "content": parts }));
            }
        }
        NeutralRole::Tool => {
            if let Some((call_id, output)) = message.contents.iter().find_map(|c| match c {
                NeutralContent::ToolCallResponse {
                    tool_call_id,
                    response,
                    ..
                } => Some((tool_call_id, response)),
                _ => None,
            }) {
                input.push(json!({
                    "type": "function_call_output",
                    "call_id": call_id,
                    "output": output,
                }));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ApiType, Model, ModelProvider, ReasoningEffort};

    fn request() -> ChatRequest {
        ChatRequest::simple(
            "hi",
            Model::new(1, "o4-mini", ModelProvider::OpenAI, ApiType::Response),
        )
    }

    #[test]
    fn effort_requests_encrypted_reasoning() {
        let mut req = request();
        req.chat_config.reasoning_effort = ReasoningEffort::Medium;
        req.chat_config.max_output_tokens = Some(100);
        let body = build_body(&req, true).expect("body");
        assert_eq!(body["reasoning"], json!({"effort": "medium", "summary": "detailed"}));
        assert_eq!(body["include"][0], "reasoning.encrypted_content");
        assert_eq!(body["max_output_tokens"], 100);
        assert_eq!(body["store"], false);

        let body = build_body(&request(), true).expect("body");
        assert!(body.get("reasoning").is_none());
    }

    #[test]
    fn assistant_turn_order_is_reasoning_calls_then_message() {
        let req = request().with_messages(vec![
            NeutralMessage::user("weather?"),
            NeutralMessage::new(
                NeutralRole::Assistant,
                vec![
                    NeutralContent::think("summary", Some("enc".into())),
                    NeutralContent::text("checking"),
                    NeutralContent::tool_call("call_1", "weather", "{}"),
                ],
            ),
            NeutralMessage::tool("call_1", "sunny"),
        ]);
        let input = build_input(&req).expect("input");
        let kinds: Vec<&str> = input.iter().map(|i| i["type"].as_str().unwrap_or("")).collect();
        assert_eq!(
            kinds,
            vec!["message", "reasoning", "function_call", "message", "function_call_output"]
        );
        assert_eq!(input[1]["encrypted_content"], "enc");
        assert_eq!(input[3]["content"][0]["type"], "output_text");
        assert_eq!(input[4]["output"], "sunny");
    }

    #[test]
    fn schema_format_is_flat() {
        let mut req = request();
        req.text_format = Some(TextFormat::JsonSchema {
            name: "a".into(),
            schema: json!({"type": "object"}),
            strict: None,
        });
        let body = build_body(&req, false).expect("body");
        assert_eq!(body["text"]["format"]["name"], "a");
        assert!(body["text"]["format"].get("json_schema").is_none());
    }
}
