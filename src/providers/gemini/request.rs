//! `generateContent` request body.

use std::collections::HashMap;

use base64::Engine;
use serde_json::{Map, Value, json};

use crate::error::LlmError;
use crate::providers::float_value;
use crate::types::{ChatRequest, ChatTool, NeutralContent, NeutralMessage, NeutralRole};

/// Thinking budget used for low and minimal effort.
pub const LOW_EFFORT_THINKING_BUDGET: u32 = 1024;

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
    "HARM_CATEGORY_HARASSMENT",
];

const IMAGE_OUTPUT_MODELS: [&str; 2] = ["gemini-2.0-flash-exp", "gemini-2.5-flash-image"];

/// Whether the deployment can answer with images.
pub fn allows_image_output(deployment_name: &str) -> bool {
    IMAGE_OUTPUT_MODELS.iter().any(|m| deployment_name.contains(m))
}

/// `models/{name}`, unless the name already has the prefix.
pub fn model_path(deployment_name: &str) -> String {
    if deployment_name.starts_with("models/") {
        deployment_name.to_string()
    } else {
        format!("models/{deployment_name}")
    }
}

pub fn build_body(request: &ChatRequest) -> Result<Value, LlmError> {
    let mut body = Map::new();
    body.insert("contents".into(), Value::Array(build_contents(&request.messages)?));
    body.insert(
        "safetySettings".into(),
        Value::Array(
            SAFETY_CATEGORIES
                .iter()
                .map(|c| json!({ "category": c, "threshold": "BLOCK_NONE" }))
                .collect(),
        ),
    );
    body.insert("generationConfig".into(), generation_config(request));
    if let Some(system) = request.effective_system_prompt().filter(|s| !s.is_empty()) {
        body.insert(
            "systemInstruction".into(),
            json!({ "role": "system", "parts": [{ "text": system }] }),
        );
    }
    let tools = build_tools(request);
    if !tools.is_empty() {
        body.insert("tools".into(), Value::Array(tools));
    }
    Ok(Value::Object(body))
}

fn generation_config(request: &ChatRequest) -> Value {
    let config = &request.chat_config;
    let model = request.model();
    let mut out = Map::new();

    let mut modalities = vec![json!("TEXT")];
    if allows_image_output(&model.deployment_name) {
        modalities.push(json!("IMAGE"));
    }
    out.insert("responseModalities".into(), Value::Array(modalities));

    if let Some(temperature) = config.temperature {
        out.insert("temperature".into(), float_value(temperature));
    }
    if let Some(top_p) = request.top_p {
        out.insert("topP".into(), float_value(top_p));
    }
    if let Some(max) = config
        .max_output_tokens
        .or(model.max_response_tokens)
        .filter(|m| *m > 0)
    {
        out.insert("maxOutputTokens".into(), json!(max));
    }
    if let Some(seed) = request.seed {
        out.insert("seed".into(), json!(seed));
    }
    if model.supports_reasoning() {
        let mut thinking = json!({ "includeThoughts": true });
        let budget = if config.reasoning_effort.is_low_or_minimal() {
            Some(LOW_EFFORT_THINKING_BUDGET)
        } else {
            config.thinking_budget
        };
        if let Some(budget) = budget.filter(|b| *b > 0) {
            thinking["thinkingBudget"] = json!(budget);
        }
        out.insert("thinkingConfig".into(), thinking);
    }
    Value::Object(out)
}

fn build_tools(request: &ChatRequest) -> Vec<Value> {
    let config = &request.chat_config;
    let model = request.model();
    let mut tools = Vec::new();
    if !request.tools.is_empty() {
        let declarations: Vec<Value> = request.tools.iter().map(function_declaration).collect();
        tools.push(json!({ "functionDeclarations": declarations }));
    }
    if config.code_execution_enabled && model.allow_code_execution {
        tools.push(json!({ "codeExecution": {} }));
    }
    if config.web_search_enabled && model.allow_search {
        tools.push(json!({ "googleSearch": {} }));
    }
    tools
}

fn function_declaration(tool: &ChatTool) -> Value {
    let mut out = json!({ "name": tool.name, "parameters": gemini_schema(&tool.parameters) });
    if let Some(description) = tool.description.as_deref().filter(|d| !d.is_empty()) {
        out["description"] = json!(description);
    }
    out
}

/// Convert a JSON-schema object into Gemini's upper-case schema subset.
///
/// Only top-level properties (type and description) and `required` survive; anything
/// else is dropped.
pub fn gemini_schema(schema: &Value) -> Value {
    let mut out = json!({ "type": "OBJECT" });
    let Some(root) = schema.as_object() else {
        return out;
    };

    if let Some(props) = root.get("properties").and_then(Value::as_object) {
        let mut properties = Map::new();
        for (name, prop) in props {
            let Some(prop) = prop.as_object() else {
                continue;
            };
            let mut converted = json!({
                "type": schema_type(prop.get("type").and_then(Value::as_str)),
            });
            if let Some(description) = prop.get("description").and_then(Value::as_str) {
                converted["description"] = json!(description);
            }
            properties.insert(name.clone(), converted);
        }
        if !properties.is_empty() {
            out["properties"] = Value::Object(properties);
        }
    }

    let required: Vec<&str> = root
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .collect();
    if !required.is_empty() {
        out["required"] = json!(required);
    }
    out
}

fn schema_type(kind: Option<&str>) -> &'static str {
    match kind {
        Some("integer") => "INTEGER",
        Some("null") => "NULL",
        Some("number") => "NUMBER",
        Some("boolean") => "BOOLEAN",
        Some("array") => "ARRAY",
        Some("object") => "OBJECT",
        _ => "STRING",
    }
}

pub fn build_contents(messages: &[NeutralMessage]) -> Result<Vec<Value>, LlmError> {
    // functionResponse must name the function, which only the call carries
    let call_names: HashMap<&str, &str> = messages
        .iter()
        .flat_map(|m| m.contents.iter())
        .filter_map(|c| match c {
            NeutralContent::ToolCall { id, name, .. } => Some((id.as_str(), name.as_str())),
            _ => None,
        })
        .collect();

    let mut out = Vec::with_capacity(messages.len());
    for message in messages {
        let (role, parts) = match message.role {
            NeutralRole::User => ("user", user_parts(message)?),
            NeutralRole::Assistant => ("model", model_parts(message)?),
            NeutralRole::Tool => ("user", tool_parts(message, &call_names)?),
        };
        if !parts.is_empty() {
            out.push(json!({ "role": role, "parts": parts }));
        }
    }
    Ok(out)
}

fn user_parts(message: &NeutralMessage) -> Result<Vec<Value>, LlmError> {
    let mut parts = Vec::new();
    for content in &message.contents {
        if let Some(part) = content_part(content)? {
            parts.push(part);
        }
    }
    Ok(parts)
}

/// Model turns drop thinking text; a Think's signature rides on the next call or text
/// part.
fn model_parts(message: &NeutralMessage) -> Result<Vec<Value>, LlmError> {
    let mut parts = Vec::new();
    let mut pending_signature: Option<&str> = None;
    for content in &message.contents {
        let mut part = match content {
            NeutralContent::Think { signature, .. } => {
                if let Some(signature) = signature.as_deref().filter(|s| !s.is_empty()) {
                    pending_signature = Some(signature);
                }
                continue;
            }
            NeutralContent::ToolCall {
                id,
                name,
                arguments,
            } => {
                let args = serde_json::from_str::<Value>(arguments)
                    .ok()
                    .filter(Value::is_object)
                    .unwrap_or_else(|| json!({}));
                json!({ "functionCall": { "id": id, "name": name, "args": args } })
            }
            other => match content_part(other)? {
                Some(part) => part,
                None => continue,
            },
        };
        if let Some(signature) = pending_signature.take() {
            part["thoughtSignature"] = json!(signature);
        }
        parts.push(part);
    }
    Ok(parts)
}

fn tool_parts(
    message: &NeutralMessage,
    call_names: &HashMap<&str, &str>,
) -> Result<Vec<Value>, LlmError> {
    let mut parts = Vec::new();
    for content in &message.contents {
        if let NeutralContent::ToolCallResponse {
            tool_call_id,
            response,
            ..
        } = content
        {
            let result = serde_json::from_str::<Value>(response)
                .unwrap_or_else(|_| Value::String(response.clone()));
            let name = call_names
                .get(tool_call_id.as_str())
                .copied()
                .unwrap_or(tool_call_id.as_str());
            parts.push(json!({
                "functionResponse": {
                    "id": tool_call_id,
                    "name": name,
                    "response": { "result": result },
                }
            }));
        }
    }
    if parts.is_empty() {
        return Err(LlmError::InvalidParameter(
            "tool message has no tool call response".into(),
        ));
    }
    Ok(parts)
}

fn content_part(content: &NeutralContent) -> Result<Option<Value>, LlmError> {
    Ok(match content {
        NeutralContent::Text { content } | NeutralContent::Error { content } => {
            Some(json!({ "text": content }))
        }
        NeutralContent::FileBlob { media_type, bytes } => Some(json!({
            "inlineData": {
                "data": base64::engine::general_purpose::STANDARD.encode(bytes),
                "mimeType": media_type,
            }
        })),
        NeutralContent::FileUrl { .. } => {
            return Err(LlmError::InternalConfigIssue(
                "Google AI needs image bytes; download file URLs before sending".into(),
            ));
        }
        NeutralContent::File { .. } => {
            return Err(LlmError::InternalConfigIssue(
                "File content must be resolved to a URL or blob before sending".into(),
            ));
        }
        NeutralContent::Think { .. }
        | NeutralContent::ToolCall { .. }
        | NeutralContent::ToolCallResponse { .. } => None,
    })
}
