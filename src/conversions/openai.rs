//! OpenAI chat-completions `messages` → neutral messages.
//!
//! System and developer messages are left out of [`parse_messages`]; read them with
//! [`extract_system_prompt`]. Names, refusals, audio and logprob metadata are dropped.

use serde_json::Value;

use super::decode_base64;
use crate::error::LlmError;
use crate::types::{NeutralContent, NeutralMessage, NeutralRole};
use crate::utils::mime::parse_data_url;

fn is_system_role(role: Option<&str>) -> bool {
    matches!(role, Some("system" | "developer"))
}

/// Parse an OpenAI `messages` array.
///
/// Messages that end up without any content are skipped. An unknown role is an
/// [`LlmError::InvalidParameter`].
pub fn parse_messages(messages: &Value) -> Result<Vec<NeutralMessage>, LlmError> {
    let mut out = Vec::new();
    for message in messages.as_array().into_iter().flatten() {
        let role = message["role"].as_str();
        if is_system_role(role) {
            continue;
        }
        if let Some(parsed) = parse_message(message, role)? {
            out.push(parsed);
        }
    }
    Ok(out)
}

/// System and developer text joined with `"\r\n"`, or `None` when there is none.
pub fn extract_system_prompt(messages: &Value) -> Option<String> {
    let prompts: Vec<&str> = messages
        .as_array()
        .into_iter()
        .flatten()
        .filter(|m| is_system_role(m["role"].as_str()))
        .flat_map(|m| match &m["content"] {
            Value::String(s) => vec![s.as_str()],
            Value::Array(parts) => parts.iter().filter_map(|p| p["text"].as_str()).collect(),
            _ => Vec::new(),
        })
        .filter(|s| !s.trim().is_empty())
        .collect();
    (!prompts.is_empty()).then(|| prompts.join("\r\n"))
}

fn parse_message(message: &Value, role: Option<&str>) -> Result<Option<NeutralMessage>, LlmError> {
    let role = match role {
        Some("user") => NeutralRole::User,
        Some("assistant") => NeutralRole::Assistant,
        Some("tool") => NeutralRole::Tool,
        other => {
            return Err(LlmError::InvalidParameter(format!(
                "Role '{}' is not supported",
                other.unwrap_or_default()
            )));
        }
    };

    let mut contents = Vec::new();
    if role == NeutralRole::Tool {
        if let Some(id) = message["tool_call_id"].as_str() {
            let response = content_string(&message["content"]).unwrap_or_default();
            contents.push(NeutralContent::tool_response(id, response));
        }
    } else {
        // Reasoning goes first so interleaved thinking replays before the calls.
        if role == NeutralRole::Assistant
            && let Some(reasoning) =
                content_string(&message["reasoning_content"]).filter(|r| !r.is_empty())
        {
            contents.push(NeutralContent::think(reasoning, None));
        }

        parse_content(&message["content"], &mut contents)?;

        if role == NeutralRole::Assistant {
            for call in message["tool_calls"].as_array().into_iter().flatten() {
                let (Some(id), Some(name)) =
                    (call["id"].as_str(), call["function"]["name"].as_str())
                else {
                    continue;
                };
                let arguments = call["function"]["arguments"].as_str().unwrap_or("{}");
                contents.push(NeutralContent::tool_call(id, name, arguments));
            }
        }
    }

    Ok((!contents.is_empty()).then(|| NeutralMessage::new(role, contents)))
}

fn parse_content(content: &Value, out: &mut Vec<NeutralContent>) -> Result<(), LlmError> {
    match content {
        Value::String(text) if !text.is_empty() => out.push(NeutralContent::text(text.as_str())),
        Value::Array(parts) => {
            for part in parts {
                match part["type"].as_str() {
                    Some("text") => {
                        if let Some(text) = part["text"].as_str().filter(|t| !t.is_empty()) {
                            out.push(NeutralContent::text(text));
                        }
                    }
                    Some("image_url") => {
                        let url = part["image_url"]["url"].as_str();
                        if let Some(url) = url.filter(|u| !u.is_empty()) {
                            out.push(image_content(url)?);
                        }
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }
    Ok(())
}

fn image_content(url: &str) -> Result<NeutralContent, LlmError> {
    if !url.starts_with("data:") {
        return Ok(NeutralContent::FileUrl {
            url: url.to_string(),
        });
    }
    let (media_type, payload) = parse_data_url(url)
        .ok_or_else(|| LlmError::InvalidParameter("image data URL must be base64".into()))?;
    Ok(NeutralContent::FileBlob {
        media_type: media_type.to_string(),
        bytes: decode_base64(payload)?,
    })
}

/// String content, or the concatenated `text` of content parts.
fn content_string(content: &Value) -> Option<String> {
    match content {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => Some(parts.iter().filter_map(|p| p["text"].as_str()).collect()),
        _ => None,
    }
}
