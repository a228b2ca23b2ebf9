//! Anthropic Messages `messages` / `system` → neutral model.

use serde_json::Value;

use super::decode_base64;
use crate::error::LlmError;
use crate::types::{NeutralContent, NeutralMessage, NeutralRole, NeutralSystemMessage, SystemBlock};

/// Parse an Anthropic `messages` array.
///
/// `tool_result` blocks in a user turn become a separate Tool message placed before the
/// remaining user content, so each result directly follows the call it answers.
pub fn parse_messages(messages: &Value) -> Result<Vec<NeutralMessage>, LlmError> {
    let mut out = Vec::new();
    for message in messages.as_array().into_iter().flatten() {
        let (Some(role), content) = (message["role"].as_str(), &message["content"]) else {
            continue;
        };
        if content.is_null() {
            continue;
        }
        let contents = parse_content(content)?;
        match role {
            "user" => {
                let (results, user): (Vec<_>, Vec<_>) =
                    contents.into_iter().partition(NeutralContent::is_tool_response);
                if !results.is_empty() {
                    out.push(NeutralMessage::new(NeutralRole::Tool, results));
                }
                if !user.is_empty() {
                    out.push(NeutralMessage::new(NeutralRole::User, user));
                }
            }
            "assistant" => out.push(NeutralMessage::new(NeutralRole::Assistant, contents)),
            other => {
                return Err(LlmError::InvalidParameter(format!("Unknown role: {other}")));
            }
        }
    }
    Ok(out)
}

/// Parse the top-level `system` field: a string or an array of text blocks whose
/// `cache_control` flags are kept.
pub fn parse_system(system: &Value) -> Option<NeutralSystemMessage> {
    match system {
        Value::String(text) => Some(NeutralSystemMessage::from_text(text.as_str())),
        Value::Array(blocks) => {
            let blocks: Vec<SystemBlock> = blocks
                .iter()
                .filter(|b| b["type"] == "text")
                .filter_map(|b| {
                    let text = b["text"].as_str().filter(|t| !t.is_empty())?;
                    Some(SystemBlock {
                        text: text.to_string(),
                        cache_control: b["cache_control"]["type"]
                            .as_str()
                            .is_some_and(|t| !t.is_empty()),
                    })
                })
                .collect();
            (!blocks.is_empty()).then_some(NeutralSystemMessage { blocks })
        }
        _ => None,
    }
}

fn parse_content(content: &Value) -> Result<Vec<NeutralContent>, LlmError> {
    let blocks = match content {
        Value::String(text) if text.is_empty() => return Ok(Vec::new()),
        Value::String(text) => return Ok(vec![NeutralContent::text(text.as_str())]),
        Value::Array(blocks) => blocks,
        _ => return Ok(Vec::new()),
    };

    let mut out = Vec::new();
    for block in blocks {
        match block["type"].as_str() {
            Some("text") => {
                if let Some(text) = block["text"].as_str().filter(|t| !t.is_empty()) {
                    out.push(NeutralContent::text(text));
                }
            }
            Some("image") => {
                let source = &block["source"];
                match source["type"].as_str() {
                    Some("base64") => {
                        if let Some(data) = source["data"].as_str().filter(|d| !d.is_empty()) {
                            out.push(NeutralContent::FileBlob {
                                media_type: source["media_type"]
                                    .as_str()
                                    .unwrap_or("image/jpeg")
                                    .to_string(),
                                bytes: decode_base64(data)?,
                            });
                        }
                    }
                    Some("url") => {
                        if let Some(url) = source["url"].as_str().filter(|u| !u.is_empty()) {
                            out.push(NeutralContent::FileUrl {
                                url: url.to_string(),
                            });
                        }
                    }
                    _ => {}
                }
            }
            Some("tool_use") => {
                let id = block["id"].as_str().filter(|s| !s.is_empty());
                let name = block["name"].as_str().filter(|s| !s.is_empty());
                if let (Some(id), Some(name)) = (id, name) {
                    let input = match &block["input"] {
                        Value::Null => "{}".to_string(),
                        input => input.to_string(),
                    };
                    out.push(NeutralContent::tool_call(id, name, input));
                }
            }
            Some("tool_result") => {
                if let Some(id) = block["tool_use_id"].as_str().filter(|s| !s.is_empty()) {
                    let response = match &block["content"] {
                        Value::String(s) => s.clone(),
                        Value::Array(parts) => parts
                            .iter()
                            .filter(|p| p["type"] == "text")
                            .filter_map(|p| p["text"].as_str())
                            .collect::<Vec<_>>()
                            .join("\n"),
                        Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    out.push(NeutralContent::ToolCallResponse {
                        tool_call_id: id.to_string(),
                        response,
                        is_success: !block["is_error"].as_bool().unwrap_or(false),
                        duration_ms: 0,
                    });
                }
            }
            Some("thinking") => {
                if let Some(thinking) = block["thinking"].as_str().filter(|t| !t.is_empty()) {
                    let signature = block["signature"].as_str().map(str::to_string);
                    out.push(NeutralContent::think(thinking, signature));
                }
            }
            Some("redacted_thinking") => {
                if let Some(data) = block["data"].as_str().filter(|d| !d.is_empty()) {
                    out.push(NeutralContent::think("", Some(data.to_string())));
                }
            }
            _ => {}
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_results_are_split_out_before_user_text() {
        let messages = json!([
            {"role": "user", "content": "weather?"},
            {"role": "assistant", "content": [
                {"type": "thinking", "thinking": "look it up", "signature": "sig-1"},
                {"type": "redacted_thinking", "data": "opaque"},
                {"type": "tool_use", "id": "toolu_1", "name": "get_weather",
                 "input": {"city": "Oslo"}}
            ]},
            {"role": "user", "content": [
                {"type": "text", "text": "also, hurry"},
                {"type": "tool_result", "tool_use_id": "toolu_1", "is_error": true,
                 "content": [
                     {"type": "text", "text": "timeout"},
                     {"type": "text", "text": "retry"}
                 ]}
            ]}
        ]);

        let parsed = parse_messages(&messages).expect("messages");
        assert_eq!(parsed.len(), 4);
        assert_eq!(
            parsed[1].contents,
            vec![
                NeutralContent::think("look it up", Some("sig-1".into())),
                NeutralContent::think("", Some("opaque".into())),
                NeutralContent::tool_call("toolu_1", "get_weather", "{\"city\":\"Oslo\"}"),
            ]
        );
        assert_eq!(parsed[2].role, NeutralRole::Tool);
        assert_eq!(
            parsed[2].contents,
            vec![NeutralContent::ToolCallResponse {
                tool_call_id: "toolu_1".into(),
                response: "timeout\nretry".into(),
                is_success: false,
                duration_ms: 0,
            }]
        );
        assert_eq!(parsed[3], NeutralMessage::user("also, hurry"));
    }

    #[test]
    fn images_and_unknown_roles() {
        let parsed = parse_messages(&json!([{"role": "user", "content": [
            {"type": "image", "source": {"type": "base64", "data": "AAAA"}},
            {"type": "image", "source": {"type": "url", "url": "https://img/x.png"}}
        ]}]))
        .expect("messages");
        assert!(matches!(
            &parsed[0].contents[0],
            NeutralContent::FileBlob { media_type, bytes }
                if media_type == "image/jpeg" && bytes == &[0, 0, 0]
        ));
        assert_eq!(
            parsed[0].contents[1],
            NeutralContent::FileUrl { url: "https://img/x.png".into() }
        );

        assert!(matches!(
            parse_messages(&json!([{"role": "system", "content": "x"}])),
            Err(LlmError::InvalidParameter(_))
        ));
    }

    #[test]
    fn system_blocks_keep_cache_flags() {
        let system = parse_system(&json!([
            {"type": "text", "text": "stable prefix", "cache_control": {"type": "ephemeral"}},
            {"type": "text", "text": ""},
            {"type": "text", "text": "today"}
        ]))
        .expect("system");
        assert_eq!(system.blocks.len(), 2);
        assert!(system.blocks[0].cache_control);
        assert!(!system.blocks[1].cache_control);
        assert_eq!(system.text(), "stable prefix\ntoday");

        assert_eq!(parse_system(&json!("plain")), Some(NeutralSystemMessage::from_text("plain")));
        assert_eq!(parse_system(&json!([])), None);
        assert_eq!(parse_system(&Value::Null), None);
    }
}
