//! Chat-completions request body and auth headers.

use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::strategy::{AuthScheme, EffortMapping, MaxTokensRule, ProviderStrategy, WebSearchMapping};
use crate::error::LlmError;
use crate::providers::{float_value, require_secret};
use crate::types::{
    ChatRequest, ChatTool, ModelKey, NeutralContent, NeutralMessage, NeutralRole, RequestSource,
};

/// Build the JSON body for `request`.
pub fn build_body(
    request: &ChatRequest,
    strategy: &ProviderStrategy,
    stream: bool,
) -> Result<Value, LlmError> {
    let config = &request.chat_config;
    let model = &config.model;
    let web_search = model.allow_search && config.web_search_enabled;

    let mut model_name = model.deployment_name.clone();
    if web_search
        && strategy.web_search == WebSearchMapping::OpenRouterOnline
        && !model_name.ends_with(":online")
    {
        model_name.push_str(":online");
    }

    let mut body = Map::new();
    body.insert("model".into(), Value::String(model_name));
    body.insert(
        "messages".into(),
        Value::Array(build_messages(request, strategy)?),
    );
    body.insert("stream".into(), Value::Bool(stream));
    if stream {
        body.insert("stream_options".into(), json!({ "include_usage": true }));
    }

    if let Some(temperature) = config.temperature {
        body.insert("temperature".into(), float_value(temperature));
    }

    let max_tokens = match strategy.max_tokens {
        MaxTokensRule::Optional => config.max_output_tokens,
        MaxTokensRule::AlwaysModelMax => model.max_response_tokens.or(config.max_output_tokens),
    };
    if let Some(max_tokens) = max_tokens {
        let field = if model.use_max_completion_tokens {
            "max_completion_tokens"
        } else {
            "max_tokens"
        };
        body.insert(field.into(), json!(max_tokens));
    }

    if let Some(user) = &request.end_user_id {
        body.insert("user".into(), Value::String(user.clone()));
    }
    if let Some(top_p) = request.top_p {
        body.insert("top_p".into(), float_value(top_p));
    }
    if let Some(seed) = request.seed {
        body.insert("seed".into(), json!(seed));
    }

    if request.source == RequestSource::WebChat && !request.tools.is_empty() {
        body.insert("parallel_tool_calls".into(), Value::Bool(true));
    } else if let Some(parallel) = request.allow_parallel_tool_calls {
        body.insert("parallel_tool_calls".into(), Value::Bool(parallel));
    }

    if let Some(format) = &request.text_format {
        body.insert("response_format".into(), format.to_openai_value());
    }

    let mut tools: Vec<Value> = request.tools.iter().map(function_tool).collect();
    if web_search && strategy.web_search == WebSearchMapping::ZhiPuWebSearchTool {
        tools.push(json!({ "type": "web_search", "web_search": { "enable": true } }));
    }
    if !tools.is_empty() {
        body.insert("tools".into(), Value::Array(tools));
    }

    apply_effort(&mut body, request, strategy);

    if web_search {
        match strategy.web_search {
            WebSearchMapping::QianFanWebSearch => {
                body.insert(
                    "web_search".into(),
                    json!({ "enable": true, "enable_citation": false, "enable_trace": false }),
                );
            }
            WebSearchMapping::DashScopeEnableSearch => {
                body.insert("enable_search".into(), Value::Bool(true));
            }
            WebSearchMapping::HunyuanEnableEnhancement => {
                body.insert("enable_enhancement".into(), Value::Bool(true));
            }
            WebSearchMapping::None
            | WebSearchMapping::OpenRouterOnline
            | WebSearchMapping::ZhiPuWebSearchTool => {}
        }
    }

    if strategy.reasoning_split {
        body.insert("reasoning_split".into(), Value::Bool(true));
    }

    Ok(Value::Object(body))
}

fn apply_effort(body: &mut Map<String, Value>, request: &ChatRequest, strategy: &ProviderStrategy) {
    let effort = request.chat_config.reasoning_effort;
    match strategy.reasoning_effort {
        EffortMapping::None => {}
        EffortMapping::Standard => {
            if let Some(effort) = effort.as_wire_str() {
                body.insert("reasoning_effort".into(), Value::String(effort.into()));
            }
        }
        EffortMapping::EnableThinkingFlag => {
            if effort.is_low_or_minimal() {
                body.insert("enable_thinking".into(), Value::Bool(false));
            }
        }
        EffortMapping::ThinkingObject => {
            if effort.as_wire_str().is_some() {
                let kind = if effort.is_low_or_minimal() {
                    "disabled"
                } else {
                    "enabled"
                };
                body.insert("thinking".into(), json!({ "type": kind }));
            }
        }
        EffortMapping::ThinkingBudgetToggle => {
            let kind = if request.chat_config.thinking_budget.is_some() {
                "enabled"
            } else {
                "disabled"
            };
            body.insert("thinking".into(), json!({ "type": kind }));
        }
    }
}

/// `{type: function, function: {name, description, parameters, strict}}`
pub fn function_tool(tool: &ChatTool) -> Value {
    let mut function = Map::new();
    function.insert("name".into(), Value::String(tool.name.clone()));
    if let Some(description) = &tool.description {
        function.insert("description".into(), Value::String(description.clone()));
    }
    if !tool.parameters.is_null() {
        function.insert("parameters".into(), tool.parameters.clone());
    }
    if let Some(strict) = tool.strict {
        function.insert("strict".into(), Value::Bool(strict));
    }
    json!({ "type": "function", "function": function })
}

/// System prompt first, then every conversation turn.
pub fn build_messages(
    request: &ChatRequest,
    strategy: &ProviderStrategy,
) -> Result<Vec<Value>, LlmError> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = request.effective_system_prompt() {
        messages.push(json!({ "role": "system", "content": system }));
    }
    for message in &request.messages {
        messages.push(to_openai_message(message, strategy)?);
    }
    Ok(messages)
}

fn to_openai_message(
    message: &NeutralMessage,
    strategy: &ProviderStrategy,
) -> Result<Value, LlmError> {
    if message.role == NeutralRole::Tool {
        return message
            .contents
            .iter()
            .find_map(|c| match c {
                NeutralContent::ToolCallResponse {
                    tool_call_id,
                    response,
                    ..
                } => Some(json!({
                    "role": "tool",
                    "tool_call_id": tool_call_id,
                    "content": response,
                })),
                _ => None,
            })
            .ok_or_else(|| {
                LlmError::InternalConfigIssue("Tool message without a tool call response".into())
            });
    }

    let role = match message.role {
        NeutralRole::User => "user",
        _ => "assistant",
    };

    let mut tool_calls = Vec::new();
    let mut thinking = Vec::new();
    let mut others = Vec::new();
    for content in &message.contents {
        match content {
            NeutralContent::ToolCall {
                id,
                name,
                arguments,
            } => tool_calls.push(json!({
                "id": id,
                "type": "function",
                "function": { "name": name, "arguments": arguments },
            })),
            NeutralContent::Think { content, signature } => {
                thinking.push((content.as_str(), signature.as_deref()));
            }
            other => others.push(other),
        }
    }

    let mut msg = Map::new();
    msg.insert("role".into(), Value::String(role.into()));

    match others.as_slice() {
        [NeutralContent::Text { content }] => {
            msg.insert("content".into(), Value::String(content.clone()));
        }
        [] => {}
        parts => {
            let mut array = Vec::with_capacity(parts.len());
            for part in parts {
                if let Some(part) = content_part(part)? {
                    array.push(part);
                }
            }
            if !array.is_empty() {
                msg.insert("content".into(), Value::Array(array));
            }
        }
    }

    let is_assistant = message.role == NeutralRole::Assistant;
    let has_tool_calls = is_assistant && !tool_calls.is_empty();
    if has_tool_calls {
        msg.insert("tool_calls".into(), Value::Array(tool_calls));
    }

    if strategy.send_reasoning_back && has_tool_calls && !thinking.is_empty() {
        let replay = if strategy.structured_reasoning() {
            structured_reasoning(&thinking)
        } else {
            let joined: String = thinking.iter().map(|(text, _)| *text).collect();
            (!joined.is_empty()).then_some(Value::String(joined))
        };
        if let Some(replay) = replay {
            msg.insert(strategy.reasoning_field.into(), replay);
        }
    }

    if strategy.structured_reasoning() && has_tool_calls && !msg.contains_key("content") {
        msg.insert("content".into(), Value::String(String::new()));
    }

    Ok(Value::Object(msg))
}

/// Preserved `reasoning_details` payloads, or a single text entry built from the
/// thinking text when none were preserved.
fn structured_reasoning(thinking: &[(&str, Option<&str>)]) -> Option<Value> {
    let mut preserved = Vec::new();
    for signature in thinking.iter().filter_map(|(_, s)| *s) {
        match serde_json::from_str::<Value>(signature) {
            Ok(Value::Array(items)) => preserved.extend(items),
            Ok(item @ Value::Object(_)) => preserved.push(item),
            _ => tracing::debug!("ignoring unparseable reasoning signature"),
        }
    }
    if !preserved.is_empty() {
        return Some(Value::Array(preserved));
    }

    let combined: String = thinking.iter().map(|(text, _)| *text).collect();
    if combined.is_empty() {
        return None;
    }
    Some(json!([{
        "type": "reasoning.text",
        "text": combined,
        "index": 0,
        "format": "MiniMax-response-v1",
    }]))
}

fn content_part(content: &NeutralContent) -> Result<Option<Value>, LlmError> {
    Ok(match content {
        NeutralContent::Text { content } | NeutralContent::Error { content } => {
            Some(json!({ "type": "text", "text": content }))
        }
        NeutralContent::FileUrl { url } => {
            Some(json!({ "type": "image_url", "image_url": { "url": url } }))
        }
        NeutralContent::FileBlob { media_type, bytes } => Some(json!({
            "type": "image_url",
            "image_url": { "url": NeutralContent::data_url(media_type, bytes) },
        })),
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

#[derive(Deserialize)]
struct QianFanSecret {
    #[serde(alias = "ApiKey", alias = "apiKey")]
    api_key: String,
    #[serde(alias = "AppId", alias = "appId")]
    app_id: String,
}

/// Attach credentials for `key` the way `strategy` expects.
pub fn apply_auth(
    builder: reqwest::RequestBuilder,
    strategy: &ProviderStrategy,
    key: &ModelKey,
) -> Result<reqwest::RequestBuilder, LlmError> {
    let secret = require_secret(key, strategy.provider_id)?;
    Ok(match strategy.auth {
        AuthScheme::Bearer => builder.bearer_auth(secret),
        AuthScheme::Header(name) => builder.header(name, secret),
        AuthScheme::QianFanAppId => {
            let parsed: QianFanSecret = serde_json::from_str(secret).map_err(|e| {
                LlmError::InternalConfigIssue(format!("Invalid qianfan secret: {e}"))
            })?;
            builder
                .bearer_auth(parsed.api_key)
                .header("appid", parsed.app_id)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ApiType, Model, ModelProvider, ReasoningEffort, TextFormat};

    fn request(provider: ModelProvider) -> ChatRequest {
        let model = Model::new(1, "m-1", provider, ApiType::ChatCompletion);
        ChatRequest::simple("hello", model)
    }

    fn strategy(provider: ModelProvider) -> ProviderStrategy {
        ProviderStrategy::for_provider(provider).expect("strategy")
    }

    #[test]
    fn streaming_body_has_usage_and_parameters() {
        let mut req = request(ModelProvider::OpenAI);
        req.chat_config.temperature = Some(0.7);
        req.chat_config.max_output_tokens = Some(256);
        req.chat_config.reasoning_effort = ReasoningEffort::High;
        req.chat_config.system_prompt = Some("be brief".into());
        req.end_user_id = Some("8".into());
        req.text_format = Some(TextFormat::JsonObject);

        let body = build_body(&req, &strategy(ModelProvider::OpenAI), true).expect("body");
        assert_eq!(body["model"], "m-1");
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(body["temperature"], 0.7);
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["reasoning_effort"], "high");
        assert_eq!(body["user"], "8");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0], json!({"role": "system", "content": "be brief"}));
        assert_eq!(body["messages"][1], json!({"role": "user", "content": "hello"}));
    }

    #[test]
    fn max_completion_tokens_when_the_model_wants_it() {
        let mut req = request(ModelProvider::OpenAI);
        req.chat_config.model.use_max_completion_tokens = true;
        req.chat_config.max_output_tokens = Some(10);
        let body = build_body(&req, &strategy(ModelProvider::OpenAI), false).expect("body");
        assert_eq!(body["max_completion_tokens"], 10);
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("stream_options").is_none());
    }

    #[test]
    fn web_chat_tools_enable_parallel_calls() {
        let req = request(ModelProvider::OpenAI)
            .with_source(RequestSource::WebChat)
            .with_tools(vec![ChatTool::function("f", "d", json!({"type": "object"}))]);
        let body = build_body(&req, &strategy(ModelProvider::OpenAI), true).expect("body");
        assert_eq!(body["parallel_tool_calls"], true);
        assert_eq!(body["tools"][0]["function"]["name"], "f");
    }

    #[test]
    fn provider_search_switches() {
        let mut req = request(ModelProvider::QianFan);
        req.chat_config.model.allow_search = true;
        req.chat_config.web_search_enabled = true;
        let body = build_body(&req, &strategy(ModelProvider::QianFan), true).expect("body");
        assert_eq!(body["web_search"]["enable"], true);

        let mut req = request(ModelProvider::OpenRouter);
        req.chat_config.model.allow_search = true;
        req.chat_config.web_search_enabled = true;
        let body = build_body(&req, &strategy(ModelProvider::OpenRouter), true).expect("body");
        assert_eq!(body["model"], "m-1:online");

        // search requested but not allowed by the model
        let mut req = request(ModelProvider::QianWen);
        req.chat_config.web_search_enabled = true;
        let body = build_body(&req, &strategy(ModelProvider::QianWen), true).expect("body");
        assert!(body.get("enable_search").is_none());
    }

    #[test]
    fn effort_mappings() {
        let mut req = request(ModelProvider::SiliconFlow);
        req.chat_config.reasoning_effort = ReasoningEffort::Low;
        req.chat_config.model.max_response_tokens = Some(8192);
        let body = build_body(&req, &strategy(ModelProvider::SiliconFlow), true).expect("body");
        assert_eq!(body["enable_thinking"], false);
        assert_eq!(body["max_tokens"], 8192);

        let mut req = request(ModelProvider::ZhiPuAI);
        req.chat_config.reasoning_effort = ReasoningEffort::Medium;
        let body = build_body(&req, &strategy(ModelProvider::ZhiPuAI), true).expect("body");
        assert_eq!(body["thinking"]["type"], "enabled");

        let mut req = request(ModelProvider::Mimo);
        req.chat_config.thinking_budget = Some(1);
        let body = build_body(&req, &strategy(ModelProvider::Mimo), true).expect("body");
        assert_eq!(body["thinking"]["type"], "enabled");
    }

    fn tool_turn(think: NeutralContent) -> ChatRequest {
        request(ModelProvider::DeepSeek).with_messages(vec![
            NeutralMessage::user("weather?"),
            NeutralMessage::new(
                NeutralRole::Assistant,
                vec![
                    think,
                    NeutralContent::tool_call("call_1", "get_weather", "{}"),
                ],
            ),
            NeutralMessage::tool("call_1", "sunny"),
        ])
    }

    #[test]
    fn deepseek_replays_reasoning_with_tool_calls() {
        let req = tool_turn(NeutralContent::think("need weather", None));
        let body = build_body(&req, &strategy(ModelProvider::DeepSeek), true).expect("body");
        let assistant = &body["messages"][1];
        assert_eq!(assistant["reasoning_content"], "need weather");
        assert_eq!(assistant["tool_calls"][0]["function"]["name"], "get_weather");
        assert_eq!(
            body["messages"][2],
            json!({"role": "tool", "tool_call_id": "call_1", "content": "sunny"})
        );

        // providers that do not replay reasoning leave it out
        let body = build_body(&req, &strategy(ModelProvider::OpenAI), true).expect("body");
        assert!(body["messages"][1].get("reasoning_content").is_none());
    }

    #[test]
    fn minimax_replays_reasoning_details() {
        let preserved = r#"[{"type":"reasoning.text","id":"r1","text":"t"}]"#;
        let req = tool_turn(NeutralContent::think("t", Some(preserved.into())));
        let body = build_body(&req, &strategy(ModelProvider::MiniMax), true).expect("body");
        let assistant = &body["messages"][1];
        assert_eq!(assistant["reasoning_details"][0]["id"], "r1");
        assert_eq!(assistant["content"], "");
        assert_eq!(body["reasoning_split"], true);

        let req = tool_turn(NeutralContent::think("plain", None));
        let body = build_body(&req, &strategy(ModelProvider::MiniMax), true).expect("body");
        assert_eq!(
            body["messages"][1]["reasoning_details"][0]["format"],
            "MiniMax-response-v1"
        );
    }

    #[test]
    fn blobs_become_data_urls_and_files_are_rejected() {
        let req = request(ModelProvider::OpenAI).with_messages(vec![NeutralMessage::new(
            NeutralRole::User,
            vec![
                NeutralContent::text("look"),
                NeutralContent::FileBlob {
                    media_type: "image/png".into(),
                    bytes: vec![1, 2, 3],
                },
            ],
        )]);
        let body = build_body(&req, &strategy(ModelProvider::OpenAI), true).expect("body");
        assert_eq!(
            body["messages"][0]["content"][1]["image_url"]["url"],
            "data:image/png;base64,AQID"
        );

        let req = request(ModelProvider::OpenAI).with_messages(vec![NeutralMessage::new(
            NeutralRole::User,
            vec![NeutralContent::File {
                file: crate::types::FileRef {
                    id: "f".into(),
                    media_type: None,
                    file_name: None,
                },
            }],
        )]);
        let err = build_body(&req, &strategy(ModelProvider::OpenAI), true).expect_err("file");
        assert!(matches!(err, LlmError::InternalConfigIssue(_)));
    }

    #[test]
    fn qianfan_auth_needs_structured_secret() {
        let client = reqwest::Client::new();
        let key = ModelKey::new(ModelProvider::QianFan)
            .with_secret(r#"{"ApiKey":"k","AppId":"app-1"}"#);
        let qianfan = strategy(ModelProvider::QianFan);
        let built = apply_auth(client.post("http://localhost/x"), &qianfan, &key)
            .expect("auth")
            .build()
            .expect("request");
        assert_eq!(built.headers()["authorization"], "Bearer k");
        assert_eq!(built.headers()["appid"], "app-1");

        let bad = ModelKey::new(ModelProvider::QianFan).with_secret("plain");
        assert!(matches!(
            apply_auth(client.post("http://localhost/x"), &qianfan, &bad),
            Err(LlmError::InternalConfigIssue(_))
        ));
    }
}
