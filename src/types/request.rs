//! Chat request and generation parameters.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::{NeutralMessage, NeutralSystemMessage};
use super::model::Model;

/// Requested reasoning depth.
///
/// Variants are ordered from least to most effort so clamping can compare them.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    /// Let the provider decide; nothing is sent upstream
    #[default]
    Default,
    Minimal,
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn id(self) -> u8 {
        match self {
            Self::Default => 0,
            Self::Minimal => 1,
            Self::Low => 2,
            Self::Medium => 3,
            Self::High => 4,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Default),
            1 => Some(Self::Minimal),
            2 => Some(Self::Low),
            3 => Some(Self::Medium),
            4 => Some(Self::High),
            _ => None,
        }
    }

    pub fn is_low_or_minimal(self) -> bool {
        matches!(self, Self::Low | Self::Minimal)
    }

    /// Wire value for OpenAI-style `reasoning_effort`; `None` for `Default`.
    pub fn as_wire_str(self) -> Option<&'static str> {
        match self {
            Self::Default => None,
            Self::Minimal => Some("minimal"),
            Self::Low => Some("low"),
            Self::Medium => Some("medium"),
            Self::High => Some("high"),
        }
    }
}

/// Where the turn originated. Web-only pre-processing runs for [`RequestSource::WebChat`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestSource {
    #[default]
    WebChat,
    Api,
    Validate,
}

/// A function the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema of the arguments
    #[serde(default)]
    pub parameters: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

impl ChatTool {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            parameters,
            strict: None,
        }
    }
}

/// Structured output format requested by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextFormat {
    Text,
    JsonObject,
    JsonSchema {
        name: String,
        schema: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        strict: Option<bool>,
    },
}

impl TextFormat {
    /// OpenAI chat-completions `response_format` object.
    pub fn to_openai_value(&self) -> Value {
        match self {
            Self::Text => serde_json::json!({ "type": "text" }),
            Self::JsonObject => serde_json::json!({ "type": "json_object" }),
            Self::JsonSchema {
                name,
                schema,
                strict,
            } => {
                let mut json_schema = serde_json::json!({ "name": name, "schema": schema });
                if let Some(strict) = strict {
                    json_schema["strict"] = Value::Bool(*strict);
                }
                serde_json::json!({ "type": "json_schema", "json_schema": json_schema })
            }
        }
    }
}

/// Generation parameters for one turn.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub model: Model,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub reasoning_effort: ReasoningEffort,
    pub max_output_tokens: Option<u32>,
    pub web_search_enabled: bool,
    pub code_execution_enabled: bool,
    pub thinking_budget: Option<u32>,
    pub image_size: Option<String>,
}

/// Identity used to deduplicate stored configs.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfigKey {
    pub hash: u64,
    pub model_id: i32,
    pub system_prompt: Option<String>,
    pub web_search_enabled: bool,
    pub reasoning_effort: ReasoningEffort,
    pub temperature: Option<f32>,
}

impl ChatConfig {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            system_prompt: None,
            temperature: None,
            reasoning_effort: ReasoningEffort::Default,
            max_output_tokens: None,
            web_search_enabled: false,
            code_execution_enabled: false,
            thinking_budget: None,
            image_size: None,
        }
    }

    pub fn with_system_prompt(&self, system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: Some(system_prompt.into()),
            ..self.clone()
        }
    }

    pub fn with_clamps(&self, temperature: Option<f32>, reasoning_effort: ReasoningEffort) -> Self {
        Self {
            temperature,
            reasoning_effort,
            ..self.clone()
        }
    }

    /// Stable dedup key. `None` and empty system prompts hash identically.
    pub fn dedup_key(&self) -> ChatConfigKey {
        let mut h = Fnv1a64::new();
        h.field(&self.model.id.to_le_bytes());

        let prompt = self.system_prompt.as_deref().unwrap_or_default();
        h.field(&(prompt.len() as u32).to_le_bytes());
        if !prompt.is_empty() {
            h.field(prompt.as_bytes());
        }

        match self.temperature {
            Some(t) => {
                h.write(&[1]);
                h.field(&t.to_bits().to_le_bytes());
            }
            None => h.write(&[0]),
        }

        h.field(&[u8::from(self.web_search_enabled)]);

        match self.max_output_tokens {
            Some(m) => {
                h.write(&[1]);
                h.field(&m.to_le_bytes());
            }
            None => h.write(&[0]),
        }

        h.field(&[self.reasoning_effort.id()]);

        if let Some(size) = self.image_size.as_deref().filter(|s| !s.is_empty()) {
            h.field(size.as_bytes());
        }

        ChatConfigKey {
            hash: h.finish(),
            model_id: self.model.id,
            system_prompt: self.system_prompt.clone(),
            web_search_enabled: self.web_search_enabled,
            reasoning_effort: self.reasoning_effort,
            temperature: self.temperature,
        }
    }
}

struct Fnv1a64(u64);

impl Fnv1a64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    fn new() -> Self {
        Self(Self::OFFSET)
    }

    fn write(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.0 ^= u64::from(*b);
            self.0 = self.0.wrapping_mul(Self::PRIME);
        }
    }

    fn field(&mut self, bytes: &[u8]) {
        self.write(bytes);
        self.write(b"|");
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

/// A provider-agnostic chat request.
///
/// Adapters never mutate a request; the `with_*` helpers return derived copies.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<NeutralMessage>,
    /// Takes precedence over `chat_config.system_prompt` when set
    pub system: Option<NeutralSystemMessage>,
    pub chat_config: ChatConfig,
    pub tools: Vec<ChatTool>,
    pub streamed: bool,
    pub top_p: Option<f32>,
    pub seed: Option<i64>,
    pub allow_parallel_tool_calls: Option<bool>,
    pub end_user_id: Option<String>,
    pub source: RequestSource,
    pub text_format: Option<TextFormat>,
    /// Emit running usage estimates until the provider reports its own counts
    pub estimate_usage: bool,
}

impl ChatRequest {
    pub fn new(messages: Vec<NeutralMessage>, chat_config: ChatConfig) -> Self {
        Self {
            messages,
            system: None,
            chat_config,
            tools: Vec::new(),
            streamed: true,
            top_p: None,
            seed: None,
            allow_parallel_tool_calls: None,
            end_user_id: None,
            source: RequestSource::Api,
            text_format: None,
            estimate_usage: false,
        }
    }

    /// One user prompt against `model`, as used by model validation.
    pub fn simple(prompt: impl Into<String>, model: Model) -> Self {
        Self::new(vec![NeutralMessage::user(prompt)], ChatConfig::new(model))
    }

    pub fn effective_system_prompt(&self) -> Option<String> {
        match &self.system {
            Some(system) => Some(system.text()),
            None => self.chat_config.system_prompt.clone(),
        }
    }

    pub fn model(&self) -> &Model {
        &self.chat_config.model
    }

    pub fn has_tool_call(&self) -> bool {
        self.messages.iter().any(NeutralMessage::has_tool_call)
    }

    pub fn with_messages(&self, messages: Vec<NeutralMessage>) -> Self {
        Self {
            messages,
            ..self.clone()
        }
    }

    pub fn with_system(&self, system: Option<NeutralSystemMessage>) -> Self {
        Self {
            system,
            ..self.clone()
        }
    }

    pub fn with_chat_config(&self, chat_config: ChatConfig) -> Self {
        Self {
            chat_config,
            ..self.clone()
        }
    }

    pub fn with_tools(mut self, tools: Vec<ChatTool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_streamed(mut self, streamed: bool) -> Self {
        self.streamed = streamed;
        self
    }

    pub fn with_source(mut self, source: RequestSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_estimated_usage(mut self, estimate_usage: bool) -> Self {
        self.estimate_usage = estimate_usage;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ApiType, ModelProvider};

    fn config() -> ChatConfig {
        ChatConfig::new(Model::new(1, "gpt", ModelProvider::OpenAI, ApiType::ChatCompletion))
    }

    #[test]
    fn identical_configs_share_a_key() {
        let mut a = config();
        a.system_prompt = Some("Hello, world!".into());
        a.temperature = Some(0.5);
        a.web_search_enabled = true;
        a.max_output_tokens = Some(100);
        a.reasoning_effort = ReasoningEffort::Low;
        let b = a.clone();
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn every_field_changes_the_hash() {
        let base = config().dedup_key().hash;

        let mut c = config();
        c.model.id = 2;
        assert_ne!(c.dedup_key().hash, base);

        let mut c = config();
        c.temperature = Some(0.5);
        assert_ne!(c.dedup_key().hash, base);

        let mut c = config();
        c.web_search_enabled = true;
        assert_ne!(c.dedup_key().hash, base);

        let mut c = config();
        c.max_output_tokens = Some(100);
        assert_ne!(c.dedup_key().hash, base);

        let mut c = config();
        c.reasoning_effort = ReasoningEffort::Minimal;
        assert_ne!(c.dedup_key().hash, base);
    }

    #[test]
    fn null_and_empty_system_prompt_hash_alike() {
        let mut a = config();
        a.system_prompt = None;
        let mut b = config();
        b.system_prompt = Some(String::new());
        assert_eq!(a.dedup_key().hash, b.dedup_key().hash);
    }

    #[test]
    fn system_message_wins_over_config_prompt() {
        let mut request = ChatRequest::simple("hi", config().model);
        request.chat_config.system_prompt = Some("from config".into());
        assert_eq!(
            request.effective_system_prompt().as_deref(),
            Some("from config")
        );

        let derived = request.with_system(Some(NeutralSystemMessage::from_text("from system")));
        assert_eq!(
            derived.effective_system_prompt().as_deref(),
            Some("from system")
        );
        // the original is untouched
        assert!(request.system.is_none());
    }

    #[test]
    fn effort_ordering_supports_clamping() {
        assert!(ReasoningEffort::Minimal < ReasoningEffort::High);
        assert_eq!(ReasoningEffort::from_id(3), Some(ReasoningEffort::Medium));
        assert_eq!(ReasoningEffort::Default.as_wire_str(), None);
    }

    #[test]
    fn json_schema_format_maps_to_openai_shape() {
        let format = TextFormat::JsonSchema {
            name: "answer".into(),
            schema: serde_json::json!({"type": "object"}),
            strict: Some(true),
        };
        let value = format.to_openai_value();
        assert_eq!(value["type"], "json_schema");
        assert_eq!(value["json_schema"]["name"], "answer");
        assert_eq!(value["json_schema"]["strict"], true);
    }
}
