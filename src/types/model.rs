//! Provider, API type and model configuration.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::request::ReasoningEffort;

/// Known upstream providers. The numeric ids are stable and persisted by hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelProvider {
    Test,
    AzureAIFoundry,
    HunYuan,
    LingYi,
    Moonshot,
    OpenAI,
    QianFan,
    QianWen,
    Spark,
    ZhiPuAI,
    DeepSeek,
    XAI,
    GithubModels,
    GoogleAI,
    Ollama,
    MiniMax,
    Doubao,
    SiliconFlow,
    OpenRouter,
    TokenPony,
    Anthropic,
    Mimo,
}

impl ModelProvider {
    pub const ALL: [ModelProvider; 22] = [
        Self::Test,
        Self::AzureAIFoundry,
        Self::HunYuan,
        Self::LingYi,
        Self::Moonshot,
        Self::OpenAI,
        Self::QianFan,
        Self::QianWen,
        Self::Spark,
        Self::ZhiPuAI,
        Self::DeepSeek,
        Self::XAI,
        Self::GithubModels,
        Self::GoogleAI,
        Self::Ollama,
        Self::MiniMax,
        Self::Doubao,
        Self::SiliconFlow,
        Self::OpenRouter,
        Self::TokenPony,
        Self::Anthropic,
        Self::Mimo,
    ];

    pub fn id(self) -> u16 {
        // ALL is listed in id order
        Self::ALL.iter().position(|p| *p == self).unwrap_or_default() as u16
    }

    pub fn from_id(id: u16) -> Option<Self> {
        Self::ALL.get(usize::from(id)).copied()
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Test => "Test",
            Self::AzureAIFoundry => "Azure AI Foundry",
            Self::HunYuan => "Tencent Hunyuan",
            Self::LingYi => "01.ai",
            Self::Moonshot => "Moonshot",
            Self::OpenAI => "OpenAI",
            Self::QianFan => "Wenxin Qianfan",
            Self::QianWen => "DashScope",
            Self::Spark => "Xunfei SparkDesk",
            Self::ZhiPuAI => "Zhipu AI",
            Self::DeepSeek => "DeepSeek",
            Self::XAI => "x.ai",
            Self::GithubModels => "Github Models",
            Self::GoogleAI => "Google AI",
            Self::Ollama => "Ollama",
            Self::MiniMax => "MiniMax",
            Self::Doubao => "Doubao",
            Self::SiliconFlow => "SiliconFlow",
            Self::OpenRouter => "OpenRouter",
            Self::TokenPony => "Token Pony",
            Self::Anthropic => "Anthropic",
            Self::Mimo => "Xiaomi MiMo",
        }
    }

    /// Lowercase identifier used in logs and error messages.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::AzureAIFoundry => "azure",
            Self::HunYuan => "hunyuan",
            Self::LingYi => "lingyi",
            Self::Moonshot => "moonshot",
            Self::OpenAI => "openai",
            Self::QianFan => "qianfan",
            Self::QianWen => "qianwen",
            Self::Spark => "spark",
            Self::ZhiPuAI => "zhipu",
            Self::DeepSeek => "deepseek",
            Self::XAI => "xai",
            Self::GithubModels => "github",
            Self::GoogleAI => "gemini",
            Self::Ollama => "ollama",
            Self::MiniMax => "minimax",
            Self::Doubao => "doubao",
            Self::SiliconFlow => "siliconflow",
            Self::OpenRouter => "openrouter",
            Self::TokenPony => "tokenpony",
            Self::Anthropic => "anthropic",
            Self::Mimo => "mimo",
        }
    }

    /// Well-known base URL used when the key has no host override.
    pub fn default_host(self) -> Option<&'static str> {
        match self {
            Self::Test => None,
            Self::AzureAIFoundry => Some("https://yourresource.openai.azure.com/openai/v1"),
            Self::HunYuan => Some("https://api.hunyuan.cloud.tencent.com/v1"),
            Self::LingYi => Some("https://api.lingyiwanwu.com/v1"),
            Self::Moonshot => Some("https://api.moonshot.cn/v1"),
            Self::OpenAI => Some("https://api.openai.com/v1"),
            Self::QianFan => Some("https://qianfan.baidubce.com/v2"),
            Self::QianWen => Some("https://dashscope.aliyuncs.com/compatible-mode/v1"),
            Self::Spark => Some("https://spark-api-open.xf-yun.com/v1"),
            Self::ZhiPuAI => Some("https://open.bigmodel.cn/api/paas/v4"),
            Self::DeepSeek => Some("https://api.deepseek.com/v1"),
            Self::XAI => Some("https://api.x.ai/v1"),
            Self::GithubModels => Some("https://models.github.ai/inference"),
            Self::GoogleAI => Some("https://generativelanguage.googleapis.com/v1beta/openai"),
            Self::Ollama => Some("http://localhost:11434/v1"),
            Self::MiniMax => Some("https://api.minimax.chat/v1"),
            Self::Doubao => Some("https://ark.cn-beijing.volces.com/api/v3"),
            Self::SiliconFlow => Some("https://api.siliconflow.cn/v1"),
            Self::OpenRouter => Some("https://openrouter.ai/api/v1"),
            Self::TokenPony => Some("https://api.tokenpony.cn/v1"),
            Self::Anthropic => Some("https://api.anthropic.com"),
            Self::Mimo => Some("https://api.xiaomimimo.com/v1"),
        }
    }
}

/// Wire family a model is served through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApiType {
    #[default]
    ChatCompletion,
    Response,
    ImageGeneration,
    AnthropicMessages,
}

impl ApiType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChatCompletion => "ChatCompletion",
            Self::Response => "Response",
            Self::ImageGeneration => "ImageGeneration",
            Self::AnthropicMessages => "AnthropicMessages",
        }
    }
}

impl std::fmt::Display for ApiType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credentials and endpoint for one provider account.
#[derive(Debug, Clone)]
pub struct ModelKey {
    pub id: i32,
    pub provider: ModelProvider,
    pub host: Option<String>,
    pub secret: Option<SecretString>,
}

impl ModelKey {
    pub fn new(provider: ModelProvider) -> Self {
        Self {
            id: 0,
            provider,
            host: None,
            secret: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(SecretString::from(secret.into()));
        self
    }

    /// Host override with the trailing `/` trimmed, else the provider default.
    pub fn endpoint(&self) -> Option<String> {
        self.host
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .or(self.provider.default_host())
            .map(|h| h.trim_end_matches('/').to_string())
    }

    pub fn secret_str(&self) -> Option<&str> {
        self.secret
            .as_ref()
            .map(|s| s.expose_secret())
            .filter(|s| !s.is_empty())
    }
}

/// Static facts about a model family.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelReference {
    pub name: String,
    /// Tokenizer encoding name, e.g. `cl100k_base`
    #[serde(default)]
    pub tokenizer: Option<String>,
    #[serde(default)]
    pub context_window: u32,
}

/// How a model returns its reasoning, if at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReasoningResponseKind {
    #[default]
    NoReasoning,
    /// Separate reasoning channel (reasoning_content, thinking blocks, thought parts)
    Native,
    /// Inline `<think>` markup in the text
    ThinkTag,
}

/// A configured, callable model.
#[derive(Debug, Clone)]
pub struct Model {
    pub id: i32,
    pub name: String,
    /// Upstream model name sent on the wire
    pub deployment_name: String,
    pub api_type: ApiType,
    pub key: ModelKey,
    pub reference: ModelReference,
    pub allow_streaming: bool,
    pub allow_vision: bool,
    pub supports_vision_link: bool,
    pub allow_search: bool,
    pub allow_code_execution: bool,
    pub think_tag_parser_enabled: bool,
    pub max_response_tokens: Option<u32>,
    pub use_max_completion_tokens: bool,
    pub min_temperature: f32,
    pub max_temperature: f32,
    pub min_reasoning_effort: ReasoningEffort,
    pub max_reasoning_effort: ReasoningEffort,
    pub reasoning_response_kind: ReasoningResponseKind,
}

impl Model {
    pub fn new(
        id: i32,
        deployment_name: impl Into<String>,
        provider: ModelProvider,
        api_type: ApiType,
    ) -> Self {
        let deployment_name = deployment_name.into();
        Self {
            id,
            name: deployment_name.clone(),
            reference: ModelReference {
                name: deployment_name.clone(),
                ..Default::default()
            },
            deployment_name,
            api_type,
            key: ModelKey::new(provider),
            allow_streaming: true,
            allow_vision: true,
            supports_vision_link: true,
            allow_search: false,
            allow_code_execution: false,
            think_tag_parser_enabled: false,
            max_response_tokens: None,
            use_max_completion_tokens: false,
            min_temperature: 0.0,
            max_temperature: 2.0,
            min_reasoning_effort: ReasoningEffort::Default,
            max_reasoning_effort: ReasoningEffort::High,
            reasoning_response_kind: ReasoningResponseKind::NoReasoning,
        }
    }

    pub fn with_key(mut self, key: ModelKey) -> Self {
        self.key = key;
        self
    }

    pub fn provider(&self) -> ModelProvider {
        self.key.provider
    }

    pub fn supports_reasoning(&self) -> bool {
        self.reasoning_response_kind != ReasoningResponseKind::NoReasoning
    }

    pub fn clamp_temperature(&self, temperature: Option<f32>) -> Option<f32> {
        let max = self.max_temperature.max(self.min_temperature);
        temperature.map(|t| t.clamp(self.min_temperature, max))
    }

    /// `Default` is passed through; explicit efforts are clamped into the model's range.
    pub fn clamp_reasoning_effort(&self, effort: ReasoningEffort) -> ReasoningEffort {
        if effort == ReasoningEffort::Default
            || self.max_reasoning_effort == ReasoningEffort::Default
        {
            return ReasoningEffort::Default;
        }
        let min = self.min_reasoning_effort.max(ReasoningEffort::Minimal);
        effort.clamp(min, self.max_reasoning_effort.max(min))
    }
}
