//! Per-provider quirks of the OpenAI chat-completions wire format.
//!
//! Providers that speak chat-completions differ only in a handful of places: auth,
//! where reasoning travels, how effort and web search are requested, and a few
//! response oddities. Each difference is a field here; the request builder and the
//! stream decoder read the record instead of branching on the provider.

use crate::types::{FinishReason, ModelKey, ModelProvider};

/// How credentials are attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer {secret}`
    Bearer,
    /// The secret verbatim in the named header
    Header(&'static str),
    /// Secret is `{"ApiKey": ..., "AppId": ...}`; Bearer key plus an `appid` header
    QianFanAppId,
}

/// How the requested reasoning effort is expressed in the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffortMapping {
    None,
    /// `reasoning_effort: "low" | "medium" | ...`
    Standard,
    /// `enable_thinking: false` for low or minimal effort
    EnableThinkingFlag,
    /// `thinking: {type: "enabled" | "disabled"}` derived from the effort
    ThinkingObject,
    /// `thinking: {type}` enabled exactly when a thinking budget is configured
    ThinkingBudgetToggle,
}

/// How web search is switched on when the model and the config allow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebSearchMapping {
    None,
    /// `web_search: {enable: true, enable_citation: false, enable_trace: false}`
    QianFanWebSearch,
    /// `enable_search: true`
    DashScopeEnableSearch,
    /// `enable_enhancement: true`
    HunyuanEnableEnhancement,
    /// `:online` suffix on the model name
    OpenRouterOnline,
    /// Extra `{type: "web_search"}` tool
    ZhiPuWebSearchTool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxTokensRule {
    /// Sent only when the config sets a limit
    Optional,
    /// Always send the model's maximum; the provider default is too small
    AlwaysModelMax,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostTransform {
    None,
    /// Ensure the host ends with `/openai/v1`
    AzureOpenAiV1,
}

/// Quirks of one chat-completions provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderStrategy {
    pub provider_id: &'static str,
    /// Used when neither the key nor the provider has a host
    pub default_host: Option<&'static str>,
    pub path: &'static str,
    pub auth: AuthScheme,
    /// Delta/message field carrying reasoning. `reasoning_details` holds structured
    /// payloads that are replayed as-is.
    pub reasoning_field: &'static str,
    pub reasoning_effort: EffortMapping,
    pub web_search: WebSearchMapping,
    pub max_tokens: MaxTokensRule,
    /// Replay reasoning on assistant tool-call messages
    pub send_reasoning_back: bool,
    /// Ask for reasoning in a separate field instead of inline markup
    pub reasoning_split: bool,
    pub host_transform: HostTransform,
    /// Non-standard finish reasons and what they mean
    pub finish_reason_aliases: &'static [(&'static str, Option<FinishReason>)],
}

impl ProviderStrategy {
    /// Plain OpenAI chat-completions.
    pub const fn generic(provider_id: &'static str) -> Self {
        Self {
            provider_id,
            default_host: None,
            path: "/chat/completions",
            auth: AuthScheme::Bearer,
            reasoning_field: "reasoning_content",
            reasoning_effort: EffortMapping::Standard,
            web_search: WebSearchMapping::None,
            max_tokens: MaxTokensRule::Optional,
            send_reasoning_back: false,
            reasoning_split: false,
            host_transform: HostTransform::None,
            finish_reason_aliases: &[],
        }
    }

    /// Strategy for a provider that speaks chat-completions natively.
    ///
    /// `None` for providers served by a dedicated adapter (Gemini, Anthropic, Test).
    pub fn for_provider(provider: ModelProvider) -> Option<Self> {
        let base = Self::generic(provider.slug());
        let strategy = match provider {
            ModelProvider::OpenAI
            | ModelProvider::LingYi
            | ModelProvider::Moonshot
            | ModelProvider::Spark
            | ModelProvider::XAI
            | ModelProvider::GithubModels
            | ModelProvider::Ollama
            | ModelProvider::TokenPony => base,
            ModelProvider::AzureAIFoundry => Self {
                host_transform: HostTransform::AzureOpenAiV1,
                ..base
            },
            ModelProvider::QianFan => Self {
                auth: AuthScheme::QianFanAppId,
                web_search: WebSearchMapping::QianFanWebSearch,
                finish_reason_aliases: &[("normal", None)],
                ..base
            },
            ModelProvider::QianWen => Self {
                reasoning_effort: EffortMapping::EnableThinkingFlag,
                web_search: WebSearchMapping::DashScopeEnableSearch,
                ..base
            },
            ModelProvider::HunYuan => Self {
                reasoning_effort: EffortMapping::None,
                web_search: WebSearchMapping::HunyuanEnableEnhancement,
                ..base
            },
            ModelProvider::ZhiPuAI => Self {
                reasoning_effort: EffortMapping::ThinkingObject,
                web_search: WebSearchMapping::ZhiPuWebSearchTool,
                ..base
            },
            ModelProvider::Doubao => Self {
                reasoning_effort: EffortMapping::ThinkingObject,
                ..base
            },
            ModelProvider::DeepSeek => Self {
                reasoning_effort: EffortMapping::None,
                send_reasoning_back: true,
                ..base
            },
            ModelProvider::MiniMax => Self {
                reasoning_field: "reasoning_details",
                reasoning_effort: EffortMapping::None,
                send_reasoning_back: true,
                reasoning_split: true,
                ..base
            },
            ModelProvider::Mimo => Self {
                reasoning_effort: EffortMapping::ThinkingBudgetToggle,
                send_reasoning_back: true,
                ..base
            },
            ModelProvider::SiliconFlow => Self {
                reasoning_effort: EffortMapping::EnableThinkingFlag,
                max_tokens: MaxTokensRule::AlwaysModelMax,
                ..base
            },
            ModelProvider::OpenRouter => Self {
                reasoning_field: "reasoning",
                web_search: WebSearchMapping::OpenRouterOnline,
                ..base
            },
            ModelProvider::GoogleAI | ModelProvider::Anthropic | ModelProvider::Test => {
                return None;
            }
        };
        Some(strategy)
    }

    /// Base URL for `key`: host override, then the provider default, then this
    /// strategy's default; transformed per [`HostTransform`].
    pub fn endpoint(&self, key: &ModelKey) -> Option<String> {
        let host = key
            .endpoint()
            .or_else(|| self.default_host.map(|h| h.trim_end_matches('/').to_string()))?;
        Some(match self.host_transform {
            HostTransform::None => host,
            HostTransform::AzureOpenAiV1 => azure_openai_v1(&host),
        })
    }

    /// Map a wire `finish_reason`, honouring aliases first.
    pub fn finish_reason(&self, value: &str) -> Option<FinishReason> {
        match self.finish_reason_aliases.iter().find(|(alias, _)| *alias == value) {
            Some((_, mapped)) => *mapped,
            None => FinishReason::from_openai(value),
        }
    }

    /// Whether reasoning is replayed as a structured `reasoning_details` array.
    pub fn structured_reasoning(&self) -> bool {
        self.reasoning_field == "reasoning_details"
    }
}

fn azure_openai_v1(host: &str) -> String {
    let trimmed = host.trim_end_matches('/');
    if trimmed.ends_with("/openai/v1") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/openai/v1")
    }
}
