//! Messages API client.

use async_trait::async_trait;
use serde_json::Value;

use super::request::{build_body, build_count_tokens_body};
use super::stream::{AnthropicStreamState, decode_message};
use crate::error::LlmError;
use crate::providers::{ChatService, OPENAI_IMAGE_TYPES, error_stream, require_secret};
use crate::streaming::{SegmentStream, StreamFactory};
use crate::types::{ChatCompletion, ChatRequest, ChatSegment, ModelKey, ModelProvider};
use crate::utils::cancel::CancelHandle;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
const CODE_EXECUTION_BETA: &str = "code-execution-2025-08-25";

/// Where a Messages-compatible API lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnthropicHost {
    pub provider_id: &'static str,
    /// Base URL when the key has no host override
    pub default_base: &'static str,
}

impl AnthropicHost {
    pub const ANTHROPIC: Self = Self {
        provider_id: "anthropic",
        default_base: "https://api.anthropic.com",
    };
    pub const DEEPSEEK: Self = Self {
        provider_id: "deepseek",
        default_base: "https://api.deepseek.com/anthropic",
    };
    pub const MINIMAX: Self = Self {
        provider_id: "minimax",
        default_base: "https://api.minimaxi.com/anthropic",
    };

    pub fn for_provider(provider: ModelProvider) -> Option<Self> {
        match provider {
            ModelProvider::Anthropic => Some(Self::ANTHROPIC),
            ModelProvider::DeepSeek => Some(Self::DEEPSEEK),
            ModelProvider::MiniMax => Some(Self::MINIMAX),
            _ => None,
        }
    }

    /// Host override from the key, else this host's default base.
    pub fn base_url(&self, key: &ModelKey) -> String {
        key.host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .unwrap_or(self.default_base)
            .trim_end_matches('/')
            .to_string()
    }
}

#[derive(Debug, Clone)]
pub struct AnthropicService {
    client: reqwest::Client,
    host: AnthropicHost,
}

impl AnthropicService {
    pub fn new(client: reqwest::Client, host: AnthropicHost) -> Self {
        Self { client, host }
    }

    fn authorized(
        &self,
        builder: reqwest::RequestBuilder,
        key: &ModelKey,
    ) -> Result<reqwest::RequestBuilder, LlmError> {
        let secret = require_secret(key, self.host.provider_id)?;
        Ok(builder
            .header("x-api-key", secret)
            .header("anthropic-version", ANTHROPIC_VERSION))
    }

    fn build_request(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<reqwest::RequestBuilder, LlmError> {
        let key = &request.model().key;
        let url = format!("{}/v1/messages", self.host.base_url(key));
        let body = build_body(request, stream)?;
        let mut builder = self.authorized(self.client.post(url).json(&body), key)?;
        if stream {
            builder = builder.header(reqwest::header::ACCEPT, "text/event-stream");
        }
        if request.chat_config.code_execution_enabled && request.model().allow_code_execution {
            builder = builder.header("anthropic-beta", CODE_EXECUTION_BETA);
        }
        Ok(builder)
    }

    async fn complete(&self, request: &ChatRequest) -> Result<Vec<ChatSegment>, LlmError> {
        let builder = self.build_request(request, false)?;
        let message = StreamFactory::send_json(self.host.provider_id, builder).await?;
        decode_message(self.host.provider_id, &message)
    }
}

#[async_trait]
impl ChatService for AnthropicService {
    fn provider_id(&self) -> &'static str {
        self.host.provider_id
    }

    fn chat_streamed(&self, request: ChatRequest, _cancel: CancelHandle) -> SegmentStream {
        if !(request.model().allow_streaming && request.streamed) {
            let service = self.clone();
            return Box::pin(async_stream::stream! {
                match service.complete(&request).await {
                    Ok(segments) => {
                        for segment in segments {
                            yield Ok(segment);
                        }
                    }
                    Err(e) => yield Err(e),
                }
            });
        }

        match self.build_request(&request, true) {
            Ok(builder) => StreamFactory::sse_segments(
                self.host.provider_id,
                builder,
                AnthropicStreamState::new(self.host.provider_id),
            ),
            Err(e) => error_stream(e),
        }
    }

    async fn chat(
        &self,
        request: ChatRequest,
        cancel: CancelHandle,
    ) -> Result<ChatCompletion, LlmError> {
        let request = request.with_streamed(false);
        let segments = cancel.run(self.complete(&request)).await?;
        Ok(ChatCompletion::from_segments(segments))
    }

    async fn list_models(
        &self,
        key: &ModelKey,
        cancel: CancelHandle,
    ) -> Result<Vec<String>, LlmError> {
        let url = format!("{}/v1/models", self.host.base_url(key));
        let builder = self.authorized(self.client.get(url), key)?;
        let root = cancel
            .run(StreamFactory::send_json(self.host.provider_id, builder))
            .await?;
        Ok(root["data"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|m| m.get("id").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    async fn count_tokens(
        &self,
        request: &ChatRequest,
        cancel: CancelHandle,
    ) -> Result<u32, LlmError> {
        let key = &request.model().key;
        let url = format!("{}/v1/messages/count_tokens", self.host.base_url(key));
        let body = build_count_tokens_body(request)?;
        let builder = self.authorized(self.client.post(url).json(&body), key)?;
        let root = cancel
            .run(StreamFactory::send_json(self.host.provider_id, builder))
            .await?;
        root["input_tokens"]
            .as_u64()
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
            .ok_or_else(|| {
                LlmError::MalformedUpstreamPayload(format!(
                    "{}: count_tokens response has no input_tokens",
                    self.host.provider_id
                ))
            })
    }

    fn supported_content_types(&self) -> &'static [&'static str] {
        OPENAI_IMAGE_TYPES
    }
}
