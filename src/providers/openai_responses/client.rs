//! Responses API client.

use async_trait::async_trait;
use serde_json::Value;

use super::request::build_body;
use super::stream::{ResponsesDecoder, decode_response};
use crate::error::LlmError;
use crate::providers::openai_compatible::request::apply_auth;
use crate::providers::openai_compatible::{AuthScheme, ProviderStrategy};
use crate::providers::{ChatService, OPENAI_IMAGE_TYPES, error_stream, require_endpoint};
use crate::streaming::{SegmentStream, StreamFactory};
use crate::types::{ChatCompletion, ChatRequest, ChatSegment, ModelKey, ModelProvider};
use crate::utils::cancel::CancelHandle;

#[derive(Debug, Clone)]
pub struct ResponsesService {
    client: reqwest::Client,
    strategy: ProviderStrategy,
}

impl ResponsesService {
    /// Azure accepts its key in `api-key`; everything else uses Bearer.
    pub fn new(client: reqwest::Client, provider: ModelProvider) -> Self {
        let mut strategy = ProviderStrategy::for_provider(provider)
            .unwrap_or_else(|| ProviderStrategy::generic(provider.slug()));
        strategy.path = "/responses";
        if provider == ModelProvider::AzureAIFoundry {
            strategy.auth = AuthScheme::Header("api-key");
        }
        Self { client, strategy }
    }

    fn endpoint(&self, key: &ModelKey) -> Result<String, LlmError> {
        match self.strategy.endpoint(key) {
            Some(endpoint) => Ok(endpoint),
            None => require_endpoint(key, self.strategy.provider_id),
        }
    }

    fn build_request(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<reqwest::RequestBuilder, LlmError> {
        let key = &request.model().key;
        let url = format!("{}{}", self.endpoint(key)?, self.strategy.path);
        let body = build_body(request, stream)?;
        let mut builder = self.client.post(url).json(&body);
        if stream {
            builder = builder.header(reqwest::header::ACCEPT, "text/event-stream");
        }
        apply_auth(builder, &self.strategy, key)
    }

    async fn complete(&self, request: &ChatRequest) -> Result<Vec<ChatSegment>, LlmError> {
        let builder = self.build_request(request, false)?;
        let root = StreamFactory::send_json(self.strategy.provider_id, builder).await?;
        decode_response(self.strategy.provider_id, &root)
    }
}

#[async_trait]
impl ChatService for ResponsesService {
    fn provider_id(&self) -> &'static str {
        self.strategy.provider_id
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
                self.strategy.provider_id,
                builder,
                ResponsesDecoder::new(self.strategy.provider_id),
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
        let url = format!("{}/models", self.endpoint(key)?);
        let builder = apply_auth(self.client.get(url), &self.strategy, key)?;
        let root = cancel
            .run(StreamFactory::send_json(self.strategy.provider_id, builder))
            .await?;
        Ok(root["data"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|m| m.get("id").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    fn supported_content_types(&self) -> &'static [&'static str] {
        OPENAI_IMAGE_TYPES
    }
}
