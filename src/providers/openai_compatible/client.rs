//! Chat-completions adapter.

use async_trait::async_trait;
use serde_json::Value;

use super::request::{apply_auth, build_body};
use super::strategy::ProviderStrategy;
use super::stream::{OpenAiChunkDecoder, decode_completion};
use crate::error::LlmError;
use crate::providers::{ChatService, OPENAI_IMAGE_TYPES, error_stream, require_endpoint};
use crate::streaming::{SegmentStream, StreamFactory};
use crate::types::{ChatCompletion, ChatRequest, ModelKey};
use crate::utils::cancel::CancelHandle;

/// OpenAI chat-completions adapter, parameterised by a [`ProviderStrategy`].
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleService {
    client: reqwest::Client,
    strategy: ProviderStrategy,
}

impl OpenAiCompatibleService {
    pub fn new(client: reqwest::Client, strategy: ProviderStrategy) -> Self {
        Self { client, strategy }
    }

    pub fn strategy(&self) -> &ProviderStrategy {
        &self.strategy
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
        let body = build_body(request, &self.strategy, stream)?;
        let mut builder = self.client.post(url).json(&body);
        if stream {
            builder = builder.header(reqwest::header::ACCEPT, "text/event-stream");
        }
        apply_auth(builder, &self.strategy, key)
    }

    fn use_streaming(request: &ChatRequest) -> bool {
        request.model().allow_streaming && request.streamed
    }

    async fn complete(
        &self,
        request: &ChatRequest,
    ) -> Result<Vec<crate::types::ChatSegment>, LlmError> {
        let builder = self.build_request(request, false)?;
        tracing::debug!(provider = self.strategy.provider_id, "sending unary request");
        let root = StreamFactory::send_json(self.strategy.provider_id, builder).await?;
        decode_completion(&self.strategy, &root)
    }
}

#[async_trait]
impl ChatService for OpenAiCompatibleService {
    fn provider_id(&self) -> &'static str {
        self.strategy.provider_id
    }

    fn chat_streamed(&self, request: ChatRequest, _cancel: CancelHandle) -> SegmentStream {
        if !Self::use_streaming(&request) {
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
                OpenAiChunkDecoder::new(self.strategy),
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
        Ok(root
            .get("data")
            .and_then(Value::as_array)
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m.get("id").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn supported_content_types(&self) -> &'static [&'static str] {
        OPENAI_IMAGE_TYPES
    }
}
