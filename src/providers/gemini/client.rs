//! Gemini `generateContent` client.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::request::{build_body, model_path};
use super::stream::GeminiDecoder;
use crate::error::LlmError;
use crate::providers::{ChatService, error_stream, require_secret};
use crate::streaming::{ChunkDecoder, SegmentStream, StreamFactory};
use crate::types::{ChatCompletion, ChatRequest, ChatSegment, ModelKey};
use crate::utils::cancel::CancelHandle;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const PROVIDER_ID: &str = "gemini";

#[derive(Debug, Clone)]
pub struct GeminiService {
    client: reqwest::Client,
}

impl GeminiService {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Native API base. Keys often carry the OpenAI-compatible host, so a trailing
    /// `/openai` is removed.
    pub fn base_url(key: &ModelKey) -> String {
        let host = key.endpoint().unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        host.strip_suffix("/openai").unwrap_or(&host).to_string()
    }

    fn authorized(
        builder: reqwest::RequestBuilder,
        key: &ModelKey,
    ) -> Result<reqwest::RequestBuilder, LlmError> {
        let secret = require_secret(key, PROVIDER_ID)?;
        Ok(builder.header("x-goog-api-key", secret))
    }

    fn build_request(
        &self,
        request: &ChatRequest,
        method: &str,
    ) -> Result<reqwest::RequestBuilder, LlmError> {
        let key = &request.model().key;
        let url = format!(
            "{}/{}:{method}",
            Self::base_url(key),
            model_path(&request.model().deployment_name)
        );
        let body = build_body(request)?;
        Self::authorized(
            self.client
                .post(url)
                .header(reqwest::header::ACCEPT, "application/json")
                .json(&body),
            key,
        )
    }

    async fn complete(&self, request: &ChatRequest) -> Result<Vec<ChatSegment>, LlmError> {
        let builder = self.build_request(request, "generateContent")?;
        let root = StreamFactory::send_json(PROVIDER_ID, builder).await?;
        let mut decoder = GeminiDecoder::new(PROVIDER_ID);
        let mut segments = decoder.decode(root)?;
        segments.extend(decoder.finish()?);
        Ok(segments)
    }
}

#[async_trait]
impl ChatService for GeminiService {
    fn provider_id(&self) -> &'static str {
        PROVIDER_ID
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

        match self.build_request(&request, "streamGenerateContent") {
            Ok(builder) => StreamFactory::json_array_segments(
                PROVIDER_ID,
                builder,
                GeminiDecoder::new(PROVIDER_ID),
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

    /// Model ids without the `models/` prefix.
    async fn list_models(
        &self,
        key: &ModelKey,
        cancel: CancelHandle,
    ) -> Result<Vec<String>, LlmError> {
        let url = format!("{}/models", Self::base_url(key));
        let builder = Self::authorized(self.client.get(url), key)?;
        let root = cancel.run(StreamFactory::send_json(PROVIDER_ID, builder)).await?;
        Ok(root["models"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|m| m["name"].as_str())
            .map(|name| name.strip_prefix("models/").unwrap_or(name).to_string())
            .collect())
    }

    async fn count_tokens(
        &self,
        request: &ChatRequest,
        cancel: CancelHandle,
    ) -> Result<u32, LlmError> {
        let key = &request.model().key;
        let model = model_path(&request.model().deployment_name);
        let url = format!("{}/{model}:countTokens", Self::base_url(key));
        let mut inner = build_body(request)?;
        inner["model"] = json!(model);
        let body = json!({ "generateContentRequest": inner });
        let builder = Self::authorized(self.client.post(url).json(&body), key)?;
        let root = cancel.run(StreamFactory::send_json(PROVIDER_ID, builder)).await?;
        root.get("totalTokens")
            .and_then(Value::as_u64)
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
            .ok_or_else(|| {
                LlmError::MalformedUpstreamPayload(format!(
                    "{PROVIDER_ID}: countTokens response has no totalTokens"
                ))
            })
    }
}
