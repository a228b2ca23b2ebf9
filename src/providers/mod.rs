//! Provider adapters
//!
//! Every adapter implements [`ChatService`]: it turns a neutral [`ChatRequest`] into one
//! upstream HTTP request and decodes the response into a [`SegmentStream`]. Credentials
//! and endpoint come from the request's model key, so one adapter instance serves every
//! account of its provider.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;

use crate::error::LlmError;
use crate::streaming::{SegmentStream, apply_think_tag_parser, with_usage_accounting};
use crate::tokenizer::{TiktokenCounter, estimate_prompt_tokens};
use crate::types::{ChatCompletion, ChatRequest, Model, ModelKey, RequestSource};
use crate::utils::cancel::{CancelHandle, make_cancellable_stream};

pub mod anthropic;
pub mod file_url;
pub mod gemini;
pub mod image_generation;
pub mod openai_compatible;
pub mod openai_responses;
pub mod preprocess;

pub use file_url::{FileUrlProvider, HttpFileUrlProvider};
pub use preprocess::preprocess;

/// Prompt sent by [`ChatService::validate_model`].
pub const VALIDATE_PROMPT: &str = "1+1=?";

/// Media types accepted by OpenAI-style vision inputs.
pub const OPENAI_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

/// Outcome of a model validation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidateResult {
    pub is_success: bool,
    pub error_message: Option<String>,
}

impl ValidateResult {
    pub fn success() -> Self {
        Self {
            is_success: true,
            error_message: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            is_success: false,
            error_message: Some(message.into()),
        }
    }
}

/// A chat provider adapter.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Identifier used in logs and upstream errors.
    fn provider_id(&self) -> &'static str;

    /// Stream one turn.
    ///
    /// The returned stream is lazy: the HTTP request is sent on first poll, and each
    /// segment is yielded as soon as it is decoded. Exactly one upstream request is made.
    fn chat_streamed(&self, request: ChatRequest, cancel: CancelHandle) -> SegmentStream;

    /// Run one turn to completion.
    ///
    /// Adapters with a unary path take it when the request is not streamed; the result is
    /// the same merged segment bundle either way.
    async fn chat(
        &self,
        request: ChatRequest,
        cancel: CancelHandle,
    ) -> Result<ChatCompletion, LlmError> {
        let stream = self.chat_streamed(request.with_streamed(false), cancel.clone());
        let mut stream = make_cancellable_stream(stream, &cancel);
        let mut segments = Vec::new();
        while let Some(item) = stream.next().await {
            segments.push(item?);
        }
        cancel.check()?;
        Ok(ChatCompletion::from_segments(segments))
    }

    /// Model ids visible to `key`.
    async fn list_models(
        &self,
        _key: &ModelKey,
        _cancel: CancelHandle,
    ) -> Result<Vec<String>, LlmError> {
        Ok(Vec::new())
    }

    /// Prompt token count. Adapters with a native counting endpoint override this.
    async fn count_tokens(
        &self,
        request: &ChatRequest,
        _cancel: CancelHandle,
    ) -> Result<u32, LlmError> {
        let counter = TiktokenCounter::for_reference(&request.model().reference);
        Ok(estimate_prompt_tokens(request, &counter))
    }

    /// Media types this adapter accepts for inline images. `"*"` accepts anything.
    fn supported_content_types(&self) -> &'static [&'static str] {
        &["*"]
    }

    /// Pre-process `request`, stream it, and split inline think markup when the model
    /// is configured for it.
    ///
    /// With [`ChatRequest::estimate_usage`] set, the stream opens with the estimated
    /// prompt usage and carries refreshed output estimates until the provider reports
    /// usage itself.
    async fn chat_entry(
        &self,
        request: ChatRequest,
        files: Arc<dyn FileUrlProvider>,
        cancel: CancelHandle,
    ) -> Result<SegmentStream, LlmError> {
        let prepared = cancel
            .run(preprocess(
                &request,
                self.supported_content_types(),
                files.as_ref(),
            ))
            .await?;

        let parse_think_tags = prepared.model().think_tag_parser_enabled;
        let usage_counter = prepared.estimate_usage.then(|| {
            let counter = TiktokenCounter::for_reference(&prepared.model().reference);
            (estimate_prompt_tokens(&prepared, &counter), counter)
        });
        let mut stream = self.chat_streamed(prepared, cancel.clone());
        if parse_think_tags {
            stream = apply_think_tag_parser(stream);
        }
        if let Some((input_tokens, counter)) = usage_counter {
            stream = with_usage_accounting(stream, input_tokens, Arc::new(counter));
        }
        Ok(make_cancellable_stream(stream, &cancel))
    }

    /// Send a trivial prompt and report whether the model answers.
    ///
    /// Succeeds on the first upstream segment; the rest of the answer is not read.
    async fn validate_model(
        &self,
        model: Model,
        files: Arc<dyn FileUrlProvider>,
        cancel: CancelHandle,
    ) -> ValidateResult {
        let model_name = model.name.clone();
        let request =
            ChatRequest::simple(VALIDATE_PROMPT, model).with_source(RequestSource::Validate);

        let first = match self.chat_entry(request, files, cancel).await {
            Ok(mut stream) => stream.next().await,
            Err(e) => Some(Err(e)),
        };

        match first {
            Some(Ok(_)) | None => ValidateResult::success(),
            Some(Err(e)) => {
                tracing::info!(
                    provider = self.provider_id(),
                    model = %model_name,
                    error = %e,
                    "model validation failed"
                );
                ValidateResult::fail(e.to_string())
            }
        }
    }
}

/// Bearer token from the key, or [`LlmError::InternalConfigIssue`] when it has none.
pub(crate) fn require_secret<'a>(
    key: &'a ModelKey,
    provider_id: &str,
) -> Result<&'a str, LlmError> {
    key.secret_str().ok_or_else(|| {
        LlmError::InternalConfigIssue(format!("{provider_id}: model key has no API secret"))
    })
}

/// Endpoint from the key, or [`LlmError::InternalConfigIssue`] when the provider has no
/// default host.
pub(crate) fn require_endpoint(key: &ModelKey, provider_id: &str) -> Result<String, LlmError> {
    key.endpoint().ok_or_else(|| {
        LlmError::InternalConfigIssue(format!("{provider_id}: model key has no host"))
    })
}

/// JSON number for an `f32` parameter, keeping its shortest decimal form (0.7, not
/// 0.699999988079071).
pub(crate) fn float_value(value: f32) -> serde_json::Value {
    let widened = value.to_string().parse::<f64>().unwrap_or(f64::from(value));
    serde_json::Number::from_f64(widened).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

/// Single-item stream carrying `err`, for failures detected before any I/O.
pub(crate) fn error_stream(err: LlmError) -> SegmentStream {
    Box::pin(futures::stream::once(async move { Err(err) }))
}
