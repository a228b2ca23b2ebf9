//! OpenAI image generation adapter.
//!
//! The prompt is the last text part of the last user message. Images in that message
//! (or, failing that, the most recent image anywhere in the conversation) turn the
//! call into an edit, sent as multipart form data.

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::error::LlmError;
use crate::providers::openai_compatible::request::apply_auth;
use crate::providers::openai_compatible::{AuthScheme, ProviderStrategy};
use crate::providers::{ChatService, OPENAI_IMAGE_TYPES, require_endpoint};
use crate::streaming::{ChunkDecoder, SegmentStream, StreamFactory};
use crate::types::{
    ChatCompletion, ChatRequest, ChatSegment, ChatTokenUsage, FinishReason, ModelKey,
    ModelProvider, NeutralContent, NeutralMessage, NeutralRole, ReasoningEffort,
};
use crate::utils::cancel::CancelHandle;
use crate::utils::mime::{file_name_for, image_format_media_type, resolve_media_type};

/// Number of partial previews requested while streaming.
pub const PARTIAL_IMAGES: u32 = 3;

#[derive(Debug, Clone)]
pub struct ImageGenerationService {
    client: reqwest::Client,
    strategy: ProviderStrategy,
}

/// Image input for an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EditImage {
    Url(String),
    Blob { media_type: String, bytes: Vec<u8> },
}

impl ImageGenerationService {
    pub fn new(client: reqwest::Client, provider: ModelProvider) -> Self {
        let mut strategy = ProviderStrategy::for_provider(provider)
            .unwrap_or_else(|| ProviderStrategy::generic(provider.slug()));
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

    async fn build_request(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<reqwest::RequestBuilder, LlmError> {
        let key = &request.model().key;
        let prompt = prompt_of(&request.messages)?;
        let images = edit_images(&request.messages);
        let endpoint = self.endpoint(key)?;

        let mut builder = if images.is_empty() {
            let body = generation_body(request, prompt, stream);
            self.client
                .post(format!("{endpoint}/images/generations"))
                .json(&body)
        } else {
            let form = self.edit_form(request, prompt, images, stream).await?;
            self.client
                .post(format!("{endpoint}/images/edits"))
                .multipart(form)
        };
        if stream {
            builder = builder.header(reqwest::header::ACCEPT, "text/event-stream");
        }
        apply_auth(builder, &self.strategy, key)
    }

    async fn edit_form(
        &self,
        request: &ChatRequest,
        prompt: &str,
        images: Vec<EditImage>,
        stream: bool,
    ) -> Result<reqwest::multipart::Form, LlmError> {
        let mut form = reqwest::multipart::Form::new();
        for image in images {
            let (field, file_name, media_type, bytes) = match image {
                EditImage::Url(url) => {
                    let (bytes, media_type) = self.download(&url).await?;
                    let file_name = url
                        .split(['?', '#'])
                        .next()
                        .and_then(|path| path.rsplit('/').next())
                        .filter(|name| !name.is_empty())
                        .map_or_else(|| file_name_for(&media_type), str::to_string);
                    let field = if file_name.contains("mask.png") { "mask" } else { "image" };
                    (field, file_name, media_type, bytes)
                }
                EditImage::Blob { media_type, bytes } => {
                    ("image", file_name_for(&media_type), media_type, bytes)
                }
            };
            let part = reqwest::multipart::Part::bytes(bytes)
                .file_name(file_name)
                .mime_str(&media_type)
                .map_err(|e| LlmError::InvalidParameter(format!("invalid image media type: {e}")))?;
            form = form.part(field, part);
        }

        for (name, value) in edit_fields(request, prompt, stream) {
            form = form.text(name, value);
        }
        Ok(form)
    }

    async fn download(&self, url: &str) -> Result<(Vec<u8>, String), LlmError> {
        let response = StreamFactory::send(self.strategy.provider_id, self.client.get(url)).await?;
        let header = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| LlmError::HttpError(format!("Failed to download image from {url}: {e}")))?;
        let media_type = resolve_media_type(header.as_deref(), &bytes, url);
        Ok((bytes.to_vec(), media_type))
    }

    async fn complete(&self, request: &ChatRequest) -> Result<Vec<ChatSegment>, LlmError> {
        let builder = self.build_request(request, false).await?;
        let root = StreamFactory::send_json(self.strategy.provider_id, builder).await?;
        Ok(decode_images_response(&root))
    }
}

#[async_trait]
impl ChatService for ImageGenerationService {
    fn provider_id(&self) -> &'static str {
        self.strategy.provider_id
    }

    /// Streams previews and the final image. Several images (`n > 1`) cannot be streamed
    /// and go through the unary endpoint.
    fn chat_streamed(&self, request: ChatRequest, _cancel: CancelHandle) -> SegmentStream {
        let service = self.clone();
        let streamed =
            image_count(&request) == 1 && request.model().allow_streaming && request.streamed;
        if !streamed {
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

        Box::pin(async_stream::stream! {
            let builder = match service.build_request(&request, true).await {
                Ok(builder) => builder,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            let mut segments = StreamFactory::sse_segments(
                service.strategy.provider_id,
                builder,
                ImageEventDecoder::new(service.strategy.provider_id),
            );
            while let Some(item) = futures::StreamExt::next(&mut segments).await {
                yield item;
            }
        })
    }

    async fn chat(
        &self,
        request: ChatRequest,
        cancel: CancelHandle,
    ) -> Result<ChatCompletion, LlmError> {
        prompt_of(&request.messages)?;
        let request = request.with_streamed(false);
        let segments = cancel.run(self.complete(&request)).await?;
        Ok(ChatCompletion::from_segments(segments))
    }

    fn supported_content_types(&self) -> &'static [&'static str] {
        OPENAI_IMAGE_TYPES
    }
}

/// `n` rides in `max_output_tokens` for image models.
fn image_count(request: &ChatRequest) -> u32 {
    request.chat_config.max_output_tokens.unwrap_or(1).max(1)
}

fn quality(effort: ReasoningEffort) -> Option<&'static str> {
    match effort {
        ReasoningEffort::Default => None,
        ReasoningEffort::Minimal | ReasoningEffort::Low => Some("low"),
        ReasoningEffort::Medium => Some("medium"),
        ReasoningEffort::High => Some("high"),
    }
}

fn generation_body(request: &ChatRequest, prompt: &str, stream: bool) -> Value {
    let config = &request.chat_config;
    let mut body = Map::new();
    body.insert("prompt".into(), json!(prompt));
    body.insert("model".into(), json!(config.model.deployment_name));
    body.insert("n".into(), json!(image_count(request)));
    body.insert("moderation".into(), json!("low"));
    if stream {
        body.insert("stream".into(), Value::Bool(true));
        body.insert("partial_images".into(), json!(PARTIAL_IMAGES));
    }
    if let Some(quality) = quality(config.reasoning_effort) {
        body.insert("quality".into(), json!(quality));
    }
    if let Some(size) = config.image_size.as_deref().filter(|s| !s.is_empty()) {
        body.insert("size".into(), json!(size));
    }
    if let Some(user) = &request.end_user_id {
        body.insert("user".into(), json!(user));
    }
    Value::Object(body)
}

fn edit_fields(request: &ChatRequest, prompt: &str, stream: bool) -> Vec<(&'static str, String)> {
    let config = &request.chat_config;
    let mut fields = vec![
        ("prompt", prompt.to_string()),
        ("n", image_count(request).to_string()),
        ("model", config.model.deployment_name.clone()),
        ("moderation", "low".to_string()),
    ];
    if stream {
        fields.push(("stream", "true".to_string()));
        fields.push(("partial_images", PARTIAL_IMAGES.to_string()));
    }
    if let Some(size) = config.image_size.as_deref().filter(|s| !s.is_empty()) {
        fields.push(("size", size.to_string()));
    }
    if let Some(user) = &request.end_user_id {
        fields.push(("user", user.clone()));
    }
    if let Some(quality) = quality(config.reasoning_effort) {
        fields.push(("quality", quality.to_string()));
    }
    fields
}

fn last_user(messages: &[NeutralMessage]) -> Option<&NeutralMessage> {
    messages.iter().rev().find(|m| m.role == NeutralRole::User)
}

fn prompt_of(messages: &[NeutralMessage]) -> Result<&str, LlmError> {
    let user = last_user(messages)
        .ok_or_else(|| LlmError::InvalidParameter("Unable to find the user message".into()))?;
    user.contents
        .iter()
        .rev()
        .find_map(|c| match c {
            NeutralContent::Text { content } => Some(content.as_str()),
            _ => None,
        })
        .ok_or_else(|| {
            LlmError::InvalidParameter("Unable to find a text part in the user message".into())
        })
}

fn as_edit_image(content: &NeutralContent) -> Option<EditImage> {
    match content {
        NeutralContent::FileUrl { url } => Some(EditImage::Url(url.clone())),
        NeutralContent::FileBlob { media_type, bytes } => Some(EditImage::Blob {
            media_type: media_type.clone(),
            bytes: bytes.clone(),
        }),
        _ => None,
    }
}

/// Every image of the last user message, else the latest image in the conversation.
fn edit_images(messages: &[NeutralMessage]) -> Vec<EditImage> {
    if let Some(user) = last_user(messages) {
        let images: Vec<EditImage> = user.contents.iter().filter_map(as_edit_image).collect();
        if !images.is_empty() {
            return images;
        }
    }
    messages
        .iter()
        .rev()
        .flat_map(|m| m.contents.iter().rev())
        .find_map(as_edit_image)
        .into_iter()
        .collect()
}

/// Decodes `image_generation.*` and `image_edit.*` SSE events.
#[derive(Debug)]
pub struct ImageEventDecoder {
    provider_id: &'static str,
    partials: u32,
}

impl ImageEventDecoder {
    pub fn new(provider_id: &'static str) -> Self {
        Self {
            provider_id,
            partials: 0,
        }
    }
}

impl ChunkDecoder for ImageEventDecoder {
    fn decode(&mut self, event: Value) -> Result<Vec<ChatSegment>, LlmError> {
        let kind = event["type"].as_str().unwrap_or_default();
        let media_type = image_format_media_type(event["output_format"].as_str());
        let out = match kind {
            "image_generation.partial_image" | "image_edit.partial_image" => {
                self.partials += 1;
                tracing::debug!(
                    provider = self.provider_id,
                    partial = self.partials,
                    "partial image"
                );
                event["b64_json"]
                    .as_str()
                    .map(|b64| ChatSegment::preview_image(b64, media_type))
                    .into_iter()
                    .collect()
            }
            "image_generation.completed" | "image_edit.completed" => {
                let mut out = Vec::new();
                if let Some(b64) = event["b64_json"].as_str() {
                    out.push(ChatSegment::base64_image(b64, media_type));
                }
                if let Some(usage) = parse_usage(&event["usage"]) {
                    out.push(ChatSegment::Usage(usage));
                }
                out.push(ChatSegment::FinishReason(FinishReason::Stop));
                out
            }
            "error" => {
                return Err(LlmError::upstream_stream(self.provider_id, event.to_string()));
            }
            other => {
                tracing::debug!(provider = self.provider_id, event = other, "ignoring image event");
                Vec::new()
            }
        };
        Ok(out)
    }
}

/// `data[].b64_json` images, then usage, then `Stop`.
pub fn decode_images_response(root: &Value) -> Vec<ChatSegment> {
    let media_type = image_format_media_type(root["output_format"].as_str());
    let mut out: Vec<ChatSegment> = root["data"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|item| item["b64_json"].as_str())
        .map(|b64| ChatSegment::base64_image(b64, media_type))
        .collect();
    if let Some(usage) = parse_usage(&root["usage"]) {
        out.push(ChatSegment::Usage(usage));
    }
    out.push(ChatSegment::FinishReason(FinishReason::Stop));
    out
}

fn parse_usage(usage: &Value) -> Option<ChatTokenUsage> {
    if !usage.is_object() {
        return None;
    }
    let count = |v: &Value| v.as_u64().map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX));
    Some(ChatTokenUsage {
        input_tokens: count(&usage["input_tokens"]),
        output_tokens: count(&usage["output_tokens"]),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ApiType, ImageSource, Model};
    use futures::StreamExt;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn model(host: &str) -> Model {
        Model::new(1, "gpt-image-1", ModelProvider::OpenAI, ApiType::ImageGeneration).with_key(
            ModelKey::new(ModelProvider::OpenAI)
                .with_host(host)
                .with_secret("sk-img"),
        )
    }

    fn service() -> ImageGenerationService {
        ImageGenerationService::new(reqwest::Client::new(), ModelProvider::OpenAI)
    }

    #[test]
    fn prompt_is_last_text_of_last_user_message() {
        let messages = vec![
            NeutralMessage::user("first"),
            NeutralMessage::assistant("ok"),
            NeutralMessage::new(
                NeutralRole::User,
                vec![NeutralContent::text("a"), NeutralContent::text("draw a cat")],
            ),
        ];
        assert_eq!(prompt_of(&messages).expect("prompt"), "draw a cat");
        assert!(matches!(
            prompt_of(&[NeutralMessage::assistant("x")]),
            Err(LlmError::InvalidParameter(_))
        ));
    }

    #[test]
    fn edits_fall_back_to_latest_image() {
        let messages = vec![
            NeutralMessage::new(
                NeutralRole::User,
                vec![NeutralContent::FileUrl { url: "https://x/old.png".into() }],
            ),
            NeutralMessage::new(
                NeutralRole::Assistant,
                vec![NeutralContent::FileUrl { url: "https://x/new.png".into() }],
            ),
            NeutralMessage::user("make it blue"),
        ];
        assert_eq!(edit_images(&messages), vec![EditImage::Url("https://x/new.png".into())]);
        assert!(edit_images(&[NeutralMessage::user("hi")]).is_empty());
    }

    #[tokio::test]
    async fn streams_previews_then_final_image() {
        let server = MockServer::start().await;
        let body = "event: image_generation.partial_image\n\
                    data: {\"type\":\"image_generation.partial_image\",\
                    \"b64_json\":\"AAA\",\"output_format\":\"webp\"}\n\n\
                    event: image_generation.completed\n\
                    data: {\"type\":\"image_generation.completed\",\
                    \"b64_json\":\"BBB\",\"output_format\":\"webp\",\
                    \"usage\":{\"input_tokens\":5,\"output_tokens\":100}}\n\n";
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .and(header("authorization", "Bearer sk-img"))
            .and(body_partial_json(json!({"stream": true, "partial_images": 3, "prompt": "a fox"})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let out: Vec<ChatSegment> = service()
            .chat_streamed(ChatRequest::simple("a fox", model(&server.uri())), CancelHandle::new())
            .map(|s| s.expect("segment"))
            .collect()
            .await;
        assert_eq!(out[0], ChatSegment::preview_image("AAA", "image/webp"));
        assert_eq!(out[1], ChatSegment::base64_image("BBB", "image/webp"));
        assert!(matches!(out[2], ChatSegment::Usage(u) if u.output_tokens == 100));
        assert_eq!(out[3], ChatSegment::FinishReason(FinishReason::Stop));
    }

    #[tokio::test]
    async fn several_images_use_the_unary_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .and(body_partial_json(json!({"n": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"b64_json": "ONE"}, {"b64_json": "TWO"}],
                "usage": {"input_tokens": 4, "output_tokens": 200}
            })))
            .mount(&server)
            .await;

        let mut request = ChatRequest::simple("two foxes", model(&server.uri()));
        request.chat_config.max_output_tokens = Some(2);
        let out: Vec<ChatSegment> = service()
            .chat_streamed(request, CancelHandle::new())
            .map(|s| s.expect("segment"))
            .collect()
            .await;
        let images: Vec<&ImageSource> = out
            .iter()
            .filter_map(|s| match s {
                ChatSegment::Image { source } => Some(source),
                _ => None,
            })
            .collect();
        assert_eq!(images.len(), 2);
        assert_eq!(out.last(), Some(&ChatSegment::FinishReason(FinishReason::Stop)));
    }

    #[tokio::test]
    async fn missing_prompt_is_a_bad_parameter() {
        let request = ChatRequest::simple("x", model("http://127.0.0.1:9"))
            .with_messages(vec![NeutralMessage::assistant("no user here")]);
        let out: Vec<_> = service().chat_streamed(request, CancelHandle::new()).collect().await;
        assert!(matches!(out.as_slice(), [Err(LlmError::InvalidParameter(_))]));
    }
}
