//! Request pre-processing shared by every adapter.
//!
//! Web-chat turns get template variables rendered into the system prompt, clamped
//! generation parameters and stale thinking removed. Every turn then has its file
//! contents resolved according to the model's vision capabilities.

use chrono::{DateTime, Utc};

use super::file_url::FileUrlProvider;
use crate::error::LlmError;
use crate::types::{
    ApiType, ChatRequest, NeutralContent, NeutralMessage, NeutralRole, NeutralSystemMessage,
    RequestSource,
};

/// Derive the request that is actually sent upstream.
///
/// `supported_content_types` lists the image media types the adapter accepts inline;
/// `"*"` accepts every type.
pub async fn preprocess(
    request: &ChatRequest,
    supported_content_types: &[&str],
    files: &dyn FileUrlProvider,
) -> Result<ChatRequest, LlmError> {
    let mut prepared = request.clone();
    let model = request.model().clone();
    let mut temperature = request.chat_config.temperature;
    let mut effort = request.chat_config.reasoning_effort;

    if request.source == RequestSource::WebChat {
        prepared = render_system_templates(&prepared, &model.name, Utc::now());
        temperature = model.clamp_temperature(temperature);
        effort = model.clamp_reasoning_effort(effort);
        if model.api_type == ApiType::AnthropicMessages
            && request.chat_config.thinking_budget.is_some()
        {
            temperature = None;
        }
        prepared.messages = remove_stale_thinking(&prepared.messages);
    }

    prepared.chat_config = prepared.chat_config.with_clamps(temperature, effort);

    let mut messages = Vec::with_capacity(prepared.messages.len());
    for message in &prepared.messages {
        messages.push(filter_vision(message, &prepared, supported_content_types, files).await?);
    }
    prepared.messages = messages;
    Ok(prepared)
}

/// Replace `{{MODEL_NAME}}`, `{{CURRENT_DATE}}` and `{{CURRENT_TIME}}` (UTC).
pub fn render_template(text: &str, model_name: &str, now: DateTime<Utc>) -> String {
    text.replace("{{MODEL_NAME}}", model_name)
        .replace("{{CURRENT_DATE}}", &now.format("%Y/%m/%d").to_string())
        .replace("{{CURRENT_TIME}}", &now.format("%H:%M:%S").to_string())
}

fn render_system_templates(
    request: &ChatRequest,
    model_name: &str,
    now: DateTime<Utc>,
) -> ChatRequest {
    match &request.system {
        Some(system) => {
            let blocks = system
                .blocks
                .iter()
                .map(|b| crate::types::SystemBlock {
                    text: render_template(&b.text, model_name, now),
                    cache_control: b.cache_control,
                })
                .collect();
            request.with_system(Some(NeutralSystemMessage { blocks }))
        }
        None => match &request.chat_config.system_prompt {
            Some(prompt) => request.with_chat_config(
                request
                    .chat_config
                    .with_system_prompt(render_template(prompt, model_name, now)),
            ),
            None => request.clone(),
        },
    }
}

/// Drop thinking from turns before the last user message.
///
/// Only the current turn's reasoning is replayed; a conversation whose only user message
/// is the first one is left alone.
fn remove_stale_thinking(messages: &[NeutralMessage]) -> Vec<NeutralMessage> {
    let last_user = messages.iter().rposition(|m| m.role == NeutralRole::User);
    let Some(last_user) = last_user.filter(|i| *i > 0) else {
        return messages.to_vec();
    };
    messages
        .iter()
        .enumerate()
        .map(|(i, m)| {
            if i < last_user {
                NeutralMessage::new(
                    m.role,
                    m.contents.iter().filter(|c| !c.is_think()).cloned().collect(),
                )
            } else {
                m.clone()
            }
        })
        .collect()
}

async fn filter_vision(
    message: &NeutralMessage,
    request: &ChatRequest,
    supported_content_types: &[&str],
    files: &dyn FileUrlProvider,
) -> Result<NeutralMessage, LlmError> {
    let model = request.model();
    let mut contents = Vec::with_capacity(message.contents.len());

    for content in &message.contents {
        match content {
            NeutralContent::File { file } => {
                if !model.allow_vision {
                    contents.push(files.text_url(file).await?);
                    continue;
                }
                let supported = supported_content_types.contains(&"*")
                    || file
                        .media_type
                        .as_deref()
                        .is_some_and(|t| supported_content_types.contains(&t));
                if supported {
                    contents.push(files.image_part(file, !model.supports_vision_link).await?);
                } else {
                    tracing::debug!(
                        file_id = %file.id,
                        media_type = ?file.media_type,
                        "dropping unsupported file"
                    );
                }
            }
            NeutralContent::FileUrl { url } => {
                if !model.allow_vision {
                    contents.push(NeutralContent::text(url.clone()));
                } else if model.supports_vision_link {
                    contents.push(content.clone());
                } else {
                    let (bytes, media_type) = files.download(url).await.map_err(|e| {
                        LlmError::InternalError(format!("Failed to download image from {url}: {e}"))
                    })?;
                    contents.push(NeutralContent::FileBlob { media_type, bytes });
                }
            }
            other => contents.push(other.clone()),
        }
    }

    Ok(NeutralMessage::new(message.role, contents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileRef, Model, ModelProvider, ReasoningEffort};
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct FakeFiles;

    #[async_trait]
    impl FileUrlProvider for FakeFiles {
        async fn image_part(
            &self,
            file: &FileRef,
            force_download: bool,
        ) -> Result<NeutralContent, LlmError> {
            Ok(if force_download {
                NeutralContent::FileBlob {
                    media_type: "image/png".into(),
                    bytes: vec![1],
                }
            } else {
                NeutralContent::FileUrl {
                    url: format!("https://files/{}", file.id),
                }
            })
        }

        async fn text_url(&self, file: &FileRef) -> Result<NeutralContent, LlmError> {
            Ok(NeutralContent::text(format!("https://files/{}", file.id)))
        }

        async fn download(&self, url: &str) -> Result<(Vec<u8>, String), LlmError> {
            if url.contains("broken") {
                return Err(LlmError::upstream("file", 404, ""));
            }
            Ok((vec![7], "image/jpeg".into()))
        }
    }

    fn model() -> Model {
        let mut model = Model::new(1, "gpt-x", ModelProvider::OpenAI, ApiType::ChatCompletion);
        model.name = "GPT X".into();
        model.max_temperature = 1.0;
        model.min_reasoning_effort = ReasoningEffort::Low;
        model
    }

    fn image(id: &str, media_type: &str) -> NeutralContent {
        NeutralContent::File {
            file: FileRef {
                id: id.into(),
                media_type: Some(media_type.into()),
                file_name: None,
            },
        }
    }

    fn web(request: ChatRequest) -> ChatRequest {
        request.with_source(RequestSource::WebChat)
    }

    #[test]
    fn templates_render_in_utc() {
        let now = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).single().expect("valid time");
        assert_eq!(
            render_template("{{MODEL_NAME}} {{CURRENT_DATE}} {{CURRENT_TIME}}", "M", now),
            "M 2025/03/04 05:06:07"
        );
    }

    #[tokio::test]
    async fn web_chat_renders_system_prompt_and_clamps() {
        let mut request = ChatRequest::simple("hi", model());
        request.chat_config.system_prompt = Some("You are {{MODEL_NAME}}".into());
        request.chat_config.temperature = Some(1.8);
        request.chat_config.reasoning_effort = ReasoningEffort::Minimal;

        let prepared = preprocess(&web(request.clone()), &["*"], &FakeFiles)
            .await
            .expect("prepared");
        assert_eq!(prepared.effective_system_prompt().as_deref(), Some("You are GPT X"));
        assert_eq!(prepared.chat_config.temperature, Some(1.0));
        assert_eq!(prepared.chat_config.reasoning_effort, ReasoningEffort::Low);

        // API turns are sent as given
        let api = preprocess(&request, &["*"], &FakeFiles).await.expect("prepared");
        assert_eq!(api.effective_system_prompt().as_deref(), Some("You are {{MODEL_NAME}}"));
        assert_eq!(api.chat_config.temperature, Some(1.8));
    }

    #[tokio::test]
    async fn anthropic_thinking_drops_temperature() {
        let mut m = model();
        m.api_type = ApiType::AnthropicMessages;
        let mut request = ChatRequest::simple("hi", m);
        request.chat_config.temperature = Some(0.5);
        request.chat_config.thinking_budget = Some(2048);
        let prepared = preprocess(&web(request), &["*"], &FakeFiles)
            .await
            .expect("prepared");
        assert_eq!(prepared.chat_config.temperature, None);
    }

    #[tokio::test]
    async fn thinking_before_the_last_user_turn_is_removed() {
        let messages = vec![
            NeutralMessage::user("q1"),
            NeutralMessage::new(
                NeutralRole::Assistant,
                vec![NeutralContent::think("old", Some("sig".into())), NeutralContent::text("a1")],
            ),
            NeutralMessage::user("q2"),
            NeutralMessage::new(
                NeutralRole::Assistant,
                vec![NeutralContent::think("new", None)],
            ),
        ];
        let request = web(ChatRequest::simple("", model()).with_messages(messages));
        let prepared = preprocess(&request, &["*"], &FakeFiles).await.expect("prepared");
        assert_eq!(prepared.messages[1].contents, vec![NeutralContent::text("a1")]);
        assert!(prepared.messages[3].contents[0].is_think());
        // the caller's request is untouched
        assert!(request.messages[1].contents[0].is_think());
    }

    #[tokio::test]
    async fn files_follow_vision_capabilities() {
        let message = NeutralMessage::new(
            NeutralRole::User,
            vec![image("a", "image/png"), image("b", "image/tiff")],
        );
        let request = ChatRequest::simple("", model()).with_messages(vec![message.clone()]);

        let prepared = preprocess(&request, &["image/png"], &FakeFiles)
            .await
            .expect("prepared");
        assert_eq!(
            prepared.messages[0].contents,
            vec![NeutralContent::FileUrl {
                url: "https://files/a".into()
            }]
        );

        let mut no_link = model();
        no_link.supports_vision_link = false;
        let request = ChatRequest::simple("", no_link).with_messages(vec![message.clone()]);
        let prepared = preprocess(&request, &["*"], &FakeFiles).await.expect("prepared");
        assert!(
            prepared.messages[0]
                .contents
                .iter()
                .all(|c| matches!(c, NeutralContent::FileBlob { .. }))
        );

        let mut blind = model();
        blind.allow_vision = false;
        let request = ChatRequest::simple("", blind).with_messages(vec![message]);
        let prepared = preprocess(&request, &["*"], &FakeFiles).await.expect("prepared");
        assert_eq!(
            prepared.messages[0].contents[1],
            NeutralContent::text("https://files/b")
        );
    }

    #[tokio::test]
    async fn url_images_are_downloaded_when_links_are_unsupported() {
        let mut m = model();
        m.supports_vision_link = false;
        let message = NeutralMessage::new(
            NeutralRole::User,
            vec![NeutralContent::FileUrl {
                url: "https://img/ok.jpg".into(),
            }],
        );
        let request = ChatRequest::simple("", m.clone()).with_messages(vec![message]);
        let prepared = preprocess(&request, &["*"], &FakeFiles).await.expect("prepared");
        assert_eq!(
            prepared.messages[0].contents[0],
            NeutralContent::FileBlob {
                media_type: "image/jpeg".into(),
                bytes: vec![7],
            }
        );

        let broken = NeutralMessage::new(
            NeutralRole::User,
            vec![NeutralContent::FileUrl {
                url: "https://img/broken.jpg".into(),
            }],
        );
        let request = ChatRequest::simple("", m).with_messages(vec![broken]);
        let err = preprocess(&request, &["*"], &FakeFiles).await.expect_err("download fails");
        assert!(err.to_string().contains("Failed to download image from https://img/broken.jpg"));
    }
}
