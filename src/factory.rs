//! Chat factory: picks the adapter for a model.
//!
//! Routing is a pure function of `(provider, api_type)`:
//!
//! | API type | Provider | Adapter |
//! |---|---|---|
//! | any | Test | [`TestChatService`] |
//! | ChatCompletion | GoogleAI | [`GeminiService`] |
//! | ChatCompletion | Anthropic | [`AnthropicService`] |
//! | ChatCompletion | others | [`OpenAiCompatibleService`] with the provider's strategy |
//! | AnthropicMessages | Anthropic, DeepSeek, MiniMax | [`AnthropicService`] |
//! | Response | any OpenAI-wire provider | [`ResponsesService`] |
//! | ImageGeneration | OpenAI, AzureAIFoundry | [`ImageGenerationService`] |

use std::sync::Arc;

use crate::error::LlmError;
use crate::providers::anthropic::{AnthropicHost, AnthropicService};
use crate::providers::gemini::GeminiService;
use crate::providers::image_generation::ImageGenerationService;
use crate::providers::openai_compatible::{OpenAiCompatibleService, ProviderStrategy};
use crate::providers::openai_responses::ResponsesService;
use crate::providers::test::TestChatService;
use crate::providers::{ChatService, FileUrlProvider, ValidateResult};
use crate::types::{ApiType, Model, ModelKey, ModelProvider};
use crate::utils::cancel::CancelHandle;

/// Builds adapters that share one HTTP client and one file resolver.
#[derive(Clone)]
pub struct ChatFactory {
    client: reqwest::Client,
    files: Arc<dyn FileUrlProvider>,
}

static_assertions::assert_impl_all!(ChatFactory: Send, Sync);

impl std::fmt::Debug for ChatFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatFactory").finish_non_exhaustive()
    }
}

impl ChatFactory {
    pub fn new(client: reqwest::Client, files: Arc<dyn FileUrlProvider>) -> Self {
        Self { client, files }
    }

    pub fn files(&self) -> Arc<dyn FileUrlProvider> {
        self.files.clone()
    }

    /// Adapter for `model`.
    pub fn create_chat_service(&self, model: &Model) -> Result<Arc<dyn ChatService>, LlmError> {
        let provider = model.provider();
        if provider == ModelProvider::Test {
            return Ok(Arc::new(TestChatService::new()));
        }

        let service: Arc<dyn ChatService> = match model.api_type {
            ApiType::ChatCompletion => self.chat_completion_service(provider),
            ApiType::AnthropicMessages => {
                let host = AnthropicHost::for_provider(provider)
                    .ok_or_else(|| unsupported(provider, model.api_type))?;
                Arc::new(AnthropicService::new(self.client.clone(), host))
            }
            ApiType::Response => match provider {
                ModelProvider::GoogleAI | ModelProvider::Anthropic => {
                    return Err(unsupported(provider, model.api_type));
                }
                _ => Arc::new(ResponsesService::new(self.client.clone(), provider)),
            },
            ApiType::ImageGeneration => match provider {
                ModelProvider::OpenAI | ModelProvider::AzureAIFoundry => {
                    Arc::new(ImageGenerationService::new(self.client.clone(), provider))
                }
                _ => return Err(unsupported(provider, model.api_type)),
            },
        };

        tracing::debug!(
            provider = service.provider_id(),
            api_type = model.api_type.as_str(),
            model = %model.name,
            "created chat service"
        );
        Ok(service)
    }

    fn chat_completion_service(&self, provider: ModelProvider) -> Arc<dyn ChatService> {
        match provider {
            ModelProvider::GoogleAI => Arc::new(GeminiService::new(self.client.clone())),
            ModelProvider::Anthropic => Arc::new(AnthropicService::new(
                self.client.clone(),
                AnthropicHost::ANTHROPIC,
            )),
            _ => {
                let strategy = ProviderStrategy::for_provider(provider).unwrap_or_else(|| {
                    tracing::warn!(
                        provider = provider.slug(),
                        "no chat-completions strategy for provider, using generic OpenAI"
                    );
                    ProviderStrategy::generic(provider.slug())
                });
                Arc::new(OpenAiCompatibleService::new(self.client.clone(), strategy))
            }
        }
    }

    /// Loader that lists the models visible to a key of `provider`.
    pub fn create_model_loader(&self, provider: ModelProvider) -> ModelLoader {
        let service: Arc<dyn ChatService> = match provider {
            ModelProvider::Test => Arc::new(TestChatService::new()),
            ModelProvider::GoogleAI => Arc::new(GeminiService::new(self.client.clone())),
            ModelProvider::Anthropic => Arc::new(AnthropicService::new(
                self.client.clone(),
                AnthropicHost::ANTHROPIC,
            )),
            _ => Arc::new(OpenAiCompatibleService::new(
                self.client.clone(),
                ProviderStrategy::for_provider(provider)
                    .unwrap_or_else(|| ProviderStrategy::generic(provider.slug())),
            )),
        };
        ModelLoader { provider, service }
    }

    /// Send a trivial prompt to `model` and report whether it answers.
    pub async fn validate_model(&self, model: Model, cancel: CancelHandle) -> ValidateResult {
        match self.create_chat_service(&model) {
            Ok(service) => service.validate_model(model, self.files(), cancel).await,
            Err(e) => ValidateResult::fail(e.to_string()),
        }
    }
}

fn unsupported(provider: ModelProvider, api_type: ApiType) -> LlmError {
    LlmError::UnsupportedProvider {
        provider: provider.display_name().to_string(),
        api_type: api_type.as_str().to_string(),
    }
}

/// Lists the models a provider account can use.
#[derive(Clone)]
pub struct ModelLoader {
    provider: ModelProvider,
    service: Arc<dyn ChatService>,
}

impl ModelLoader {
    pub fn provider(&self) -> ModelProvider {
        self.provider
    }

    /// Model ids visible to `key`, sorted and deduplicated.
    pub async fn list_models(
        &self,
        key: &ModelKey,
        cancel: CancelHandle,
    ) -> Result<Vec<String>, LlmError> {
        let mut models = self.service.list_models(key, cancel).await?;
        models.sort();
        models.dedup();
        Ok(models)
    }
}
