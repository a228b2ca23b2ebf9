//! OpenAI chat-completions and the providers that speak it.

pub mod client;
pub mod request;
pub mod strategy;
pub mod stream;

pub use client::OpenAiCompatibleService;
pub use strategy::{
    AuthScheme, EffortMapping, HostTransform, MaxTokensRule, ProviderStrategy, WebSearchMapping,
};
pub use stream::{OpenAiChunkDecoder, parse_usage};
