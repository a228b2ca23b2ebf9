//! # chatwire - chat provider normalization and streaming protocol
//!
//! chatwire takes a provider-agnostic [`ChatRequest`](types::ChatRequest), routes it to
//! the right provider adapter, translates it into that provider's wire format, and
//! decodes the streamed answer into one ordered sequence of
//! [`ChatSegment`](types::ChatSegment)s.
//!
#![deny(unsafe_code)]

//! ## Quick Start
//!
//! ```rust,no_run
//! use chatwire::prelude::*;
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = build_http_client()?;
//!     let files = Arc::new(HttpFileUrlProvider::new(client.clone(), "https://files.local"));
//!     let factory = ChatFactory::new(client, files.clone());
//!
//!     let model = Model::new(1, "gpt-4o-mini", ModelProvider::OpenAI, ApiType::ChatCompletion)
//!         .with_key(ModelKey::new(ModelProvider::OpenAI).with_secret("sk-..."));
//!     let service = factory.create_chat_service(&model)?;
//!
//!     let mut stream = service
//!         .chat_entry(ChatRequest::simple("Hello!", model), files, CancelHandle::new())
//!         .await?;
//!     while let Some(segment) = stream.next().await {
//!         if let ChatSegment::Text { content } = segment? {
//!             print!("{content}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Layout
//!
//! - [`types`]: neutral messages, requests, models and output segments
//! - [`providers`]: the [`ChatService`](providers::ChatService) adapters
//! - [`streaming`]: SSE / JSON-array decoding and segment re-assembly
//! - [`conversions`]: OpenAI and Anthropic message JSON into the neutral model
//! - [`factory`]: adapter selection by provider and API type

pub mod conversions;
pub mod error;
pub mod factory;
pub mod http;
pub mod providers;
pub mod streaming;
pub mod telemetry;
pub mod tokenizer;
pub mod types;
pub mod utils;

pub use error::LlmError;
pub use factory::{ChatFactory, ModelLoader};

/// Common imports.
pub mod prelude {
    pub use crate::error::{ErrorCategory, LlmError};
    pub use crate::factory::{ChatFactory, ModelLoader};
    pub use crate::http::{HttpConfig, build_http_client, build_http_client_from_config};
    pub use crate::providers::{ChatService, FileUrlProvider, HttpFileUrlProvider, ValidateResult};
    pub use crate::streaming::{
        SegmentStream, ThinkTagParser, ToolCallAggregator, UsageAccumulator,
        aggregate_tool_calls, apply_think_tag_parser, with_usage_accounting,
    };
    pub use crate::types::*;
    pub use crate::utils::cancel::CancelHandle;
}
