//! OpenAI Responses API adapter.

pub mod client;
pub mod request;
pub mod stream;

pub use client::ResponsesService;
pub use stream::ResponsesDecoder;
