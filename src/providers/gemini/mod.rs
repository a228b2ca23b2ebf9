//! Google AI (Gemini) native adapter.

pub mod client;
pub mod request;
pub mod stream;

pub use client::{DEFAULT_BASE_URL, GeminiService};
pub use stream::GeminiDecoder;
