//! Anthropic Messages adapter, also used for Anthropic-compatible hosts.

pub mod client;
pub mod request;
pub mod stream;

pub use client::{AnthropicHost, AnthropicService};
pub use request::{ThinkingGate, merge_tool_messages, switch_server_tool_responses_as_user};
pub use stream::AnthropicStreamState;
