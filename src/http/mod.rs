//! HTTP configuration and the shared client.
//!
//! Every adapter clones one `reqwest::Client` so connections are pooled across turns.

pub mod client;
pub mod config;

pub use client::{build_http_client, build_http_client_from_config};
pub use config::{HttpConfig, HttpConfigBuilder};
