//! HTTP client construction.

use super::config::HttpConfig;
use crate::error::LlmError;

/// Build the shared client from environment-aware defaults.
pub fn build_http_client() -> Result<reqwest::Client, LlmError> {
    build_http_client_from_config(&HttpConfig::from_env())
}

/// Build a `reqwest::Client` from an [`HttpConfig`].
pub fn build_http_client_from_config(config: &HttpConfig) -> Result<reqwest::Client, LlmError> {
    let mut builder = reqwest::Client::builder();

    if let Some(timeout) = config.timeout {
        builder = builder.timeout(timeout);
    }
    if let Some(connect_timeout) = config.connect_timeout {
        builder = builder.connect_timeout(connect_timeout);
    }

    if let Some(proxy_url) = &config.proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| LlmError::ConfigurationError(format!("Invalid proxy URL: {e}")))?;
        builder = builder.proxy(proxy);
    }

    if let Some(user_agent) = &config.user_agent {
        builder = builder.user_agent(user_agent);
    }

    if !config.headers.is_empty() {
        let mut headers = reqwest::header::HeaderMap::new();
        for (k, v) in &config.headers {
            let name = reqwest::header::HeaderName::from_bytes(k.as_bytes()).map_err(|e| {
                LlmError::ConfigurationError(format!("Invalid header name '{k}': {e}"))
            })?;
            let value = reqwest::header::HeaderValue::from_str(v).map_err(|e| {
                LlmError::ConfigurationError(format!("Invalid header value for '{k}': {e}"))
            })?;
            headers.insert(name, value);
        }
        builder = builder.default_headers(headers);
    }

    builder
        .build()
        .map_err(|e| LlmError::ConfigurationError(format!("Failed to create HTTP client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn default_config_builds() {
        assert!(build_http_client_from_config(&HttpConfig::default()).is_ok());
    }

    #[test]
    fn invalid_proxy_is_a_configuration_error() {
        let config = HttpConfig::builder()
            .timeout(Duration::from_secs(1))
            .proxy("::not a url::")
            .build();
        assert!(matches!(
            build_http_client_from_config(&config),
            Err(LlmError::ConfigurationError(_))
        ));
    }

    #[test]
    fn invalid_header_name_is_rejected() {
        let config = HttpConfig::builder().header("bad header", "v").build();
        assert!(matches!(
            build_http_client_from_config(&config),
            Err(LlmError::ConfigurationError(_))
        ));
    }
}
