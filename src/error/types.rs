//! Core error types.

use crate::types::FinishReason;
use thiserror::Error;

/// Coarse classification of an [`LlmError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Transport failures (connect, reset, body read)
    Network,
    /// 401/403 from the upstream
    Authentication,
    /// 429 from the upstream
    RateLimit,
    /// Other 4xx from the upstream
    Client,
    /// 5xx from the upstream
    Server,
    /// Upstream sent something we could not decode
    Parsing,
    /// Caller supplied an invalid value
    Validation,
    /// Adapter could not be resolved or configured
    Configuration,
    /// Timeout or explicit cancellation
    Interrupted,
    /// Upstream reported a failure in-band
    Protocol,
    /// Anything else
    Unknown,
}

/// Unified error type for the chat protocol layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// Generic HTTP transport error
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    JsonError(String),

    /// Parse error on a well-formed but unexpected document
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Byte stream or SSE framing error
    #[error("Stream error: {0}")]
    StreamError(String),

    /// The per-call network timeout elapsed
    #[error("Timeout error: {0}")]
    TimeoutError(String),

    /// Could not connect to the upstream
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The caller cancelled the turn
    #[error("Request cancelled")]
    Cancelled,

    /// The provider answered with a non-success HTTP status. `body` is verbatim.
    #[error("{provider} returned HTTP {status}: {body}")]
    UpstreamProtocol {
        provider: String,
        status: u16,
        body: String,
    },

    /// An in-band `error` event arrived after a successful response started.
    #[error("{provider} stream error: {payload}")]
    UpstreamStream { provider: String, payload: String },

    /// A tool-call group was finalized without an id or a name.
    #[error("Incomplete function call for index {index}")]
    IncompleteToolCall { index: u32 },

    /// No adapter exists for this provider and API type.
    #[error("Provider {provider} is not supported for API type {api_type}")]
    UnsupportedProvider { provider: String, api_type: String },

    /// The API type itself is not recognised.
    #[error("Unsupported API type: {0}")]
    UnsupportedApiType(String),

    /// Required configuration (e.g. the API key) is missing at call time.
    #[error("Internal configuration issue: {0}")]
    InternalConfigIssue(String),

    /// The upstream envelope could not be decoded.
    #[error("Malformed upstream payload: {0}")]
    MalformedUpstreamPayload(String),

    /// Local configuration error (HTTP client, headers, proxy)
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Invalid request parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Bug or broken invariant inside this crate
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl LlmError {
    /// Build an [`LlmError::UpstreamProtocol`].
    pub fn upstream(provider: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::UpstreamProtocol {
            provider: provider.into(),
            status,
            body: body.into(),
        }
    }

    /// Build an [`LlmError::UpstreamStream`].
    pub fn upstream_stream(provider: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::UpstreamStream {
            provider: provider.into(),
            payload: payload.into(),
        }
    }

    /// HTTP status of the upstream failure, when there is one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::UpstreamProtocol { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UpstreamProtocol { status, .. } => match *status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                400..=499 => ErrorCategory::Client,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Unknown,
            },
            Self::HttpError(_) | Self::ConnectionError(_) | Self::StreamError(_) => {
                ErrorCategory::Network
            }
            Self::TimeoutError(_) | Self::Cancelled => ErrorCategory::Interrupted,
            Self::JsonError(_) | Self::ParseError(_) | Self::MalformedUpstreamPayload(_) => {
                ErrorCategory::Parsing
            }
            Self::UpstreamStream { .. } | Self::IncompleteToolCall { .. } => {
                ErrorCategory::Protocol
            }
            Self::UnsupportedProvider { .. }
            | Self::UnsupportedApiType(_)
            | Self::InternalConfigIssue(_)
            | Self::ConfigurationError(_) => ErrorCategory::Configuration,
            Self::InvalidParameter(_) => ErrorCategory::Validation,
            Self::InternalError(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether a caller-side retry could succeed.
    ///
    /// Informational only: this crate never retries generation calls itself.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit | ErrorCategory::Server | ErrorCategory::Network
        ) || matches!(self, Self::TimeoutError(_))
    }

    /// Finish reason recorded for a turn that failed with this error.
    pub fn finish_reason(&self) -> FinishReason {
        match self.category() {
            ErrorCategory::Interrupted => FinishReason::Cancelled,
            ErrorCategory::Configuration => FinishReason::InternalConfigIssue,
            ErrorCategory::Validation => FinishReason::BadParameter,
            _ => FinishReason::UpstreamError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_status_drives_category() {
        assert_eq!(
            LlmError::upstream("openai", 401, "").category(),
            ErrorCategory::Authentication
        );
        assert_eq!(
            LlmError::upstream("openai", 429, "").category(),
            ErrorCategory::RateLimit
        );
        assert_eq!(
            LlmError::upstream("openai", 400, "").category(),
            ErrorCategory::Client
        );
        assert_eq!(
            LlmError::upstream("openai", 503, "").category(),
            ErrorCategory::Server
        );
    }

    #[test]
    fn timeout_and_cancel_share_the_same_shape() {
        let timeout = LlmError::TimeoutError("elapsed".into());
        let cancelled = LlmError::Cancelled;
        assert_eq!(timeout.category(), cancelled.category());
        assert_eq!(timeout.finish_reason(), FinishReason::Cancelled);
        assert_eq!(cancelled.finish_reason(), FinishReason::Cancelled);
    }

    #[test]
    fn config_errors_map_to_config_finish_reason() {
        let err = LlmError::InternalConfigIssue("missing key".into());
        assert_eq!(err.finish_reason(), FinishReason::InternalConfigIssue);
        assert!(!err.is_retryable());
    }

    #[test]
    fn incomplete_tool_call_message_names_index() {
        let err = LlmError::IncompleteToolCall { index: 3 };
        assert_eq!(err.to_string(), "Incomplete function call for index 3");
    }
}
