//! HTTP error classification shared by every adapter.

use super::types::LlmError;
use reqwest::header::HeaderMap;

const REQUEST_ID_HEADERS: &[&str] = &[
    "x-request-id",
    "request-id",
    "x-openai-request-id",
    "x-goog-request-id",
    "traceparent",
];

/// Turn a non-success HTTP response into an [`LlmError::UpstreamProtocol`].
///
/// The body is kept verbatim so operators can see exactly what the provider said.
pub fn classify_http_error(
    provider_id: &str,
    status: u16,
    body_text: &str,
    headers: &HeaderMap,
) -> LlmError {
    let request_ids: Vec<String> = REQUEST_ID_HEADERS
        .iter()
        .filter_map(|k| {
            headers
                .get(*k)
                .and_then(|v| v.to_str().ok())
                .map(|v| format!("{k}={v}"))
        })
        .collect();

    tracing::warn!(
        provider = provider_id,
        status,
        request_ids = %request_ids.join(","),
        body_sample = %body_text.chars().take(200).collect::<String>(),
        "upstream returned non-success status"
    );

    LlmError::upstream(provider_id, status, body_text)
}

/// Read the body of a failed response and classify it.
pub async fn classify_error_response(provider_id: &str, resp: reqwest::Response) -> LlmError {
    let status = resp.status().as_u16();
    let headers = resp.headers().clone();
    let text = resp.text().await.unwrap_or_default();
    classify_http_error(provider_id, status, &text, &headers)
}

/// Map a `send()` failure to the transport error shapes.
pub fn map_send_error(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        return LlmError::TimeoutError(format!("Request timed out: {err}"));
    }
    if err.is_connect() {
        return LlmError::ConnectionError(format!("Connection error: {err}"));
    }
    LlmError::HttpError(format!("Failed to send request: {err}"))
}
