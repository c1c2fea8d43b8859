//! HTTP adapters for the chat backend.
//!
//! [`chat::HttpChatTransport`] opens the streaming chat request and
//! [`title::HttpTitleGenerator`] calls the title endpoint. Both share one
//! `reqwest::Client` and the error mapping below.

pub mod chat;
pub mod title;

use std::time::Duration;

use parley_types::config::EngineConfig;
use parley_types::error::TransportError;

/// JSON fields that may carry a human-readable failure reason, in priority order.
const DETAIL_FIELDS: [&str; 3] = ["detail", "error", "message"];

/// Build the HTTP client shared by the adapters.
pub fn build_client(config: &EngineConfig) -> Result<reqwest::Client, TransportError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .map_err(|e| TransportError::Network(format!("failed to build HTTP client: {e}")))
}

/// Join the configured base URL and an endpoint path.
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

pub(crate) fn network_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Network("request timed out".to_string())
    } else {
        TransportError::Network(e.to_string())
    }
}

/// Turn a non-success response into `TransportError::Http`.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = error_detail(&body);
    tracing::debug!(status = status.as_u16(), detail = ?detail, "backend returned an error status");
    Err(TransportError::Http {
        status: status.as_u16(),
        detail,
    })
}

/// Extract the failure reason from an error response body.
///
/// Prefers a `detail`, `error`, or `message` field of a JSON body, then
/// falls back to the raw text. Empty bodies carry no detail.
pub fn error_detail(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    if let Ok(serde_json::Value::Object(fields)) = serde_json::from_str(body) {
        for key in DETAIL_FIELDS {
            match fields.get(key) {
                Some(serde_json::Value::String(text)) if !text.is_empty() => {
                    return Some(text.clone());
                }
                Some(serde_json::Value::Null) | None => {}
                Some(other) => return Some(other.to_string()),
            }
        }
    }

    Some(body.to_string())
}
