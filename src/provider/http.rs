//! Shared HTTP plumbing: one POST per attempt and error classification.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{ProviderError, ProviderErrorKind};
use crate::provider::ProviderKind;

/// Longest body excerpt kept in error details.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// POST `body` as JSON and return the raw response text of a 2xx reply.
///
/// The timeout covers connect through the end of the response body.
pub async fn post_json<B: Serialize + ?Sized>(
    provider: ProviderKind,
    request: reqwest::RequestBuilder,
    body: &B,
    timeout: Duration,
) -> Result<String, ProviderError> {
    let response = request
        .timeout(timeout)
        .json(body)
        .send()
        .await
        .map_err(|e| transport_error(provider, e))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| transport_error(provider, e))?;

    if !status.is_success() {
        return Err(status_error(provider, status, &text));
    }

    Ok(text)
}

/// Classify a failure that happened before a complete response arrived.
pub fn transport_error(provider: ProviderKind, err: reqwest::Error) -> ProviderError {
    let kind = if err.is_timeout() {
        ProviderErrorKind::Timeout
    } else if err.is_builder() || err.is_redirect() {
        // the request itself is malformed (bad header value, bad URL)
        ProviderErrorKind::BadRequest
    } else if err.is_decode() {
        ProviderErrorKind::InvalidResponse
    } else {
        ProviderErrorKind::Unreachable
    };
    // never echo the request URL back into diagnostics
    ProviderError::new(provider, kind, err.without_url().to_string())
}

/// Classify a non-2xx status.
pub fn status_error(provider: ProviderKind, status: StatusCode, body: &str) -> ProviderError {
    let kind = match status.as_u16() {
        401 | 403 => ProviderErrorKind::AuthRejected,
        408 => ProviderErrorKind::Timeout,
        429 => ProviderErrorKind::RateLimited,
        500..=599 => ProviderErrorKind::ServerError,
        _ => ProviderErrorKind::BadRequest,
    };
    ProviderError::new(
        provider,
        kind,
        format!("HTTP {}: {}", status.as_u16(), excerpt(body)),
    )
}

/// Parse a 2xx body, mapping failures to `InvalidResponse`.
pub fn parse_body<T: DeserializeOwned>(provider: ProviderKind, body: &str) -> Result<T, ProviderError> {
    serde_json::from_str(body).map_err(|e| {
        ProviderError::new(
            provider,
            ProviderErrorKind::InvalidResponse,
            format!("unparsable response ({e}): {}", excerpt(body)),
        )
    })
}

/// Require a non-blank completion.
pub fn require_text(provider: ProviderKind, text: Option<String>) -> Result<String, ProviderError> {
    match text {
        Some(t) if !t.trim().is_empty() => Ok(t.trim().to_string()),
        _ => Err(ProviderError::new(
            provider,
            ProviderErrorKind::InvalidResponse,
            "response contained no text",
        )),
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() > MAX_ERROR_BODY_CHARS {
        let cut: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{cut}…")
    } else {
        trimmed.to_string()
    }
}
