//! Google Gemini `generateContent` backend.
//!
//! The API key travels in the `x-goog-api-key` header. The `?key=` query
//! form is never used so the key cannot end up in proxy or access logs.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, ProviderErrorKind};
use crate::provider::http::{parse_body, post_json, require_text};
use crate::provider::{ProviderClient, ProviderKind, ProviderSpec};

pub const API_KEY_HEADER: &str = "x-goog-api-key";

const TEMPERATURE: f32 = 0.2;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, spec: &ProviderSpec) -> Self {
        Self {
            http,
            url: spec.url(),
            api_key: spec.credential.clone(),
        }
    }
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ProviderClient for GeminiClient {
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, ProviderError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ProviderError::new(
                ProviderKind::Gemini,
                ProviderErrorKind::AuthRejected,
                "no API key configured",
            ));
        };

        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
            },
        };
        let request = self.http.post(&self.url).header(API_KEY_HEADER, api_key);
        let text = post_json(ProviderKind::Gemini, request, &body, timeout).await?;
        extract_text(&text)
    }
}

/// Join the text parts of the first candidate.
fn extract_text(body: &str) -> Result<String, ProviderError> {
    let parsed: GenerateContentResponse = parse_body(ProviderKind::Gemini, body)?;
    let text = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        });
    require_text(ProviderKind::Gemini, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_joins_parts() {
        let body = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"feat: add "},{"text":"retry"}]}}]}"#;
        assert_eq!(extract_text(body).unwrap(), "feat: add retry");
    }

    #[test]
    fn test_extract_blocked_candidate_is_invalid() {
        let body = r#"{"candidates":[{"finishReason":"SAFETY"}]}"#;
        assert_eq!(
            extract_text(body).unwrap_err().kind,
            ProviderErrorKind::InvalidResponse
        );
        assert!(extract_text(r#"{"promptFeedback":{}}"#).is_err());
    }

    #[test]
    fn test_request_uses_camel_case() {
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: "p" }],
            }],
            generation_config: GenerationConfig { temperature: 0.2 },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "p");
        assert!(json.get("generationConfig").is_some());
    }
}
