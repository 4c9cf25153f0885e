//! Local Ollama backend (`POST /api/generate`).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, ProviderErrorKind};
use crate::provider::http::{parse_body, post_json, require_text};
use crate::provider::{ProviderClient, ProviderKind, ProviderSpec};

const TEMPERATURE: f32 = 0.2;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: Options,
}

#[derive(Serialize)]
struct Options {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for a local Ollama server. No credential is needed.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(http: reqwest::Client, spec: &ProviderSpec) -> Self {
        Self {
            http,
            url: spec.url(),
            model: spec.model.clone(),
        }
    }
}

#[async_trait]
impl ProviderClient for OllamaClient {
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, ProviderError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: Options {
                temperature: TEMPERATURE,
            },
        };
        let text = post_json(ProviderKind::Ollama, self.http.post(&self.url), &body, timeout).await?;
        extract_text(&text)
    }
}

/// Pull the completion out of a `/api/generate` reply.
///
/// A 2xx body carrying an `error` field (e.g. model not pulled) is treated as
/// an invalid response rather than a transport failure.
fn extract_text(body: &str) -> Result<String, ProviderError> {
    let parsed: GenerateResponse = parse_body(ProviderKind::Ollama, body)?;
    if let Some(error) = parsed.error {
        return Err(ProviderError::new(
            ProviderKind::Ollama,
            ProviderErrorKind::InvalidResponse,
            error,
        ));
    }
    require_text(ProviderKind::Ollama, parsed.response)
}
