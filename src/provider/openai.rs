//! OpenAI-compatible chat completions backend.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, ProviderErrorKind};
use crate::provider::http::{parse_body, post_json, require_text};
use crate::provider::{ProviderClient, ProviderKind, ProviderSpec};

const TEMPERATURE: f32 = 0.2;
const MAX_COMPLETION_TOKENS: u32 = 220;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_completion_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Client for `/v1/chat/completions` with bearer-token auth.
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiClient {
    pub fn new(http: reqwest::Client, spec: &ProviderSpec) -> Self {
        Self {
            http,
            url: spec.url(),
            model: spec.model.clone(),
            api_key: spec.credential.clone(),
        }
    }

    fn request_body<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_completion_tokens: MAX_COMPLETION_TOKENS,
            temperature: (!rejects_temperature(&self.model)).then_some(TEMPERATURE),
        }
    }
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("url", &self.url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ProviderClient for OpenAiClient {
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, ProviderError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ProviderError::new(
                ProviderKind::OpenAi,
                ProviderErrorKind::AuthRejected,
                "no API key configured",
            ));
        };

        let request = self.http.post(&self.url).bearer_auth(api_key);
        let text = post_json(ProviderKind::OpenAi, request, &self.request_body(prompt), timeout).await?;
        extract_text(&text)
    }
}

/// Reasoning models (o1, o3, ...) and the gpt-5 family only accept the
/// default temperature.
fn rejects_temperature(model: &str) -> bool {
    let mut chars = model.chars();
    let o_series = chars.next() == Some('o') && chars.next().is_some_and(|c| c.is_ascii_digit());
    o_series || model.starts_with("gpt-5")
}

fn extract_text(body: &str) -> Result<String, ProviderError> {
    let parsed: ChatResponse = parse_body(ProviderKind::OpenAi, body)?;
    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content);
    require_text(ProviderKind::OpenAi, content)
}
