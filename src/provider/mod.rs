//! Text-generation backends behind a single async client trait.

pub mod gemini;
pub mod http;
pub mod ollama;
pub mod openai;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use crate::error::ProviderError;
use crate::pipeline::SkipReason;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

/// Supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderKind {
    Ollama,
    OpenAi,
    Gemini,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [ProviderKind::Ollama, ProviderKind::OpenAi, ProviderKind::Gemini];

    /// Configuration name of the backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
        }
    }

    /// Look up a backend by its lower-case configuration name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Cloud backends refuse to run without an API key.
    pub fn requires_credential(&self) -> bool {
        !matches!(self, ProviderKind::Ollama)
    }

    /// Request path appended to the configured endpoint.
    pub fn path_template(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "/api/generate",
            ProviderKind::OpenAi => "/v1/chat/completions",
            ProviderKind::Gemini => "/v1beta/models/{model}:generateContent",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved settings for one provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderSpec {
    pub kind: ProviderKind,
    /// Base URL, e.g. `http://localhost:11434`.
    pub endpoint: String,
    pub model: String,
    pub timeout: Duration,
    pub credential: Option<String>,
    pub enabled: bool,
}

impl ProviderSpec {
    /// Full request URL with the model substituted into the path template.
    ///
    /// The template is appended to the endpoint's own path, one
    /// percent-encoded segment at a time, so a model name can never add
    /// segments, a query or a fragment.
    pub fn url(&self) -> String {
        let template = self.kind.path_template();
        let mut url = match Url::parse(&self.endpoint) {
            Ok(url) if !url.cannot_be_a_base() => url,
            // endpoints are validated during config resolution
            _ => return format!("{}{}", self.endpoint.trim_end_matches('/'), template),
        };
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            for part in template.trim_start_matches('/').split('/') {
                segments.push(&part.replace("{model}", &self.model));
            }
        }
        url.to_string()
    }

    pub fn has_credential(&self) -> bool {
        self.credential.as_deref().is_some_and(|c| !c.trim().is_empty())
    }

    /// Why this provider must be skipped, if it must.
    pub fn skip_reason(&self) -> Option<SkipReason> {
        if !self.enabled {
            Some(SkipReason::Disabled)
        } else if self.kind.requires_credential() && !self.has_credential() {
            Some(SkipReason::MissingCredential)
        } else {
            None
        }
    }
}

impl fmt::Debug for ProviderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSpec")
            .field("kind", &self.kind)
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("credential", &self.has_credential().then_some("<set>"))
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// One request/response cycle against a backend.
///
/// This abstraction allows mocking the network in pipeline tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Send `prompt` and return the first textual completion.
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, ProviderError>;
}

/// Concrete client for a configured backend.
#[derive(Clone)]
pub enum Backend {
    Ollama(OllamaClient),
    OpenAi(OpenAiClient),
    Gemini(GeminiClient),
}

impl Backend {
    /// Build the client matching `spec.kind`.
    pub fn new(spec: &ProviderSpec, http: reqwest::Client) -> Self {
        match spec.kind {
            ProviderKind::Ollama => Backend::Ollama(OllamaClient::new(http, spec)),
            ProviderKind::OpenAi => Backend::OpenAi(OpenAiClient::new(http, spec)),
            ProviderKind::Gemini => Backend::Gemini(GeminiClient::new(http, spec)),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Backend::Ollama(_) => ProviderKind::Ollama,
            Backend::OpenAi(_) => ProviderKind::OpenAi,
            Backend::Gemini(_) => ProviderKind::Gemini,
        }
    }
}

#[async_trait]
impl ProviderClient for Backend {
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, ProviderError> {
        match self {
            Backend::Ollama(client) => client.generate(prompt, timeout).await,
            Backend::OpenAi(client) => client.generate(prompt, timeout).await,
            Backend::Gemini(client) => client.generate(prompt, timeout).await,
        }
    }
}
