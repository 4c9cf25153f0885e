//! Error types for llmcommit modules using thiserror.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::ExhaustedReport;
use crate::provider::ProviderKind;

/// Errors from configuration resolution.
///
/// Only structurally invalid input is an error; missing optional fields are
/// filled from defaults.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid timeout for '{key}': '{value}' (expected a positive whole number of seconds)")]
    InvalidTimeout { key: String, value: String },

    #[error("Invalid provider order '{value}': {reason}")]
    InvalidProviderOrder { value: String, reason: String },

    #[error("Provider order '{0}' names no known provider (known: ollama, openai, gemini)")]
    NoKnownProviders(String),

    #[error("Invalid number for '{key}': '{value}'")]
    InvalidNumber { key: String, value: String },

    #[error("Invalid boolean for '{key}': '{value}' (expected true/false)")]
    InvalidBool { key: String, value: String },

    #[error("Invalid endpoint for '{key}': '{value}' (expected an http:// or https:// URL)")]
    InvalidEndpoint { key: String, value: String },

    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config in {origin}: {reason}")]
    Malformed { origin: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Classification of a single failed provider attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    /// Connection could not be established.
    Unreachable,
    /// The request did not complete within the provider timeout.
    Timeout,
    /// Credentials were rejected (401/403).
    AuthRejected,
    /// The provider asked us to slow down (429).
    RateLimited,
    /// 5xx from the provider.
    ServerError,
    /// Transport succeeded but the payload was empty or unparsable.
    InvalidResponse,
    /// Any other 4xx: the request itself is malformed.
    BadRequest,
}

impl ProviderErrorKind {
    /// Whether a repeat attempt against the same provider can help.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ProviderErrorKind::Unreachable
                | ProviderErrorKind::Timeout
                | ProviderErrorKind::ServerError
                | ProviderErrorKind::RateLimited
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderErrorKind::Unreachable => "unreachable",
            ProviderErrorKind::Timeout => "timed out",
            ProviderErrorKind::AuthRejected => "rejected credentials",
            ProviderErrorKind::RateLimited => "rate limited",
            ProviderErrorKind::ServerError => "server error",
            ProviderErrorKind::InvalidResponse => "invalid response",
            ProviderErrorKind::BadRequest => "bad request",
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed request/response cycle against one provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{provider} {kind}: {detail}")]
pub struct ProviderError {
    pub provider: ProviderKind,
    pub kind: ProviderErrorKind,
    pub detail: String,
}

impl ProviderError {
    pub fn new(provider: ProviderKind, kind: ProviderErrorKind, detail: impl Into<String>) -> Self {
        Self {
            provider,
            kind,
            detail: detail.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// The operator aborted generation (e.g. Ctrl-C).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Generation cancelled")]
pub struct Cancelled;

/// Pipeline-level terminal errors.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    AllProvidersExhausted(ExhaustedReport),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Errors from the end-to-end generation entry point.
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("{0} returned a message that was empty after cleanup")]
    EmptyMessage(ProviderKind),
}

/// Errors from diff collection and commit creation.
#[derive(Error, Debug)]
pub enum CommitError {
    #[error("No changes to commit (stage changes first, or pass --all)")]
    NoChanges,

    #[error("Failed to open repository: {0}")]
    OpenRepository(#[source] git2::Error),

    #[error("Failed to collect diff: {0}")]
    DiffFailed(#[source] git2::Error),

    #[error("Failed to stage changes: {0}")]
    StagingFailed(#[source] git2::Error),

    #[error("Failed to create commit: {0}")]
    CommitFailed(#[source] git2::Error),

    #[error("Git config error (missing user.name or user.email): {0}")]
    ConfigError(#[source] git2::Error),
}
