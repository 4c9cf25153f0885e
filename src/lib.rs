//! llmcommit - generate git commit messages with local or cloud LLMs.
//!
//! # Overview
//!
//! The change set is redacted of secrets, wrapped in a prompt, and sent to an
//! ordered list of text-generation backends (Ollama, OpenAI-compatible,
//! Gemini). Each backend gets a bounded number of retries on transient
//! failures; the first one to answer wins. When all fail, the caller receives
//! one diagnostic entry per backend.

pub mod commit;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod redact;

// Re-export commonly used types
pub use commit::{DiffScope, GeneratedMessage, generate_commit_message};
pub use config::{ConfigLayer, EffectiveConfig};
pub use error::{Cancelled, CommitError, ConfigError, GenerateError, PipelineError, ProviderError, ProviderErrorKind};
pub use pipeline::{Completion, ExhaustedReport, PipelineResult, ProviderFailure, ProviderPipeline, RetryPolicy};
pub use provider::{Backend, ProviderClient, ProviderKind, ProviderSpec};
pub use redact::redact;
