//! Ordered multi-provider dispatch with per-provider retry.

pub mod retry;
pub mod runner;

use std::fmt;
use std::time::Duration;

use crate::error::{PipelineError, ProviderError};
use crate::provider::ProviderKind;

pub use retry::{MAX_ATTEMPTS, RetryDecision, RetryPolicy};
pub use runner::{PipelineSlot, ProviderPipeline};

/// Why a provider was never attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The backend needs an API key and none is configured.
    MissingCredential,
    /// Turned off with `<provider>.enabled = false`.
    Disabled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingCredential => f.write_str("no credential configured"),
            SkipReason::Disabled => f.write_str("disabled in configuration"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    TransientFailure,
    PermanentFailure,
}

/// One request/response cycle, kept for diagnostics only.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub provider: ProviderKind,
    /// 1-based attempt number for this provider.
    pub index: u32,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
    pub error: Option<ProviderError>,
}

/// Terminal outcome for a provider that did not produce the message.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderFailure {
    Skipped {
        provider: ProviderKind,
        reason: SkipReason,
    },
    Failed {
        provider: ProviderKind,
        attempts: u32,
        error: ProviderError,
        /// True when retries ran out on a transient error, false when a
        /// permanent error stopped the provider early.
        exhausted: bool,
    },
}

impl ProviderFailure {
    pub fn provider(&self) -> ProviderKind {
        match self {
            ProviderFailure::Skipped { provider, .. } | ProviderFailure::Failed { provider, .. } => *provider,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ProviderFailure::Skipped { .. })
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderFailure::Skipped { provider, reason } => {
                write!(f, "{provider}: skipped ({reason})")
            }
            ProviderFailure::Failed {
                provider,
                attempts,
                error,
                ..
            } => {
                let plural = if *attempts == 1 { "" } else { "s" };
                write!(
                    f,
                    "{provider}: failed after {attempts} attempt{plural} ({}): {}",
                    error.kind, error.detail
                )
            }
        }
    }
}

/// A generated message and how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub provider: ProviderKind,
    pub message: String,
    /// Providers earlier in the order that did not produce the message.
    pub prior_failures: Vec<ProviderFailure>,
    pub attempts: Vec<Attempt>,
}

impl Completion {
    /// Attempts made against the provider that succeeded.
    pub fn attempts_on_winner(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.provider == self.provider)
            .count()
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineResult {
    Success(Completion),
    /// One entry per provider in the configured order.
    Failure {
        failures: Vec<ProviderFailure>,
        attempts: Vec<Attempt>,
    },
}

impl PipelineResult {
    pub fn attempts(&self) -> &[Attempt] {
        match self {
            PipelineResult::Success(completion) => &completion.attempts,
            PipelineResult::Failure { attempts, .. } => attempts,
        }
    }

    pub fn into_result(self) -> Result<Completion, PipelineError> {
        match self {
            PipelineResult::Success(completion) => Ok(completion),
            PipelineResult::Failure { failures, .. } => {
                Err(PipelineError::AllProvidersExhausted(ExhaustedReport { failures }))
            }
        }
    }
}

/// Every provider was skipped or failed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExhaustedReport {
    pub failures: Vec<ProviderFailure>,
}

impl ExhaustedReport {
    /// Last error per provider that was actually attempted.
    pub fn attempted(&self) -> impl Iterator<Item = &ProviderFailure> {
        self.failures.iter().filter(|f| !f.is_skipped())
    }
}

impl fmt::Display for ExhaustedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failures.is_empty() {
            return f.write_str("No providers are configured");
        }
        f.write_str("All providers failed:")?;
        for failure in &self.failures {
            write!(f, "\n  {failure}")?;
        }
        Ok(())
    }
}
