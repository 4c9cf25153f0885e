//! Provider pipeline: ordered fallback with per-provider retry.
//!
//! Each provider moves through
//! `NotAttempted -> Attempting -> (Retrying -> Attempting)* -> terminal`,
//! where the terminal outcome is success, a skip, or a recorded failure. The
//! first success ends the run. Nothing survives between runs.

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EffectiveConfig;
use crate::error::{Cancelled, ConfigError};
use crate::pipeline::retry::{RetryDecision, RetryPolicy};
use crate::pipeline::{Attempt, AttemptOutcome, Completion, PipelineResult, ProviderFailure};
use crate::provider::{Backend, ProviderClient, ProviderKind, ProviderSpec};

/// A provider's settings paired with the client that talks to it.
pub struct PipelineSlot<C> {
    pub spec: ProviderSpec,
    pub client: C,
}

/// Per-provider progress while it is being driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProviderState {
    NotAttempted,
    Attempting { attempt: u32 },
    Retrying { attempt: u32, wait: std::time::Duration },
}

enum ProviderRun {
    Succeeded(String),
    Failed(ProviderFailure),
}

/// Tries providers strictly in order until one produces a message.
pub struct ProviderPipeline<C = Backend> {
    slots: Vec<PipelineSlot<C>>,
    policy: RetryPolicy,
}

impl ProviderPipeline<Backend> {
    /// Build HTTP-backed clients for every provider in the configured order.
    pub fn from_config(config: &EffectiveConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("llmcommit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ConfigError::HttpClient)?;

        let slots = config
            .ordered_providers()
            .map(|spec| PipelineSlot {
                client: Backend::new(spec, http.clone()),
                spec: spec.clone(),
            })
            .collect();

        let policy = RetryPolicy::default().with_max_attempts(config.max_attempts());
        Ok(Self::new(slots, policy))
    }
}

impl<C: ProviderClient> ProviderPipeline<C> {
    pub fn new(slots: Vec<PipelineSlot<C>>, policy: RetryPolicy) -> Self {
        Self { slots, policy }
    }

    pub fn order(&self) -> impl Iterator<Item = ProviderKind> + '_ {
        self.slots.iter().map(|slot| slot.spec.kind)
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run the prompt through the providers.
    ///
    /// Returns `Err(Cancelled)` as soon as `cancel` fires, whether a request
    /// or a backoff wait is in progress; no further attempt is started.
    pub async fn run(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<PipelineResult, Cancelled> {
        let mut failures = Vec::with_capacity(self.slots.len());
        let mut attempts = Vec::new();

        for slot in &self.slots {
            match self.drive(slot, prompt, cancel, &mut attempts).await? {
                ProviderRun::Succeeded(message) => {
                    info!("{} generated the commit message", slot.spec.kind);
                    return Ok(PipelineResult::Success(Completion {
                        provider: slot.spec.kind,
                        message,
                        prior_failures: failures,
                        attempts,
                    }));
                }
                ProviderRun::Failed(failure) => {
                    if failure.is_skipped() {
                        info!("{}", failure);
                    } else {
                        warn!("{}", failure);
                    }
                    failures.push(failure);
                }
            }
        }

        Ok(PipelineResult::Failure { failures, attempts })
    }

    async fn drive(
        &self,
        slot: &PipelineSlot<C>,
        prompt: &str,
        cancel: &CancellationToken,
        attempts: &mut Vec<Attempt>,
    ) -> Result<ProviderRun, Cancelled> {
        let provider = slot.spec.kind;
        let mut state = ProviderState::NotAttempted;

        loop {
            state = match state {
                ProviderState::NotAttempted => match slot.spec.skip_reason() {
                    Some(reason) => {
                        return Ok(ProviderRun::Failed(ProviderFailure::Skipped { provider, reason }));
                    }
                    None => ProviderState::Attempting { attempt: 1 },
                },

                ProviderState::Attempting { attempt } => {
                    if cancel.is_cancelled() {
                        return Err(Cancelled);
                    }
                    debug!(
                        "Attempt {}/{} against {} (timeout {:?})",
                        attempt,
                        self.policy.max_attempts(),
                        provider,
                        slot.spec.timeout
                    );

                    let started = Instant::now();
                    let result = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(Cancelled),
                        result = slot.client.generate(prompt, slot.spec.timeout) => result,
                    };
                    let elapsed = started.elapsed();

                    match result {
                        Ok(message) => {
                            attempts.push(Attempt {
                                provider,
                                index: attempt,
                                outcome: AttemptOutcome::Success,
                                elapsed,
                                error: None,
                            });
                            return Ok(ProviderRun::Succeeded(message));
                        }
                        Err(error) => {
                            let outcome = if error.is_transient() {
                                AttemptOutcome::TransientFailure
                            } else {
                                AttemptOutcome::PermanentFailure
                            };
                            attempts.push(Attempt {
                                provider,
                                index: attempt,
                                outcome,
                                elapsed,
                                error: Some(error.clone()),
                            });

                            match self.policy.should_retry(attempt, error.kind) {
                                RetryDecision::Retry(wait) => {
                                    debug!("{} failed ({}); retrying in {:?}", provider, error.kind, wait);
                                    ProviderState::Retrying { attempt, wait }
                                }
                                RetryDecision::GiveUp => {
                                    return Ok(ProviderRun::Failed(ProviderFailure::Failed {
                                        provider,
                                        attempts: attempt,
                                        exhausted: error.is_transient(),
                                        error,
                                    }));
                                }
                            }
                        }
                    }
                }

                ProviderState::Retrying { attempt, wait } => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(Cancelled),
                        _ = tokio::time::sleep(wait) => {}
                    }
                    ProviderState::Attempting {
                        attempt: attempt + 1,
                    }
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::error::{ProviderError, ProviderErrorKind};
    use crate::pipeline::{MAX_ATTEMPTS, SkipReason};
    use crate::provider::MockProviderClient;

    fn spec(kind: ProviderKind, credential: Option<&str>) -> ProviderSpec {
        ProviderSpec {
            kind,
            endpoint: "http://127.0.0.1:9".to_string(),
            model: "test-model".to_string(),
            timeout: Duration::from_secs(5),
            credential: credential.map(str::to_string),
            enabled: true,
        }
    }

    fn err(kind: ProviderKind, error: ProviderErrorKind) -> ProviderError {
        ProviderError::new(kind, error, "simulated")
    }

    fn slot(spec: ProviderSpec, client: MockProviderClient) -> PipelineSlot<MockProviderClient> {
        PipelineSlot { spec, client }
    }

    fn never_called() -> MockProviderClient {
        let mut mock = MockProviderClient::new();
        mock.expect_generate().never();
        mock
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_provider_success_ends_run() {
        let mut ollama = MockProviderClient::new();
        ollama
            .expect_generate()
            .times(1)
            .returning(|_, _| Ok("feat: add pipeline".to_string()));

        let pipeline = ProviderPipeline::new(
            vec![
                slot(spec(ProviderKind::Ollama, None), ollama),
                slot(spec(ProviderKind::OpenAi, Some("k")), never_called()),
            ],
            RetryPolicy::default(),
        );

        let result = pipeline.run("prompt", &CancellationToken::new()).await.unwrap();
        let completion = result.into_result().unwrap();
        assert_eq!(completion.provider, ProviderKind::Ollama);
        assert_eq!(completion.message, "feat: add pipeline");
        assert!(completion.prior_failures.is_empty());
        assert_eq!(completion.attempts.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_then_permanent_then_success() {
        let mut openai = MockProviderClient::new();
        openai
            .expect_generate()
            .times(1)
            .returning(|_, _| Err(err(ProviderKind::OpenAi, ProviderErrorKind::BadRequest)));
        let mut ollama = MockProviderClient::new();
        ollama
            .expect_generate()
            .times(1)
            .returning(|_, _| Ok("fix: x".to_string()));

        let pipeline = ProviderPipeline::new(
            vec![
                slot(spec(ProviderKind::Gemini, None), never_called()),
                slot(spec(ProviderKind::OpenAi, Some("k")), openai),
                slot(spec(ProviderKind::Ollama, None), ollama),
            ],
            RetryPolicy::default(),
        );

        let completion = pipeline
            .run("prompt", &CancellationToken::new())
            .await
            .unwrap()
            .into_result()
            .unwrap();

        assert_eq!(completion.provider, ProviderKind::Ollama);
        assert_eq!(
            completion.prior_failures[0],
            ProviderFailure::Skipped {
                provider: ProviderKind::Gemini,
                reason: SkipReason::MissingCredential
            }
        );
        assert!(matches!(
            completion.prior_failures[1],
            ProviderFailure::Failed {
                provider: ProviderKind::OpenAi,
                attempts: 1,
                exhausted: false,
                ..
            }
        ));
        assert!(completion.attempts.iter().all(|a| a.provider != ProviderKind::Gemini));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_every_attempt_exhausts_bound() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let mut ollama = MockProviderClient::new();
        ollama.expect_generate().times(MAX_ATTEMPTS as usize).returning(move |_, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Err(err(ProviderKind::Ollama, ProviderErrorKind::Timeout))
        });

        let pipeline = ProviderPipeline::new(
            vec![slot(spec(ProviderKind::Ollama, None), ollama)],
            RetryPolicy::default(),
        );

        let result = pipeline.run("prompt", &CancellationToken::new()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
        match result {
            PipelineResult::Failure { failures, attempts } => {
                assert_eq!(failures.len(), 1);
                assert!(matches!(
                    &failures[0],
                    ProviderFailure::Failed { attempts: 3, exhausted: true, error, .. }
                        if error.kind == ProviderErrorKind::Timeout
                ));
                assert_eq!(attempts.len(), 3);
                assert!(attempts.iter().all(|a| a.outcome == AttemptOutcome::TransientFailure));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_twice_then_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let mut ollama = MockProviderClient::new();
        ollama.expect_generate().times(3).returning(move |_, _| {
            let n = calls_clone.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(err(ProviderKind::Ollama, ProviderErrorKind::Unreachable))
            } else {
                Ok("chore: tidy".to_string())
            }
        });

        let pipeline = ProviderPipeline::new(
            vec![slot(spec(ProviderKind::Ollama, None), ollama)],
            RetryPolicy::default(),
        );

        let completion = pipeline
            .run("prompt", &CancellationToken::new())
            .await
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(completion.provider, ProviderKind::Ollama);
        assert_eq!(completion.attempts_on_winner(), 3);
        assert_eq!(completion.attempts.last().unwrap().index, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_rejected_moves_on_without_retry() {
        let mut ollama = MockProviderClient::new();
        ollama
            .expect_generate()
            .times(1)
            .returning(|_, _| Err(err(ProviderKind::Ollama, ProviderErrorKind::AuthRejected)));
        let mut openai = MockProviderClient::new();
        openai
            .expect_generate()
            .times(1)
            .returning(|_, _| Ok("docs: readme".to_string()));

        let pipeline = ProviderPipeline::new(
            vec![
                slot(spec(ProviderKind::Ollama, None), ollama),
                slot(spec(ProviderKind::OpenAi, Some("k")), openai),
            ],
            RetryPolicy::default(),
        );

        let started = Instant::now();
        let completion = pipeline
            .run("prompt", &CancellationToken::new())
            .await
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(completion.provider, ProviderKind::OpenAi);
        // no backoff wait happened
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_provider_accounted_for_on_failure() {
        let mut ollama = MockProviderClient::new();
        ollama
            .expect_generate()
            .times(1)
            .returning(|_, _| Err(err(ProviderKind::Ollama, ProviderErrorKind::InvalidResponse)));
        let mut disabled = spec(ProviderKind::Gemini, Some("k"));
        disabled.enabled = false;

        let pipeline = ProviderPipeline::new(
            vec![
                slot(spec(ProviderKind::Ollama, None), ollama),
                slot(spec(ProviderKind::OpenAi, None), never_called()),
                slot(disabled, never_called()),
            ],
            RetryPolicy::default(),
        );

        let PipelineResult::Failure { failures, .. } =
            pipeline.run("prompt", &CancellationToken::new()).await.unwrap()
        else {
            panic!("expected failure");
        };
        let providers: Vec<_> = failures.iter().map(ProviderFailure::provider).collect();
        assert_eq!(
            providers,
            vec![ProviderKind::Ollama, ProviderKind::OpenAi, ProviderKind::Gemini]
        );
        assert!(!failures[0].is_skipped());
        assert!(matches!(
            failures[2],
            ProviderFailure::Skipped {
                reason: SkipReason::Disabled,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_are_independent() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let mut ollama = MockProviderClient::new();
        ollama.expect_generate().returning(move |_, _| {
            let n = calls_clone.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(err(ProviderKind::Ollama, ProviderErrorKind::AuthRejected))
            } else {
                Ok("feat: second run".to_string())
            }
        });

        let pipeline = ProviderPipeline::new(
            vec![slot(spec(ProviderKind::Ollama, None), ollama)],
            RetryPolicy::default(),
        );
        let cancel = CancellationToken::new();

        assert!(pipeline.run("p", &cancel).await.unwrap().into_result().is_err());
        // a permanent failure in one run does not disable the provider
        let completion = pipeline.run("p", &cancel).await.unwrap().into_result().unwrap();
        assert_eq!(completion.message, "feat: second run");
    }

    #[test]
    fn test_pre_cancelled_token_makes_no_calls() {
        let pipeline = ProviderPipeline::new(
            vec![slot(spec(ProviderKind::Ollama, None), never_called())],
            RetryPolicy::default(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        // resolves on the first poll, before any request is issued
        let mut run = tokio_test::task::spawn(pipeline.run("p", &cancel));
        let result = tokio_test::assert_ready!(run.poll());
        assert_eq!(result, Err(Cancelled));
    }

    /// Client whose request never finishes on its own.
    struct HangingClient {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ProviderClient for HangingClient {
        async fn generate(&self, _prompt: &str, _timeout: Duration) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("too late".to_string())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_in_flight_request() {
        let calls = Arc::new(AtomicU32::new(0));
        let pipeline = ProviderPipeline::new(
            vec![
                PipelineSlot {
                    spec: spec(ProviderKind::Ollama, None),
                    client: HangingClient { calls: calls.clone() },
                },
                PipelineSlot {
                    spec: spec(ProviderKind::OpenAi, Some("k")),
                    client: HangingClient { calls: calls.clone() },
                },
            ],
            RetryPolicy::default(),
        );

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        assert_eq!(pipeline.run("p", &cancel).await, Err(Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_stops_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let mut ollama = MockProviderClient::new();
        ollama.expect_generate().returning(move |_, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Err(err(ProviderKind::Ollama, ProviderErrorKind::ServerError))
        });

        let policy = RetryPolicy::new(3, Duration::from_secs(10), Duration::from_secs(30));
        let pipeline = ProviderPipeline::new(vec![slot(spec(ProviderKind::Ollama, None), ollama)], policy);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        assert_eq!(pipeline.run("p", &cancel).await, Err(Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
