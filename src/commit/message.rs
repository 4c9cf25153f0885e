//! Commit message generation and commit creation.

use git2::{Delta, Index, Oid, Repository};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::commit::diff::{DiffScope, pathspec_options, resolve_head_tree, truncate_context};
use crate::config::EffectiveConfig;
use crate::error::{CommitError, GenerateError, PipelineError};
use crate::pipeline::{Completion, ProviderPipeline};
use crate::prompt::{build_prompt, normalize_message};
use crate::provider::ProviderClient;
use crate::redact::redact_with_report;

/// A cleaned-up message and how it was produced.
#[derive(Debug, Clone)]
pub struct GeneratedMessage {
    /// Normalized message, ready for `git commit`.
    pub message: String,
    pub completion: Completion,
    /// Number of secrets masked in the context before sending.
    pub redactions: usize,
    /// Whether the context was cut to `max_diff_chars`.
    pub truncated: bool,
}

/// The exact text sent to providers, built from raw change context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedPrompt {
    pub prompt: String,
    /// Names of the redaction rules that fired, in text order.
    pub redacted: Vec<&'static str>,
    /// Whether the context was cut to `max_diff_chars`.
    pub truncated: bool,
}

/// Redact `context`, cut it to the configured size, and wrap it in the prompt.
pub fn prepare_prompt(config: &EffectiveConfig, context: &str) -> PreparedPrompt {
    let redaction = redact_with_report(context);
    if redaction.count() > 0 {
        info!(
            "Masked {} secret(s) before sending: {}",
            redaction.count(),
            redaction.rules.join(", ")
        );
    }

    // must run on redacted text: a cut can split a secret so no rule matches it
    let (context, truncated) = truncate_context(&redaction.text, config.max_diff_chars());
    if truncated {
        debug!("Change context truncated to {} chars", config.max_diff_chars());
    }

    let prompt = build_prompt(config.language(), &context);
    debug!("Commit prompt length: {} chars", prompt.len());

    PreparedPrompt {
        prompt,
        redacted: redaction.rules,
        truncated,
    }
}

/// Generate a commit message for `context` (raw repository content).
///
/// Nothing unredacted leaves this function: the prompt comes from
/// [`prepare_prompt`].
pub async fn generate_commit_message<C: ProviderClient>(
    pipeline: &ProviderPipeline<C>,
    config: &EffectiveConfig,
    context: &str,
    cancel: &CancellationToken,
) -> Result<GeneratedMessage, GenerateError> {
    let prepared = prepare_prompt(config, context);

    let result = pipeline
        .run(&prepared.prompt, cancel)
        .await
        .map_err(PipelineError::from)?;
    debug!("Pipeline finished after {} attempt(s)", result.attempts().len());
    let completion = result.into_result()?;

    let message = normalize_message(&completion.message);
    if message.is_empty() {
        return Err(GenerateError::EmptyMessage(completion.provider));
    }

    Ok(GeneratedMessage {
        message,
        completion,
        redactions: prepared.redacted.len(),
        truncated: prepared.truncated,
    })
}

/// Create a commit on HEAD with `message`.
///
/// With [`DiffScope::All`] tracked modifications and deletions are staged
/// first (like `git commit -a`); untracked files are left alone.
pub fn create_commit(repo: &Repository, message: &str, scope: DiffScope) -> Result<Oid, CommitError> {
    create_commit_for_paths(repo, message, scope, &[])
}

/// Like [`create_commit`], but only changes under `paths` go into the commit.
///
/// Mirrors `git commit -- <paths>`: staged changes outside the pathspecs stay
/// staged for a later commit. An empty slice commits the whole index.
pub fn create_commit_for_paths(
    repo: &Repository,
    message: &str,
    scope: DiffScope,
    paths: &[String],
) -> Result<Oid, CommitError> {
    let mut index = repo.index().map_err(CommitError::StagingFailed)?;
    if scope == DiffScope::All {
        let staged = if paths.is_empty() {
            index.update_all(["*"].iter(), None)
        } else {
            index.update_all(paths.iter(), None)
        };
        staged.map_err(CommitError::StagingFailed)?;
        index.write().map_err(CommitError::StagingFailed)?;
    }

    // Write the index (or the selected part of it) as a tree
    let tree_id = if paths.is_empty() {
        index.write_tree().map_err(CommitError::StagingFailed)?
    } else {
        partial_tree(repo, &index, paths)?
    };
    let tree = repo.find_tree(tree_id).map_err(CommitError::CommitFailed)?;

    // Get the signature from git config
    let sig = repo.signature().map_err(CommitError::ConfigError)?;

    // First commit in an empty repo has no parent
    let parent = match repo.head() {
        Ok(head) => Some(head.peel_to_commit().map_err(CommitError::CommitFailed)?),
        Err(e) if e.code() == git2::ErrorCode::UnbornBranch || e.code() == git2::ErrorCode::NotFound => None,
        Err(e) => return Err(CommitError::CommitFailed(e)),
    };
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

    let oid = repo
        .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .map_err(CommitError::CommitFailed)?;

    debug!("Created commit {}", oid);
    Ok(oid)
}

/// HEAD's tree with only the index changes under `paths` applied.
fn partial_tree(repo: &Repository, index: &Index, paths: &[String]) -> Result<Oid, CommitError> {
    let head_tree = resolve_head_tree(repo)?;

    let mut partial = Index::new().map_err(CommitError::StagingFailed)?;
    if let Some(tree) = &head_tree {
        partial.read_tree(tree).map_err(CommitError::StagingFailed)?;
    }

    let mut opts = pathspec_options(paths);
    let diff = repo
        .diff_tree_to_index(head_tree.as_ref(), Some(index), Some(&mut opts))
        .map_err(CommitError::DiffFailed)?;
    if diff.deltas().len() == 0 {
        return Err(CommitError::NoChanges);
    }

    for delta in diff.deltas() {
        if delta.status() == Delta::Deleted {
            if let Some(path) = delta.old_file().path() {
                partial.remove_path(path).map_err(CommitError::StagingFailed)?;
            }
        } else if let Some(entry) = delta.new_file().path().and_then(|p| index.get_path(p, 0)) {
            partial.add(&entry).map_err(CommitError::StagingFailed)?;
        }
    }

    partial.write_tree_to(repo).map_err(CommitError::StagingFailed)
}
