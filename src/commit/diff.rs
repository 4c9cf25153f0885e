//! Diff collection from the repository using git2.

use std::fmt;

use git2::{Delta, Diff, DiffFormat, DiffOptions, ErrorCode, Repository, Status, StatusOptions, Tree};
use tracing::warn;

use crate::error::CommitError;

/// Appended when the change context is cut to fit the size limit.
pub const TRUNCATION_MARKER: &str = "\n\n[DIFF TRUNCATED]\n";

/// Which changes the message describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiffScope {
    /// Index against HEAD (`git diff --cached`).
    #[default]
    Staged,
    /// Tracked working-tree changes against HEAD (`git commit -a`).
    All,
}

/// Status of a changed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl FileStatus {
    /// Single-letter code as printed by `git diff --name-status`.
    pub fn code(&self) -> char {
        match self {
            FileStatus::Added => 'A',
            FileStatus::Modified => 'M',
            FileStatus::Deleted => 'D',
            FileStatus::Renamed => 'R',
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Added => write!(f, "Added"),
            FileStatus::Modified => write!(f, "Modified"),
            FileStatus::Deleted => write!(f, "Deleted"),
            FileStatus::Renamed => write!(f, "Renamed"),
        }
    }
}

/// A file that differs between HEAD and the compared side.
#[derive(Debug, Clone)]
pub struct ChangedFile {
    pub path: String,
    pub status: FileStatus,
    /// Old path for renamed files (None for non-rename changes).
    pub old_path: Option<String>,
}

/// The changes a commit message is generated from.
#[derive(Debug, Clone)]
pub struct DiffSummary {
    pub scope: DiffScope,
    pub diff_text: String,
    pub changed_files: Vec<ChangedFile>,
    pub additions: usize,
    pub deletions: usize,
    /// `git status --porcelain=v1` lines for the whole repository.
    pub status: Vec<String>,
}

impl DiffSummary {
    /// Name-status listing, repository status and the unified diff.
    ///
    /// This is raw repository content and must be redacted before it leaves
    /// the process.
    pub fn context(&self) -> String {
        let files = self
            .changed_files
            .iter()
            .map(|f| match &f.old_path {
                Some(old) => format!("{}\t{} -> {}", f.status.code(), old, f.path),
                None => format!("{}\t{}", f.status.code(), f.path),
            })
            .collect::<Vec<_>>()
            .join("\n");

        let status = if self.status.is_empty() {
            "(clean or not available)".to_string()
        } else {
            self.status.join("\n")
        };

        format!(
            "Changed files (name-status, {} additions, {} deletions):\n{}\n\nRepo status (porcelain):\n{}\n\nDiff of what will be committed:\n{}\n",
            self.additions,
            self.deletions,
            files,
            status,
            self.diff_text.trim()
        )
    }
}

/// Resolve the HEAD tree, distinguishing empty-repo errors from real failures.
///
/// Returns `Ok(None)` for repos with no commits (unborn branch / not found),
/// `Ok(Some(tree))` for repos with a valid HEAD, or `Err(CommitError::DiffFailed)`
/// for real errors (corrupt HEAD, permission issues, missing objects).
pub(crate) fn resolve_head_tree(repo: &Repository) -> Result<Option<Tree<'_>>, CommitError> {
    let head_ref = match repo.head() {
        Ok(r) => r,
        Err(e)
            if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound =>
        {
            return Ok(None);
        }
        Err(e) => return Err(CommitError::DiffFailed(e)),
    };

    let tree = head_ref.peel_to_tree().map_err(CommitError::DiffFailed)?;
    Ok(Some(tree))
}

/// Diff options restricted to `paths`; no restriction when empty.
pub(crate) fn pathspec_options(paths: &[String]) -> DiffOptions {
    let mut opts = DiffOptions::new();
    for p in paths {
        opts.pathspec(p);
    }
    opts
}

/// Collect the changes for `scope`.
///
/// Untracked files are never included, matching what `git commit` records.
/// Returns [`CommitError::NoChanges`] when there is nothing to describe.
pub fn collect_diff(repo: &Repository, scope: DiffScope) -> Result<DiffSummary, CommitError> {
    collect_diff_for_paths(repo, scope, &[])
}

/// Collect the changes for `scope` under the given pathspecs.
///
/// Same as [`collect_diff`] but restricted with `DiffOptions::pathspec()`,
/// like `git commit -- <paths>`. An empty slice means the whole tree.
pub fn collect_diff_for_paths(
    repo: &Repository,
    scope: DiffScope,
    paths: &[String],
) -> Result<DiffSummary, CommitError> {
    let head_tree = resolve_head_tree(repo)?;

    let mut opts = pathspec_options(paths);
    let diff = match scope {
        DiffScope::Staged => repo.diff_tree_to_index(head_tree.as_ref(), None, Some(&mut opts)),
        DiffScope::All => {
            opts.include_untracked(false);
            repo.diff_tree_to_workdir_with_index(head_tree.as_ref(), Some(&mut opts))
        }
    }
    .map_err(CommitError::DiffFailed)?;

    let mut changed_files = collect_files_from_diff(&diff);
    changed_files.sort_by(|a, b| a.path.cmp(&b.path));
    changed_files.dedup_by(|a, b| a.path == b.path);

    if changed_files.is_empty() {
        return Err(CommitError::NoChanges);
    }

    let (diff_text, additions, deletions) = render_patch(&diff);
    if diff_text.trim().is_empty() {
        return Err(CommitError::NoChanges);
    }

    Ok(DiffSummary {
        scope,
        diff_text,
        changed_files,
        additions,
        deletions,
        status: porcelain_status(repo),
    })
}

/// Short status of every non-ignored entry, as `git status --porcelain=v1`.
///
/// Status is extra context only, so a failure is logged and yields nothing.
fn porcelain_status(repo: &Repository) -> Vec<String> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false);

    let statuses = match repo.statuses(Some(&mut opts)) {
        Ok(statuses) => statuses,
        Err(e) => {
            warn!("Failed to read repository status: {e}");
            return Vec::new();
        }
    };

    statuses
        .iter()
        .filter_map(|entry| {
            let code = porcelain_code(entry.status())?;
            let path = entry.path()?;
            Some(format!("{code} {path}"))
        })
        .collect()
}

/// Two-column `XY` code: index state then worktree state.
fn porcelain_code(status: Status) -> Option<String> {
    if status.is_ignored() {
        return None;
    }
    if status.is_conflicted() {
        return Some("UU".to_string());
    }
    if status == Status::WT_NEW {
        return Some("??".to_string());
    }

    let index = if status.is_index_new() {
        'A'
    } else if status.is_index_modified() {
        'M'
    } else if status.is_index_deleted() {
        'D'
    } else if status.is_index_renamed() {
        'R'
    } else if status.is_index_typechange() {
        'T'
    } else {
        ' '
    };
    let worktree = if status.is_wt_modified() {
        'M'
    } else if status.is_wt_deleted() {
        'D'
    } else if status.is_wt_renamed() {
        'R'
    } else if status.is_wt_typechange() {
        'T'
    } else {
        ' '
    };

    (index != ' ' || worktree != ' ').then(|| format!("{index}{worktree}"))
}

/// Cut `text` to at most `max_chars` characters plus [`TRUNCATION_MARKER`].
///
/// Returns the text unchanged and `false` when it already fits.
pub fn truncate_context(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            let mut cut = text[..byte_idx].to_string();
            cut.push_str(TRUNCATION_MARKER);
            (cut, true)
        }
        None => (text.to_string(), false),
    }
}

fn collect_files_from_diff(diff: &Diff<'_>) -> Vec<ChangedFile> {
    diff.deltas()
        .filter_map(|delta| {
            let status = match delta.status() {
                Delta::Added => FileStatus::Added,
                Delta::Deleted => FileStatus::Deleted,
                Delta::Renamed => FileStatus::Renamed,
                Delta::Unmodified | Delta::Ignored | Delta::Untracked => return None,
                _ => FileStatus::Modified,
            };

            let new_path = delta
                .new_file()
                .path()
                .map(|p| p.to_string_lossy().to_string());
            let old_path = delta
                .old_file()
                .path()
                .map(|p| p.to_string_lossy().to_string());

            let (path, old_path) = match status {
                FileStatus::Renamed => (new_path.clone().or_else(|| old_path.clone())?, old_path),
                _ => (new_path.or(old_path)?, None),
            };
            Some(ChangedFile { path, status, old_path })
        })
        .collect()
}

/// Render the diff as patch text and count added and removed lines.
fn render_patch(diff: &Diff<'_>) -> (String, usize, usize) {
    let mut text = String::new();
    let mut additions = 0usize;
    let mut deletions = 0usize;

    if let Err(e) = diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        let origin = line.origin();
        match origin {
            '+' => additions += 1,
            '-' => deletions += 1,
            _ => {}
        }

        // Include the origin character for context
        if origin == '+' || origin == '-' || origin == ' ' {
            text.push(origin);
        }
        text.push_str(&String::from_utf8_lossy(line.content()));
        true
    }) {
        warn!("Failed to render diff text: {e}");
    }

    (text, additions, deletions)
}
