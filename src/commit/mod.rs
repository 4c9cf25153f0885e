//! Thin git shell: collect the change set, generate a message, commit.

pub mod diff;
pub mod message;

pub use diff::{
    ChangedFile, DiffScope, DiffSummary, FileStatus, TRUNCATION_MARKER, collect_diff, collect_diff_for_paths, truncate_context,
};
pub use message::{
    GeneratedMessage, PreparedPrompt, create_commit, create_commit_for_paths, generate_commit_message, prepare_prompt,
};
