use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::git::GitError;

/// Where a candidate's application stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// `git apply --check` rejected the patch
    Check,
    /// The check passed but the real `git apply` failed
    Apply,
    /// Not attempted: the run was cancelled first
    Cancelled,
}

/// Result for a single candidate patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchOutcome {
    pub index: usize,
    pub applied: bool,
    /// Verbatim diagnostic from `git apply`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_stage: Option<FailureStage>,
    /// The patch applies cleanly in reverse, so its changes are already present
    pub already_applied: bool,
    /// A `git apply --reject` pass was run after the failure
    pub reject_attempted: bool,
    /// `.rej` files the reject pass left behind (removed unless configured otherwise)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reject_files: Vec<String>,
}

impl PatchOutcome {
    pub fn applied(index: usize) -> Self {
        Self {
            index,
            applied: true,
            failure_reason: None,
            failure_stage: None,
            already_applied: false,
            reject_attempted: false,
            reject_files: Vec::new(),
        }
    }

    pub fn failed(index: usize, stage: FailureStage, reason: String) -> Self {
        Self {
            index,
            applied: false,
            failure_reason: Some(reason),
            failure_stage: Some(stage),
            already_applied: false,
            reject_attempted: false,
            reject_files: Vec::new(),
        }
    }

    pub fn cancelled(index: usize) -> Self {
        Self::failed(
            index,
            FailureStage::Cancelled,
            "cancelled before attempt".to_string(),
        )
    }
}

/// What happened to the commit after it was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PushStatus {
    /// Nothing was committed, so nothing was pushed
    NotAttempted,
    /// Committed locally; pushing is switched off
    Disabled,
    Pushed { remote: String, refspec: String },
    Failed { reason: String },
}

impl PushStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, PushStatus::Failed { .. })
    }
}

/// Aggregate result of one [`PatchApplier::apply`](super::PatchApplier::apply) call.
///
/// `applied_count + failed_count` always equals the number of candidates.
/// `has_tree_changes` comes from comparing the tree before and after, so a
/// run whose patches all "applied" can still report no changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyResult {
    pub applied_count: usize,
    pub failed_count: usize,
    pub has_tree_changes: bool,
    /// Paths reported as changed by `git status` before committing
    pub changed_files: Vec<String>,
    /// Paths that already had uncommitted changes before the run; a commit
    /// includes them
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub preexisting_changes: Vec<String>,
    /// Id of the commit created for the changes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    pub push: PushStatus,
    /// The run stopped early because it was cancelled
    pub cancelled: bool,
    pub outcomes: Vec<PatchOutcome>,
}

impl ApplyResult {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn failures(&self) -> impl Iterator<Item = &PatchOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.applied)
    }
}

/// Tree-level failures that abort the whole run.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("working tree {} does not exist", .0.display())]
    TreeMissing(PathBuf),
    #[error("working tree {} is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("working tree {} is read-only", .0.display())]
    ReadOnly(PathBuf),
    #[error("cannot access working tree {}: {source}", .path.display())]
    Inaccessible {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("git executable not found")]
    GitNotFound,
    #[error("{} is not a git working tree: {reason}", .path.display())]
    NotARepository { path: PathBuf, reason: String },
    #[error("failed to write patch artifact for candidate {index}: {source}")]
    Artifact {
        index: usize,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Git(#[from] GitError),
}
