//! Application of extracted patches to a git working tree.
//!
//! Candidates are processed strictly in order and independently of each
//! other: every one is checked with `git apply --check`, applied when the
//! check passes, and otherwise given a best-effort `--reject` pass. Later
//! candidates see whatever earlier ones wrote. Once the loop is done the
//! tree is compared with its state before the run; only a real difference
//! is committed and pushed.

mod artifact;
mod outcome;

pub use outcome::{ApplyError, ApplyResult, FailureStage, PatchOutcome, PushStatus};

use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::extract::CandidatePatch;
use crate::git::{ApplyMode, GitBackend, GitCli, GitError, PushTarget};
use artifact::PatchArtifact;

pub const DEFAULT_COMMIT_MESSAGE: &str =
    "Apply {applied} patch(es) from PR comment ({failed} failed)";

/// Knobs for a [`PatchApplier`].
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Run `git apply --reject` after a failed candidate
    pub reject_mode: bool,
    /// Leave `.rej` files in the tree instead of deleting them
    pub keep_reject_files: bool,
    /// Extra arguments for every `git apply` invocation
    pub extra_args: Vec<String>,
    /// Commit message template; `{applied}`, `{failed}` and `{total}` are substituted
    pub commit_message: String,
    /// `None` disables pushing
    pub push: Option<PushTarget>,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            reject_mode: true,
            keep_reject_files: false,
            extra_args: Vec::new(),
            commit_message: DEFAULT_COMMIT_MESSAGE.to_string(),
            push: Some(PushTarget {
                remote: "origin".to_string(),
                branch: None,
            }),
        }
    }
}

impl ApplyOptions {
    /// Options from the loaded config, pushing to `branch` when given.
    pub fn from_config(config: &Config, branch: Option<String>) -> Self {
        let push = config.git.push.then(|| PushTarget {
            remote: config.git.remote.clone(),
            branch,
        });
        Self {
            reject_mode: config.apply.reject_mode,
            keep_reject_files: config.apply.keep_reject_files,
            extra_args: config.apply.extra_args.clone(),
            commit_message: config.apply.commit_message.clone(),
            push,
        }
    }
}

/// Fill in the commit message template.
pub fn render_commit_message(template: &str, applied: usize, failed: usize) -> String {
    template
        .replace("{applied}", &applied.to_string())
        .replace("{failed}", &failed.to_string())
        .replace("{total}", &(applied + failed).to_string())
}

pub struct PatchApplier {
    backend: Box<dyn GitBackend>,
    options: ApplyOptions,
    cancel: CancellationToken,
}

impl PatchApplier {
    /// Applier using the `git` found on `PATH`.
    pub fn new(options: ApplyOptions) -> Self {
        // A missing binary surfaces as ApplyError::GitNotFound on first use
        let git = GitCli::locate().unwrap_or_default();
        Self::with_backend(Box::new(git), options)
    }

    pub fn with_backend(backend: Box<dyn GitBackend>, options: ApplyOptions) -> Self {
        Self {
            backend,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop before the next candidate once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn options(&self) -> &ApplyOptions {
        &self.options
    }

    /// Apply `candidates` to the working tree at `tree`.
    ///
    /// Per-candidate failures end up in [`PatchOutcome`]s; only problems with
    /// the tree itself (or with git) return an [`ApplyError`].
    pub async fn apply(
        &self,
        tree: &Path,
        candidates: &[CandidatePatch],
    ) -> Result<ApplyResult, ApplyError> {
        let git_dir = self.check_environment(tree).await?;
        let before = self.backend.snapshot(tree).await?;
        let preexisting_changes = before.changed_paths();
        if !preexisting_changes.is_empty() {
            warn!(
                tree = %tree.display(),
                paths = ?preexisting_changes,
                "working tree has uncommitted changes before applying"
            );
        }

        let mut outcomes = Vec::with_capacity(candidates.len());
        let mut cancelled = false;
        for candidate in candidates {
            if !cancelled && self.cancel.is_cancelled() {
                warn!(index = candidate.index, "cancelled, skipping remaining patches");
                cancelled = true;
            }
            if cancelled {
                outcomes.push(PatchOutcome::cancelled(candidate.index));
                continue;
            }
            outcomes.push(self.apply_candidate(tree, &git_dir, candidate).await?);
        }

        let applied_count = outcomes.iter().filter(|o| o.applied).count();
        let failed_count = outcomes.len() - applied_count;

        let unchanged = ApplyResult {
            applied_count,
            failed_count,
            has_tree_changes: false,
            changed_files: Vec::new(),
            preexisting_changes,
            commit: None,
            push: PushStatus::NotAttempted,
            cancelled,
            outcomes,
        };

        let after = self.backend.snapshot(tree).await?;
        if after == before {
            info!(applied_count, failed_count, "no tree changes, nothing to commit");
            return Ok(unchanged);
        }

        // The tree moved but may have landed back on HEAD, e.g. a patch
        // undoing an uncommitted edit. Only a non-empty index is committed.
        self.backend.stage_all(tree).await?;
        if self.backend.staged_paths(tree).await?.is_empty() {
            info!(applied_count, failed_count, "tree matches HEAD, nothing to commit");
            return Ok(unchanged);
        }

        let changed_files = after.changed_paths();
        let message =
            render_commit_message(&self.options.commit_message, applied_count, failed_count);
        let commit = self.backend.commit(tree, &message).await?;
        info!(%commit, files = changed_files.len(), "committed patch changes");

        let push = self.push(tree).await;

        Ok(ApplyResult {
            has_tree_changes: true,
            changed_files,
            commit: Some(commit),
            push,
            ..unchanged
        })
    }

    /// Validate the tree and return its git dir.
    async fn check_environment(&self, tree: &Path) -> Result<PathBuf, ApplyError> {
        let metadata = match tokio::fs::metadata(tree).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ApplyError::TreeMissing(tree.to_path_buf()));
            }
            Err(source) => {
                return Err(ApplyError::Inaccessible {
                    path: tree.to_path_buf(),
                    source,
                });
            }
        };
        if !metadata.is_dir() {
            return Err(ApplyError::NotADirectory(tree.to_path_buf()));
        }
        // Mode bits alone miss trees owned by another user
        if let Err(e) = tempfile::tempfile_in(tree) {
            return Err(match e.kind() {
                std::io::ErrorKind::PermissionDenied => ApplyError::ReadOnly(tree.to_path_buf()),
                _ if metadata.permissions().readonly() => ApplyError::ReadOnly(tree.to_path_buf()),
                _ => ApplyError::Inaccessible {
                    path: tree.to_path_buf(),
                    source: e,
                },
            });
        }

        match self.backend.git_dir(tree).await {
            Ok(git_dir) => Ok(git_dir),
            Err(e) if e.is_not_found() => Err(ApplyError::GitNotFound),
            Err(GitError::Failed { stderr, .. }) => Err(ApplyError::NotARepository {
                path: tree.to_path_buf(),
                reason: stderr,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn apply_candidate(
        &self,
        tree: &Path,
        git_dir: &Path,
        candidate: &CandidatePatch,
    ) -> Result<PatchOutcome, ApplyError> {
        let index = candidate.index;
        let artifact =
            PatchArtifact::create(git_dir, candidate).map_err(|source| ApplyError::Artifact {
                index,
                source,
            })?;
        debug!(index, path = %artifact.path().display(), "wrote patch artifact");

        let extra = &self.options.extra_args;
        let check = self
            .backend
            .apply_patch(tree, artifact.path(), ApplyMode::Check, extra)
            .await?;

        let outcome = if !check.success {
            let reason = check.diagnostic();
            warn!(index, %reason, "patch failed validation");
            let mut outcome = PatchOutcome::failed(index, FailureStage::Check, reason);
            self.recover(tree, artifact.path(), &mut outcome).await?;
            outcome
        } else {
            let applied = self
                .backend
                .apply_patch(tree, artifact.path(), ApplyMode::Apply, extra)
                .await?;
            if applied.success {
                info!(index, "patch applied");
                PatchOutcome::applied(index)
            } else {
                let reason = applied.diagnostic();
                error!(index, %reason, "patch failed to apply after a successful check");
                let mut outcome = PatchOutcome::failed(index, FailureStage::Apply, reason);
                self.recover(tree, artifact.path(), &mut outcome).await?;
                outcome
            }
        };

        artifact.close();
        Ok(outcome)
    }

    /// Failure path shared by check and apply failures.
    ///
    /// A patch that applies in reverse is already present and is left alone;
    /// anything else gets a `--reject` pass when enabled. Neither turns the
    /// outcome into a success.
    async fn recover(
        &self,
        tree: &Path,
        patch: &Path,
        outcome: &mut PatchOutcome,
    ) -> Result<(), ApplyError> {
        let extra = &self.options.extra_args;
        let reverse = self
            .backend
            .apply_patch(tree, patch, ApplyMode::ReverseCheck, extra)
            .await?;
        if reverse.success {
            info!(index = outcome.index, "patch is already applied");
            outcome.already_applied = true;
            return Ok(());
        }

        if !self.options.reject_mode {
            return Ok(());
        }

        let existing = self.backend.reject_files(tree).await?;
        outcome.reject_attempted = true;
        let reject = self
            .backend
            .apply_patch(tree, patch, ApplyMode::Reject, extra)
            .await?;
        if reject.success {
            info!(index = outcome.index, "reject pass applied every hunk");
        } else {
            debug!(index = outcome.index, diagnostic = %reject.diagnostic(), "reject pass incomplete");
        }

        let created: Vec<String> = self
            .backend
            .reject_files(tree)
            .await?
            .into_iter()
            .filter(|path| !existing.contains(path))
            .collect();

        if !self.options.keep_reject_files {
            for path in &created {
                if let Err(e) = tokio::fs::remove_file(tree.join(path)).await {
                    warn!(path = %path, error = %e, "failed to remove reject file");
                }
            }
        }
        outcome.reject_files = created;
        Ok(())
    }

    async fn push(&self, tree: &Path) -> PushStatus {
        let Some(target) = &self.options.push else {
            return PushStatus::Disabled;
        };

        match self.backend.push(tree, target).await {
            Ok(output) if output.success => {
                info!(remote = %target.remote, refspec = %target.refspec(), "pushed");
                PushStatus::Pushed {
                    remote: target.remote.clone(),
                    refspec: target.refspec(),
                }
            }
            Ok(output) => {
                let reason = output.diagnostic();
                error!(remote = %target.remote, %reason, "push failed");
                PushStatus::Failed { reason }
            }
            Err(e) => {
                error!(remote = %target.remote, error = %e, "push failed");
                PushStatus::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
