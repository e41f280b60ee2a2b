//! Async wrapper around the `git` CLI.
//!
//! Every invocation runs with an explicit `current_dir`; nothing here touches
//! the process-wide working directory, so several trees can be handled from
//! the same process at once.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Pathspec that keeps `git apply --reject` leftovers out of status and staging.
pub const EXCLUDE_REJECTS: &str = ":(exclude)*.rej";

#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to spawn git {args}: {source}")]
    Spawn {
        args: String,
        #[source]
        source: std::io::Error,
    },
    #[error("git {args} failed: {stderr}")]
    Failed { args: String, stderr: String },
}

impl GitError {
    /// `git` itself could not be found
    pub fn is_not_found(&self) -> bool {
        matches!(self, GitError::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Captured output of a git invocation that is allowed to fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// The text worth showing to an operator: stderr, else stdout.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        "git exited with a non-zero status and no output".to_string()
    }
}

/// `git apply` のモード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Validate only (`--check`)
    Check,
    /// Validate the patch in reverse, i.e. "is it already applied?"
    ReverseCheck,
    /// Apply for real
    Apply,
    /// Apply what fits and leave `.rej` files for the rest
    Reject,
}

impl ApplyMode {
    fn flags(self) -> &'static [&'static str] {
        match self {
            ApplyMode::Check => &["--check"],
            ApplyMode::ReverseCheck => &["--check", "--reverse"],
            ApplyMode::Apply => &[],
            ApplyMode::Reject => &["--reject"],
        }
    }
}

/// Where a commit gets pushed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTarget {
    pub remote: String,
    /// Remote branch; `None` pushes `HEAD` to the same-named branch
    pub branch: Option<String>,
}

impl PushTarget {
    pub fn refspec(&self) -> String {
        match &self.branch {
            Some(branch) => format!("HEAD:refs/heads/{}", branch),
            None => "HEAD".to_string(),
        }
    }
}

/// Comparable view of the tree's uncommitted state.
///
/// Two snapshots compare equal when neither the status listing nor the
/// tracked-file diff against `HEAD` changed. Reject artifacts are excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeSnapshot {
    pub status: String,
    pub diff: String,
}

impl TreeSnapshot {
    /// Paths listed by `git status --porcelain`, new names for renames.
    pub fn changed_paths(&self) -> Vec<String> {
        self.status
            .lines()
            .filter(|line| line.len() > 3)
            .map(|line| {
                let path = &line[3..];
                let path = path.rsplit(" -> ").next().unwrap_or(path);
                unquote_path(path)
            })
            .collect()
    }
}

/// Undo git's C-style quoting for paths containing special characters.
///
/// `core.quotePath=false` is always set, so only the simple escapes remain.
fn unquote_path(path: &str) -> String {
    let Some(inner) = path
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return path.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// The git operations the applier needs. [`GitCli`] is the real one.
#[async_trait]
pub trait GitBackend: Send + Sync {
    /// Absolute path of the repository's git dir (`.git`).
    async fn git_dir(&self, tree: &Path) -> Result<PathBuf, GitError>;

    /// Run `git apply` in the given mode. A rejected patch is `Ok` with
    /// `success == false`; `Err` means git could not be run at all.
    async fn apply_patch(
        &self,
        tree: &Path,
        patch: &Path,
        mode: ApplyMode,
        extra_args: &[String],
    ) -> Result<CommandOutput, GitError>;

    async fn snapshot(&self, tree: &Path) -> Result<TreeSnapshot, GitError>;

    /// Untracked `*.rej` files, relative to the tree root.
    async fn reject_files(&self, tree: &Path) -> Result<Vec<String>, GitError>;

    /// Stage everything except reject artifacts.
    async fn stage_all(&self, tree: &Path) -> Result<(), GitError>;

    /// Paths whose staged content differs from `HEAD`, reject artifacts excluded.
    async fn staged_paths(&self, tree: &Path) -> Result<Vec<String>, GitError>;

    /// Commit the index and return the new commit id.
    async fn commit(&self, tree: &Path, message: &str) -> Result<String, GitError>;

    async fn push(&self, tree: &Path, target: &PushTarget) -> Result<CommandOutput, GitError>;
}

/// [`GitBackend`] that shells out to the `git` binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            program: PathBuf::from("git"),
        }
    }
}

impl GitCli {
    /// Resolve `git` on `PATH` up front so a missing binary is reported early.
    pub fn locate() -> Result<Self, which::Error> {
        Ok(Self {
            program: which::which("git")?,
        })
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, tree: &Path, args: &[&str]) -> Result<CommandOutput, GitError> {
        debug!(tree = %tree.display(), ?args, "running git");

        let mut command = Command::new(&self.program);
        // Raw UTF-8 paths in status / ls-files output
        command.args(["-c", "core.quotePath=false"]);
        command
            .args(args)
            .current_dir(tree)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true);

        let output = command.output().await.map_err(|source| GitError::Spawn {
            args: args.join(" "),
            source,
        })?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn run_checked(&self, tree: &Path, args: &[&str]) -> Result<String, GitError> {
        let output = self.run(tree, args).await?;
        if !output.success {
            return Err(GitError::Failed {
                args: args.join(" "),
                stderr: output.diagnostic(),
            });
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl GitBackend for GitCli {
    async fn git_dir(&self, tree: &Path) -> Result<PathBuf, GitError> {
        let stdout = self
            .run_checked(tree, &["rev-parse", "--absolute-git-dir"])
            .await?;
        Ok(PathBuf::from(stdout.trim()))
    }

    async fn apply_patch(
        &self,
        tree: &Path,
        patch: &Path,
        mode: ApplyMode,
        extra_args: &[String],
    ) -> Result<CommandOutput, GitError> {
        let patch = patch.to_string_lossy();
        let mut args: Vec<&str> = vec!["apply"];
        args.extend_from_slice(mode.flags());
        args.extend(extra_args.iter().map(String::as_str));
        args.push(patch.as_ref());
        self.run(tree, &args).await
    }

    async fn snapshot(&self, tree: &Path) -> Result<TreeSnapshot, GitError> {
        let status = self
            .run_checked(
                tree,
                &[
                    "status",
                    "--porcelain=v1",
                    "--untracked-files=all",
                    "--",
                    ".",
                    EXCLUDE_REJECTS,
                ],
            )
            .await?;

        // An unborn HEAD has nothing to diff against; status alone decides then.
        let diff = self
            .run(tree, &["diff", "HEAD", "--binary", "--", ".", EXCLUDE_REJECTS])
            .await?;
        let diff = if diff.success {
            diff.stdout
        } else {
            debug!(stderr = %diff.stderr.trim(), "git diff HEAD unavailable");
            String::new()
        };

        Ok(TreeSnapshot { status, diff })
    }

    async fn reject_files(&self, tree: &Path) -> Result<Vec<String>, GitError> {
        let stdout = self
            .run_checked(tree, &["ls-files", "--others", "--", "*.rej"])
            .await?;
        Ok(stdout
            .lines()
            .map(|line| unquote_path(line.trim()))
            .filter(|line| !line.is_empty())
            .collect())
    }

    async fn stage_all(&self, tree: &Path) -> Result<(), GitError> {
        self.run_checked(tree, &["add", "--all", "--", ".", EXCLUDE_REJECTS])
            .await?;
        Ok(())
    }

    async fn staged_paths(&self, tree: &Path) -> Result<Vec<String>, GitError> {
        let stdout = self
            .run_checked(
                tree,
                &["diff", "--cached", "--name-only", "--", ".", EXCLUDE_REJECTS],
            )
            .await?;
        Ok(stdout
            .lines()
            .map(|line| unquote_path(line.trim()))
            .filter(|line| !line.is_empty())
            .collect())
    }

    async fn commit(&self, tree: &Path, message: &str) -> Result<String, GitError> {
        self.run_checked(tree, &["commit", "--quiet", "-m", message])
            .await?;
        let sha = self.run_checked(tree, &["rev-parse", "HEAD"]).await?;
        Ok(sha.trim().to_string())
    }

    async fn push(&self, tree: &Path, target: &PushTarget) -> Result<CommandOutput, GitError> {
        let refspec = target.refspec();
        self.run(tree, &["push", &target.remote, &refspec]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changed_paths_parses_porcelain() {
        let snapshot = TreeSnapshot {
            status: " M src/lib.rs\n?? new file.txt\nR  old.rs -> renamed.rs\nA  \"tab\\there.txt\"\n"
                .to_string(),
            diff: String::new(),
        };
        assert_eq!(
            snapshot.changed_paths(),
            vec![
                "src/lib.rs".to_string(),
                "new file.txt".to_string(),
                "renamed.rs".to_string(),
                "tab\there.txt".to_string(),
            ]
        );
        assert!(TreeSnapshot::default().changed_paths().is_empty());
    }

    #[test]
    fn test_push_refspec() {
        let explicit = PushTarget {
            remote: "origin".to_string(),
            branch: Some("feature/x".to_string()),
        };
        assert_eq!(explicit.refspec(), "HEAD:refs/heads/feature/x");

        let implicit = PushTarget {
            remote: "origin".to_string(),
            branch: None,
        };
        assert_eq!(implicit.refspec(), "HEAD");
    }

    #[test]
    fn test_diagnostic_prefers_stderr() {
        let output = CommandOutput {
            success: false,
            stdout: "out".to_string(),
            stderr: "  error: patch failed\n".to_string(),
        };
        assert_eq!(output.diagnostic(), "error: patch failed");

        let quiet = CommandOutput {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert!(!quiet.diagnostic().is_empty());
    }

    #[tokio::test]
    async fn test_missing_program_is_reported_as_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitCli::with_program("__fencepatch_missing_git__");
        let err = git.git_dir(dir.path()).await.unwrap_err();
        assert!(err.is_not_found(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_git_dir_outside_repository_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = GitCli::default().git_dir(dir.path()).await.unwrap_err();
        assert!(matches!(err, GitError::Failed { .. }), "unexpected error: {err}");
    }
}
