//! Where reports go and what happens after a push.

use anyhow::Result;
use async_trait::async_trait;

use crate::github::{create_issue_comment, dispatch_workflow};

/// Receives the rendered report for a pull request.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, repo: &str, pr_number: u64, body: &str) -> Result<()>;
}

/// Triggers CI on the pushed branch.
#[async_trait]
pub trait RerunSink: Send + Sync {
    /// `false` when no re-run is configured.
    async fn rerun(&self, repo: &str, branch: &str) -> Result<bool>;
}

/// Posts the report as a PR conversation comment via `gh`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GhCommentSink;

#[async_trait]
impl NotificationSink for GhCommentSink {
    async fn notify(&self, repo: &str, pr_number: u64, body: &str) -> Result<()> {
        let comment = create_issue_comment(repo, pr_number, body).await?;
        tracing::info!(
            repo,
            pr_number,
            comment_id = comment.id,
            url = comment.html_url.as_deref().unwrap_or(""),
            "posted report"
        );
        Ok(())
    }
}

/// Prints the report instead of posting it.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

#[async_trait]
impl NotificationSink for StdoutSink {
    async fn notify(&self, _repo: &str, _pr_number: u64, body: &str) -> Result<()> {
        println!("{}", body);
        Ok(())
    }
}

/// `gh workflow run <workflow> --ref <branch>`
#[derive(Debug, Clone)]
pub struct GhWorkflowRerun {
    pub workflow: String,
}

#[async_trait]
impl RerunSink for GhWorkflowRerun {
    async fn rerun(&self, repo: &str, branch: &str) -> Result<bool> {
        dispatch_workflow(repo, &self.workflow, branch).await?;
        tracing::info!(repo, branch, workflow = %self.workflow, "dispatched workflow");
        Ok(true)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoRerun;

#[async_trait]
impl RerunSink for NoRerun {
    async fn rerun(&self, _repo: &str, _branch: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Rerun sink for the configured workflow name; empty disables.
pub fn rerun_sink(workflow: &str) -> Box<dyn RerunSink> {
    if workflow.trim().is_empty() {
        Box::new(NoRerun)
    } else {
        Box::new(GhWorkflowRerun {
            workflow: workflow.trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_workflow_disables_rerun() {
        let sink = rerun_sink("  ");
        assert!(!sink.rerun("o/r", "main").await.unwrap());
    }

    #[tokio::test]
    async fn test_stdout_sink_never_fails() {
        StdoutSink.notify("o/r", 1, "hello").await.unwrap();
    }
}
