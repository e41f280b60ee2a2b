use anyhow::Result;

use super::client::gh_command;

fn workflow_run_args<'a>(repo: &'a str, workflow: &'a str, branch: &'a str) -> Vec<&'a str> {
    vec!["workflow", "run", workflow, "--ref", branch, "-R", repo]
}

/// Dispatch `workflow` on `branch` (requires a `workflow_dispatch` trigger)
pub async fn dispatch_workflow(repo: &str, workflow: &str, branch: &str) -> Result<()> {
    gh_command(&workflow_run_args(repo, workflow, branch)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_run_args() {
        assert_eq!(
            workflow_run_args("o/r", "ci.yml", "feature/x"),
            vec!["workflow", "run", "ci.yml", "--ref", "feature/x", "-R", "o/r"]
        );
    }
}
