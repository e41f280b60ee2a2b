use anyhow::{Context, Result};
use serde::Deserialize;

use super::client::gh_api;

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub head: Branch,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Branch {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: String,
}

pub async fn fetch_pr(repo: &str, pr_number: u64) -> Result<PullRequest> {
    let endpoint = format!("repos/{}/pulls/{}", repo, pr_number);
    let json = gh_api(&endpoint).await?;
    serde_json::from_value(json).context("Failed to parse PR response")
}

/// Head branch of a PR, for events whose payload does not carry it
pub async fn fetch_pr_head(repo: &str, pr_number: u64) -> Result<String> {
    Ok(fetch_pr(repo, pr_number).await?.head.ref_name)
}
