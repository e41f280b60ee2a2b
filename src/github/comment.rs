use anyhow::{Context, Result};
use serde::Deserialize;

use super::client::{gh_api_post, FieldValue};

#[derive(Debug, Clone, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    pub html_url: Option<String>,
}

/// PR の会話タブにコメントを投稿
pub async fn create_issue_comment(repo: &str, number: u64, body: &str) -> Result<IssueComment> {
    let endpoint = format!("repos/{}/issues/{}/comments", repo, number);
    let json = gh_api_post(&endpoint, &[("body", FieldValue::String(body))]).await?;
    serde_json::from_value(json).context("Failed to parse created comment response")
}
