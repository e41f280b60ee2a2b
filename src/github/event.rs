//! Comment events from GitHub, normalised into [`CommentEvent`].
//!
//! The same bot runs either inside a GitHub Actions job (event payload in
//! `$GITHUB_EVENT_PATH`) or behind a GitHub App webhook. Both deliver the
//! same JSON shapes; the sources differ in where the event name comes from
//! and in what they require from the payload.

use serde::Deserialize;
use thiserror::Error;

/// A new comment on a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentEvent {
    /// owner/name
    pub repo: String,
    pub pr_number: u64,
    pub author: String,
    pub body: String,
    /// Only present for review comments; issue comments need a lookup
    pub head_branch: Option<String>,
    /// GitHub App installation that delivered the event
    pub installation_id: Option<u64>,
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("invalid {event} payload: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("webhook delivery for {0} has no installation id")]
    MissingInstallation(String),
}

/// Turns a raw event into a [`CommentEvent`].
pub trait CommentSource {
    fn name(&self) -> &'static str;

    /// `Ok(None)` for events that are not newly created PR comments.
    fn parse(&self, event_name: &str, payload: &str) -> Result<Option<CommentEvent>, EventError>;
}

/// Events delivered to a GitHub Actions job.
#[derive(Debug, Default, Clone, Copy)]
pub struct ActionsSource;

/// Events delivered to a GitHub App webhook (`X-GitHub-Event` header + body).
#[derive(Debug, Default, Clone, Copy)]
pub struct WebhookSource;

impl CommentSource for ActionsSource {
    fn name(&self) -> &'static str {
        "actions"
    }

    fn parse(&self, event_name: &str, payload: &str) -> Result<Option<CommentEvent>, EventError> {
        parse_comment_payload(event_name, payload)
    }
}

impl CommentSource for WebhookSource {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn parse(&self, event_name: &str, payload: &str) -> Result<Option<CommentEvent>, EventError> {
        let Some(event) = parse_comment_payload(event_name, payload)? else {
            return Ok(None);
        };
        if event.installation_id.is_none() {
            return Err(EventError::MissingInstallation(event_name.to_string()));
        }
        Ok(Some(event))
    }
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    action: String,
    comment: RawComment,
    #[serde(default)]
    issue: Option<RawIssue>,
    #[serde(default)]
    pull_request: Option<RawPullRequest>,
    repository: RawRepository,
    #[serde(default)]
    installation: Option<RawInstallation>,
}

#[derive(Debug, Deserialize)]
struct RawComment {
    #[serde(default)]
    body: Option<String>,
    user: RawUser,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    number: u64,
    /// Present only when the issue is a pull request
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawPullRequest {
    number: u64,
    head: RawHead,
}

#[derive(Debug, Deserialize)]
struct RawHead {
    #[serde(rename = "ref")]
    ref_name: String,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct RawInstallation {
    id: u64,
}

const ISSUE_COMMENT: &str = "issue_comment";
const REVIEW_COMMENT: &str = "pull_request_review_comment";

fn parse_comment_payload(
    event_name: &str,
    payload: &str,
) -> Result<Option<CommentEvent>, EventError> {
    if event_name != ISSUE_COMMENT && event_name != REVIEW_COMMENT {
        return Ok(None);
    }

    let raw: RawPayload = serde_json::from_str(payload).map_err(|source| EventError::Payload {
        event: event_name.to_string(),
        source,
    })?;
    if raw.action != "created" {
        return Ok(None);
    }

    let (pr_number, head_branch) = match (raw.pull_request, raw.issue) {
        (Some(pr), _) => (pr.number, Some(pr.head.ref_name)),
        (None, Some(issue)) if issue.pull_request.is_some() => (issue.number, None),
        // Comment on a plain issue
        _ => return Ok(None),
    };

    Ok(Some(CommentEvent {
        repo: raw.repository.full_name,
        pr_number,
        author: raw.comment.user.login,
        body: raw.comment.body.unwrap_or_default(),
        head_branch,
        installation_id: raw.installation.map(|i| i.id),
    }))
}
