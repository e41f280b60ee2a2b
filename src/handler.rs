//! Comment handling: decide, extract, apply, report.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::apply::{ApplyOptions, ApplyResult, PatchApplier, PushStatus};
use crate::extract::{contains_diff_fence, extract};
use crate::github::{fetch_pr_head, CommentEvent};
use crate::report::Report;
use crate::sink::{NotificationSink, RerunSink};

/// Whether a comment is worth looking at: written by the patch bot, or
/// carrying a ```diff block. An empty `bot_name` matches no author.
pub fn should_process(author: &str, body: &str, bot_name: &str) -> bool {
    let bot_name = bot_name.trim();
    let by_bot = !bot_name.is_empty()
        && author
            .to_lowercase()
            .contains(&bot_name.to_lowercase());
    by_bot || contains_diff_fence(body)
}

pub struct HandlerContext {
    /// Checkout of the PR head branch
    pub tree: PathBuf,
    /// The push branch is filled in per event
    pub options: ApplyOptions,
    pub bot_name: String,
    pub notifier: Box<dyn NotificationSink>,
    pub rerun: Box<dyn RerunSink>,
    pub cancel: CancellationToken,
}

#[derive(Debug)]
pub enum HandlerOutcome {
    /// Not a patch comment
    Ignored,
    /// Looked like a patch comment but had no usable blocks
    NoPatches { reported: bool },
    Processed {
        result: ApplyResult,
        rerun_triggered: bool,
    },
}

/// Run the full flow for one comment.
///
/// An [`crate::apply::ApplyError`] is reported to the PR (best effort) and
/// then returned.
pub async fn handle_comment(event: &CommentEvent, ctx: &HandlerContext) -> Result<HandlerOutcome> {
    if !should_process(&event.author, &event.body, &ctx.bot_name) {
        debug!(author = %event.author, "comment ignored");
        return Ok(HandlerOutcome::Ignored);
    }

    let candidates = extract(&event.body);
    if candidates.is_empty() {
        // Bot comments without any diff block are ordinary review chatter
        let reported = contains_diff_fence(&event.body);
        if reported {
            let body = Report::new(&candidates, None).render_markdown();
            notify(ctx, event, &body).await;
        }
        info!(repo = %event.repo, pr = event.pr_number, "no patches in comment");
        return Ok(HandlerOutcome::NoPatches { reported });
    }

    let branch = resolve_branch(event, &ctx.options).await?;
    let mut options = ctx.options.clone();
    if let Some(target) = options.push.as_mut() {
        target.branch = branch.clone();
    }
    info!(
        repo = %event.repo,
        pr = event.pr_number,
        candidates = candidates.len(),
        branch = branch.as_deref().unwrap_or("HEAD"),
        "applying patches"
    );

    let applier = PatchApplier::new(options).with_cancellation(ctx.cancel.clone());
    let result = match applier.apply(&ctx.tree, &candidates).await {
        Ok(result) => result,
        Err(e) => {
            let body = format!(
                "### fencepatch\n\nCould not apply patches: {}",
                e.to_string().replace("```", "'''")
            );
            notify(ctx, event, &body).await;
            return Err(e).context("failed to apply patches");
        }
    };

    let body = Report::new(&candidates, Some(&result)).render_markdown();
    notify(ctx, event, &body).await;

    let mut rerun_triggered = false;
    if let (PushStatus::Pushed { .. }, Some(branch)) = (&result.push, branch.as_deref()) {
        match ctx.rerun.rerun(&event.repo, branch).await {
            Ok(triggered) => rerun_triggered = triggered,
            Err(e) => warn!(error = %e, "failed to trigger re-run"),
        }
    }

    Ok(HandlerOutcome::Processed {
        result,
        rerun_triggered,
    })
}

/// Head branch from the payload, or looked up for issue comments. Not
/// needed when pushing is off.
async fn resolve_branch(event: &CommentEvent, options: &ApplyOptions) -> Result<Option<String>> {
    if let Some(branch) = &event.head_branch {
        return Ok(Some(branch.clone()));
    }
    if options.push.is_none() {
        return Ok(None);
    }
    let branch = fetch_pr_head(&event.repo, event.pr_number)
        .await
        .with_context(|| format!("failed to resolve head branch of PR #{}", event.pr_number))?;
    Ok(Some(branch))
}

async fn notify(ctx: &HandlerContext, event: &CommentEvent, body: &str) {
    if let Err(e) = ctx.notifier.notify(&event.repo, event.pr_number, body).await {
        warn!(repo = %event.repo, pr = event.pr_number, error = %e, "failed to post report");
    }
}
