//! Rendering of apply results for humans (PR comment) and machines (JSON).
//!
//! The rendered comment never contains a line-leading code fence tagged
//! `diff`, so posting it cannot trigger another run.

use serde::Serialize;

use crate::apply::{ApplyResult, FailureStage, PatchOutcome, PushStatus};
use crate::extract::CandidatePatch;

/// Overall outcome, as distinguished in the posted comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// The comment had no usable patch blocks
    NoPatches,
    /// Patches were found but none applied
    NoneApplied,
    /// Patches applied but the tree ended up unchanged
    NoChanges,
    /// At least one patch applied and the tree changed
    Applied,
}

pub struct Report<'a> {
    pub candidates: &'a [CandidatePatch],
    /// `None` when there was nothing to apply
    pub result: Option<&'a ApplyResult>,
}

impl<'a> Report<'a> {
    pub fn new(candidates: &'a [CandidatePatch], result: Option<&'a ApplyResult>) -> Self {
        Self { candidates, result }
    }

    pub fn kind(&self) -> ReportKind {
        match self.result {
            None => ReportKind::NoPatches,
            Some(result) if result.total() == 0 => ReportKind::NoPatches,
            Some(result) if result.applied_count == 0 => ReportKind::NoneApplied,
            Some(result) if !result.has_tree_changes => ReportKind::NoChanges,
            Some(_) => ReportKind::Applied,
        }
    }

    /// Markdown body for the PR comment.
    pub fn render_markdown(&self) -> String {
        let mut lines: Vec<String> = vec!["### fencepatch".to_string(), String::new()];

        let result = match (self.kind(), self.result) {
            (ReportKind::NoPatches, _) | (_, None) => {
                lines.push(
                    "No applicable patches were found in this comment. \
                     Patches must be in code blocks tagged `diff` or `patch`."
                        .to_string(),
                );
                return lines.join("\n");
            }
            (kind, Some(result)) => {
                lines.push(headline(kind, result));
                result
            }
        };

        if let Some(line) = commit_line(result) {
            lines.push(String::new());
            lines.push(line);
            if let PushStatus::Failed { reason } = &result.push {
                push_text_block(&mut lines, reason);
            }
        }

        if !result.preexisting_changes.is_empty() {
            lines.push(String::new());
            lines.push(preexisting_line(result));
        }

        if result.cancelled {
            lines.push(String::new());
            lines.push("The run was cancelled; remaining patches were skipped.".to_string());
        }

        lines.push(String::new());
        lines.push("| Patch | Files | Result |".to_string());
        lines.push("|---|---|---|".to_string());
        for outcome in &result.outcomes {
            lines.push(format!(
                "| #{} | {} | {} |",
                outcome.index + 1,
                self.files_cell(outcome.index),
                result_cell(outcome)
            ));
        }

        for outcome in result.failures() {
            if outcome.failure_stage == Some(FailureStage::Cancelled) {
                continue;
            }
            let Some(reason) = outcome.failure_reason.as_deref() else {
                continue;
            };
            lines.push(String::new());
            lines.push(format!(
                "<details><summary>Patch #{} diagnostics</summary>",
                outcome.index + 1
            ));
            push_text_block(&mut lines, reason);
            lines.push(String::new());
            lines.push("</details>".to_string());
        }

        lines.join("\n")
    }

    fn files_cell(&self, index: usize) -> String {
        let paths = self
            .candidates
            .iter()
            .find(|candidate| candidate.index == index)
            .map(CandidatePatch::target_paths)
            .unwrap_or_default();
        if paths.is_empty() {
            return "-".to_string();
        }
        paths
            .iter()
            .map(|path| format!("`{}`", path))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Machine-readable summary for `--json` output.
    pub fn summary(&self) -> Summary<'a> {
        Summary {
            kind: self.kind(),
            candidates: self.candidates.len(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            result: self.result,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Summary<'a> {
    pub kind: ReportKind,
    pub candidates: usize,
    pub generated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<&'a ApplyResult>,
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        "patch"
    } else {
        "patches"
    }
}

fn headline(kind: ReportKind, result: &ApplyResult) -> String {
    let total = result.total();
    match kind {
        ReportKind::NoneApplied => {
            format!("Found {} {}, but none could be applied.", total, plural(total))
        }
        ReportKind::NoChanges => format!(
            "Applied {} of {} {}, but the working tree is unchanged \
             (all patches were no-ops). Nothing was committed.",
            result.applied_count,
            total,
            plural(total)
        ),
        _ => format!(
            "Applied {} of {} {}.",
            result.applied_count,
            total,
            plural(total)
        ),
    }
}

fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

fn commit_line(result: &ApplyResult) -> Option<String> {
    let sha = short_sha(result.commit.as_deref()?);
    let partial = if result.applied_count == 0 {
        "Partial hunks from rejected patches were committed as"
    } else {
        "Committed"
    };
    Some(match &result.push {
        PushStatus::Pushed { remote, .. } => {
            format!("{} `{}` and pushed to `{}`.", partial, sha, remote)
        }
        PushStatus::Disabled => format!("{} `{}` locally; pushing is disabled.", partial, sha),
        PushStatus::Failed { .. } => {
            format!("{} `{}` locally, but the push failed:", partial, sha)
        }
        PushStatus::NotAttempted => format!("{} `{}`.", partial, sha),
    })
}

fn preexisting_line(result: &ApplyResult) -> String {
    let paths = result
        .preexisting_changes
        .iter()
        .map(|path| format!("`{}`", path))
        .collect::<Vec<_>>()
        .join(", ");
    if result.commit.is_some() {
        format!(
            "Note: the working tree already had uncommitted changes in {}; they are part of this commit.",
            paths
        )
    } else {
        format!(
            "Note: the working tree already had uncommitted changes in {}.",
            paths
        )
    }
}

fn result_cell(outcome: &PatchOutcome) -> String {
    if outcome.applied {
        return "applied".to_string();
    }
    if outcome.already_applied {
        return "already applied".to_string();
    }
    let mut cell = match outcome.failure_stage {
        Some(FailureStage::Cancelled) => return "skipped (cancelled)".to_string(),
        Some(FailureStage::Apply) => "failed (apply)".to_string(),
        Some(FailureStage::Check) | None => "failed (check)".to_string(),
    };
    if outcome.reject_attempted {
        cell.push_str(", partial apply attempted");
    }
    cell
}

/// Append `text` inside a `text` fence, neutralising any fences inside it.
fn push_text_block(lines: &mut Vec<String>, text: &str) {
    lines.push(String::new());
    lines.push("```text".to_string());
    for line in text.trim_end().lines() {
        lines.push(line.replace("```", "'''"));
    }
    lines.push("```".to_string());
}
