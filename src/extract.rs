//! Extraction of unified-diff patches from free-text comments.
//!
//! A comment is scanned line by line. Fenced code blocks tagged `diff` or
//! `patch` are collected, and a block is kept only when at least one of its
//! lines looks like unified-diff content:
//! - file headers (`diff `, `--- `, `+++ `)
//! - hunk headers (`@@ `)
//! - added / removed lines (leading `+` / `-`)
//!
//! Fences are matched naively: the first bare closing marker ends the block,
//! and a block left open at the end of the comment is dropped.

use serde::{Deserialize, Serialize};

/// Markdown fence marker
const FENCE: &str = "```";

/// Language tags that turn a fence into a patch candidate
const PATCH_TAGS: &[&str] = &["diff", "patch"];

/// Line prefixes that mark unified-diff content
const DIFF_LINE_PREFIXES: &[&str] = &["diff ", "--- ", "+++ ", "@@ "];

/// A fenced patch block found in a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidatePatch {
    /// 0-based position among the emitted blocks
    pub index: usize,
    /// Fenced content, `\n`-joined, without the fence lines
    pub body: String,
}

impl CandidatePatch {
    /// Paths touched by this patch, taken from its `+++` headers.
    ///
    /// Deleted files (`+++ /dev/null`) fall back to the preceding `---` path.
    /// Used for reporting only; `git apply` does its own parsing.
    pub fn target_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = Vec::new();
        let mut pending_old: Option<&str> = None;

        for line in self.body.lines() {
            if let Some(rest) = line.strip_prefix("--- ") {
                pending_old = Some(rest);
            } else if let Some(rest) = line.strip_prefix("+++ ") {
                let chosen = if header_path(rest) == "/dev/null" {
                    pending_old.take()
                } else {
                    pending_old = None;
                    Some(rest)
                };
                if let Some(path) = chosen.map(strip_diff_prefix) {
                    if path != "/dev/null" && !paths.contains(&path) {
                        paths.push(path);
                    }
                }
            }
        }

        paths
    }
}

/// Drop the timestamp that traditional `diff -u` appends after a tab.
fn header_path(rest: &str) -> &str {
    rest.split('\t').next().unwrap_or(rest).trim_end()
}

/// Strip the single-char diff prefix (a/, b/, ...) from a header path.
fn strip_diff_prefix(rest: &str) -> String {
    let path = header_path(rest);
    if path.len() >= 2 && path.as_bytes()[1] == b'/' && path.as_bytes()[0] != b'/' {
        path[2..].to_string()
    } else {
        path.to_string()
    }
}

/// Whether a line looks like unified-diff content.
pub fn is_diff_line(line: &str) -> bool {
    DIFF_LINE_PREFIXES.iter().any(|prefix| line.starts_with(prefix))
        || line.starts_with('+')
        || line.starts_with('-')
}

/// Returns the tag when `line` opens a `diff` / `patch` fence.
fn patch_fence_tag(line: &str) -> Option<&str> {
    let tag = line.trim().strip_prefix(FENCE)?.trim();
    PATCH_TAGS.iter().copied().find(|t| *t == tag)
}

fn is_fence_closer(line: &str) -> bool {
    line.trim() == FENCE
}

/// Whether the comment body contains a ```` ```diff ```` fence opener.
///
/// Part of the detection heuristic that decides whether a comment is worth
/// handing to [`extract`] at all.
pub fn contains_diff_fence(body: &str) -> bool {
    body.lines().any(|line| patch_fence_tag(line) == Some("diff"))
}

/// 開いているフェンスの状態
struct OpenFence<'a> {
    lines: Vec<&'a str>,
    seen_diff_line: bool,
}

/// Extract every patch candidate from a comment, in document order.
///
/// Never fails: a comment without usable blocks yields an empty vector.
pub fn extract(comment: &str) -> Vec<CandidatePatch> {
    let mut candidates = Vec::new();
    let mut open: Option<OpenFence<'_>> = None;

    for line in comment.lines() {
        match open.as_mut() {
            None => {
                if patch_fence_tag(line).is_some() {
                    open = Some(OpenFence {
                        lines: Vec::new(),
                        seen_diff_line: false,
                    });
                }
            }
            Some(_) if is_fence_closer(line) => {
                if let Some(fence) = open.take() {
                    if fence.seen_diff_line && !fence.lines.is_empty() {
                        candidates.push(CandidatePatch {
                            index: candidates.len(),
                            body: fence.lines.join("\n"),
                        });
                    }
                }
            }
            Some(fence) => {
                if is_diff_line(line) {
                    fence.seen_diff_line = true;
                }
                fence.lines.push(line);
            }
        }
    }

    candidates
}
