//! Apply unified-diff patches posted in pull request comments.
//!
//! [`extract`] pulls candidate patches out of a comment body;
//! [`PatchApplier`] applies them to a git working tree, commits the net
//! change and pushes it. The rest of the crate wires that engine to GitHub.

pub mod apply;
pub mod config;
pub mod extract;
pub mod git;
pub mod github;
pub mod handler;
pub mod init;
pub mod report;
pub mod sink;

pub use apply::{ApplyError, ApplyOptions, ApplyResult, PatchApplier, PatchOutcome, PushStatus};
pub use extract::{extract, CandidatePatch};
pub use handler::{handle_comment, should_process, HandlerContext, HandlerOutcome};
pub use report::Report;
