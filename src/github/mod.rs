mod client;
mod comment;
pub mod event;
mod pr;
mod workflow;

// Explicit re-exports - only export what is actually used
pub use comment::create_issue_comment;
pub use event::{ActionsSource, CommentEvent, CommentSource, EventError, WebhookSource};
pub use pr::fetch_pr_head;
pub use workflow::dispatch_workflow;
