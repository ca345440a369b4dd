//! Webhook event pipeline
//!
//! Validates incoming signed events, resolves pull-request context, and
//! dispatches to handlers that drive the cluster client and report back to
//! the pull request.

pub mod context;
pub mod event;
pub mod handlers;
pub mod server;
pub mod signature;

pub use context::EventContext;
pub use handlers::{dispatch, AppState, ServerConfig, WebhookError};
pub use server::run_webhook_server;
pub use signature::verify_signature;
