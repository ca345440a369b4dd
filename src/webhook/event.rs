//! Webhook event payloads
//!
//! Minimal serde views of the provider's event JSON; anything we do not
//! read is left undeclared and ignored.

use crate::github::PullState;
use serde::Deserialize;

/// The comment command that triggers an apply
pub const APPLY_COMMAND: &str = "kubeapply apply";

/// Pull-request actions the diff handler responds to
const PULL_REQUEST_ACTIONS: &[&str] = &["opened", "synchronize", "reopened"];

/// Repository info carried on every event
#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub name: String,
    /// `owner/repo`
    pub full_name: String,
}

impl Repository {
    /// Split `full_name` into (owner, repo)
    pub fn owner_and_repo(&self) -> Option<(&str, &str)> {
        self.full_name.split_once('/')
    }
}

/// Event sender / comment author
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub login: String,
}

/// `pull_request` event
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestEvent {
    pub action: String,
    pub pull_request: PullState,
    pub repository: Repository,
    #[serde(default)]
    pub sender: Option<User>,
}

impl PullRequestEvent {
    /// Whether this action should produce a diff
    pub fn wants_diff(&self) -> bool {
        PULL_REQUEST_ACTIONS.contains(&self.action.as_str())
    }
}

/// Issue subset of an `issue_comment` event
#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub number: u64,
    /// Present only when the issue is a pull request
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

/// Comment subset of an `issue_comment` event
#[derive(Debug, Clone, Deserialize)]
pub struct Comment {
    #[serde(default)]
    pub body: String,
    pub user: User,
}

/// `issue_comment` event
#[derive(Debug, Clone, Deserialize)]
pub struct IssueCommentEvent {
    pub action: String,
    pub issue: Issue,
    pub comment: Comment,
    pub repository: Repository,
}

impl IssueCommentEvent {
    /// Whether this comment is a maintainer apply command on a PR
    pub fn is_apply_command(&self) -> bool {
        self.action == "created"
            && self.issue.pull_request.is_some()
            && self.comment.body.trim().starts_with(APPLY_COMMAND)
    }
}

/// A recognized webhook event
#[derive(Debug, Clone)]
pub enum Event {
    PullRequest(Box<PullRequestEvent>),
    IssueComment(Box<IssueCommentEvent>),
}

/// Parse a webhook body by its event-kind header
///
/// Unrecognized kinds are `Ok(None)`; a recognized kind with an unparsable
/// body is an error.
pub fn parse_event(kind: &str, body: &[u8]) -> Result<Option<Event>, serde_json::Error> {
    match kind {
        "pull_request" => Ok(Some(Event::PullRequest(serde_json::from_slice(body)?))),
        "issue_comment" => Ok(Some(Event::IssueComment(serde_json::from_slice(body)?))),
        _ => Ok(None),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "event_test.rs"]
mod tests;
