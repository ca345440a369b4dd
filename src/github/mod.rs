//! GitHub API client
//!
//! Thin wrapper over octocrab covering what the webhook handlers need:
//! comments, commit statuses, pull-request state, permission and review
//! checks, and merging. Endpoints without a stable typed builder go through
//! octocrab's raw routes with our own payloads.

mod checkout;

pub use checkout::{checkout_revision, Checkout, CheckoutError};

use octocrab::Octocrab;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GithubError {
    #[error("failed to create GitHub client: {0}")]
    Client(octocrab::Error),

    #[error("GitHub request failed: {0}")]
    Api(#[from] octocrab::Error),

    #[error("unexpected GitHub response shape: {0}")]
    Response(String),
}

/// Commit status states accepted by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusState {
    Pending,
    Success,
    Error,
    Failure,
}

impl StatusState {
    fn as_str(self) -> &'static str {
        match self {
            StatusState::Pending => "pending",
            StatusState::Success => "success",
            StatusState::Error => "error",
            StatusState::Failure => "failure",
        }
    }
}

/// Pull-request state the handlers care about
#[derive(Debug, Clone, Deserialize)]
pub struct PullState {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    pub head: GitRef,
    pub base: GitRef,
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub state: String,
}

/// Git reference (branch tip)
#[derive(Debug, Clone, Deserialize)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: String,
}

/// GitHub API operations used by the webhook handlers
pub struct GithubClient {
    client: Octocrab,
    token: String,
}

impl GithubClient {
    pub fn new(token: &str) -> Result<Self, GithubError> {
        let client = Octocrab::builder()
            .personal_token(token.to_string())
            .build()
            .map_err(GithubError::Client)?;

        Ok(Self {
            client,
            token: token.to_string(),
        })
    }

    /// Token used for authenticated clones
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Post a comment on a pull request
    pub async fn create_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<(), GithubError> {
        debug!(owner = %owner, repo = %repo, number = number, "Posting comment");
        self.client
            .issues(owner, repo)
            .create_comment(number, body)
            .await?;
        Ok(())
    }

    /// Fetch the current state of a pull request
    pub async fn get_pull(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PullState, GithubError> {
        let value: serde_json::Value = self
            .client
            .get(format!("/repos/{owner}/{repo}/pulls/{number}"), None::<&()>)
            .await?;
        serde_json::from_value(value).map_err(|e| GithubError::Response(e.to_string()))
    }

    /// Merge base between the PR base branch and a head commit
    pub async fn merge_base(
        &self,
        owner: &str,
        repo: &str,
        base: &str,
        head: &str,
    ) -> Result<String, GithubError> {
        let value: serde_json::Value = self
            .client
            .get(
                format!("/repos/{owner}/{repo}/compare/{base}...{head}"),
                None::<&()>,
            )
            .await?;
        value
            .pointer("/merge_base_commit/sha")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| GithubError::Response("compare response has no merge base".to_string()))
    }

    /// Permission level of a user on the repository
    ///
    /// Returns the provider's permission string (`admin`, `write`, `read`,
    /// `none`).
    pub async fn permission_level(
        &self,
        owner: &str,
        repo: &str,
        user: &str,
    ) -> Result<String, GithubError> {
        let value: serde_json::Value = self
            .client
            .get(
                format!("/repos/{owner}/{repo}/collaborators/{user}/permission"),
                None::<&()>,
            )
            .await?;
        value
            .get("permission")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                GithubError::Response("permission response has no permission field".to_string())
            })
    }

    /// Combined CI status for a commit (`success`, `pending`, `failure`)
    pub async fn combined_status(
        &self,
        owner: &str,
        repo: &str,
        git_ref: &str,
    ) -> Result<String, GithubError> {
        let value: serde_json::Value = self
            .client
            .get(
                format!("/repos/{owner}/{repo}/commits/{git_ref}/status"),
                None::<&()>,
            )
            .await?;
        value
            .get("state")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| GithubError::Response("status response has no state".to_string()))
    }

    /// Whether the pull request carries at least one approving review
    pub async fn is_approved(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<bool, GithubError> {
        let value: serde_json::Value = self
            .client
            .get(
                format!("/repos/{owner}/{repo}/pulls/{number}/reviews"),
                None::<&()>,
            )
            .await?;
        let reviews = value
            .as_array()
            .ok_or_else(|| GithubError::Response("reviews response is not a list".to_string()))?;
        Ok(reviews
            .iter()
            .any(|r| r.get("state").and_then(|s| s.as_str()) == Some("APPROVED")))
    }

    /// Set a commit status
    pub async fn set_status(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
        state: StatusState,
        context: &str,
        description: &str,
        target_url: Option<&str>,
    ) -> Result<(), GithubError> {
        let mut body = serde_json::json!({
            "state": state.as_str(),
            "context": context,
            "description": description,
        });
        if let Some(url) = target_url {
            body["target_url"] = serde_json::Value::String(url.to_string());
        }

        let _: serde_json::Value = self
            .client
            .post(format!("/repos/{owner}/{repo}/statuses/{sha}"), Some(&body))
            .await?;
        Ok(())
    }

    /// Merge a pull request
    pub async fn merge_pull(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<(), GithubError> {
        let body = serde_json::json!({ "merge_method": "merge" });
        let _: serde_json::Value = self
            .client
            .put(
                format!("/repos/{owner}/{repo}/pulls/{number}/merge"),
                Some(&body),
            )
            .await?;
        Ok(())
    }
}
