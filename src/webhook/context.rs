//! Per-event context
//!
//! Owns the provider client and any temporary checkout for the duration of
//! one webhook, and releases both before the response goes out.

use crate::github::{checkout_revision, Checkout, CheckoutError, GithubClient};
use crate::webhook::event::Repository;
use crate::webhook::WebhookError;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct EventContext {
    pub github: Arc<GithubClient>,
    pub owner: String,
    pub repo: String,
    pub number: u64,
    checkout: Mutex<Option<Checkout>>,
}

impl EventContext {
    pub fn new(
        github: Arc<GithubClient>,
        repository: &Repository,
        number: u64,
    ) -> Result<Self, WebhookError> {
        let (owner, repo) = repository
            .owner_and_repo()
            .ok_or_else(|| WebhookError::BadRepository(repository.full_name.clone()))?;

        Ok(Self {
            github,
            owner: owner.to_string(),
            repo: repo.to_string(),
            number,
            checkout: Mutex::new(None),
        })
    }

    /// Check out a revision, replacing any previous checkout
    ///
    /// Returns the checkout root; the directory lives until `close` or the
    /// context is dropped.
    pub async fn checkout(&self, sha: &str) -> Result<PathBuf, CheckoutError> {
        let checkout =
            checkout_revision(&self.owner, &self.repo, self.github.token(), sha).await?;
        let root = checkout.path().to_path_buf();
        *self.checkout.lock().await = Some(checkout);
        Ok(root)
    }

    /// Drop the checkout directory
    pub async fn close(&self) {
        self.checkout.lock().await.take();
    }
}
