//! Cluster client facade
//!
//! Fronts all apply and diff traffic for one cluster. Every operation runs
//! inside the cluster-scoped lock, and consistency-checked applies are
//! rejected before any kubectl subprocess is spawned unless the operator is
//! applying the revision that was last diffed.

use crate::cluster::apply::{apply_kube, ApplyError, ApplyResult};
use crate::cluster::config::ClusterConfig;
use crate::cluster::diff::DiffResult;
use crate::cluster::kubectl::{Kubectl, KubectlError};
use crate::events::DiffEvent;
use crate::lock::{holder_identity, LockError, Locker};
use crate::store::{Store, StoreError};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio::time::timeout;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Bound on waiting for the cluster lock
pub const LOCK_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("cluster {cluster} is locked by another operation; try again later")]
    LockTimeout { cluster: String },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no store is configured for cluster {cluster}")]
    StoreDisabled { cluster: String },

    #[error(
        "apply revision {caller} does not match the last diffed revision {stored}; re-run diff before applying"
    )]
    ConsistencyMismatch { stored: String, caller: String },

    #[error("no diff has been recorded for cluster {cluster}; run diff before applying")]
    NoDiffEvent { cluster: String },

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Kubectl(#[from] KubectlError),

    #[error("could not decode stored diff event: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("cluster client setup failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Operations against one cluster
///
/// Small on purpose: the surface exists so webhook handlers can run against
/// an in-process fake.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Apply manifests, returning kubectl's raw output
    async fn apply(&self, paths: &[PathBuf], server_side: bool) -> Result<Vec<u8>, ClusterError>;

    /// Apply manifests, returning per-object results
    async fn apply_structured(
        &self,
        paths: &[PathBuf],
        server_side: bool,
    ) -> Result<Vec<ApplyResult>, ClusterError>;

    /// Diff manifests, returning kubectl's raw output
    async fn diff(&self, paths: &[PathBuf], server_side: bool) -> Result<Vec<u8>, ClusterError>;

    /// Diff manifests through the structured engine
    async fn diff_structured(
        &self,
        paths: &[PathBuf],
        server_side: bool,
        short_diff: bool,
    ) -> Result<Vec<DiffResult>, ClusterError>;

    /// Human-readable cluster summary
    async fn summary(&self) -> Result<String, ClusterError>;

    async fn get_store_value(&self, key: &str) -> Result<Option<String>, ClusterError>;
    async fn set_store_value(&self, key: &str, value: &str) -> Result<(), ClusterError>;

    async fn get_namespace_uid(&self, namespace: &str) -> Result<String, ClusterError>;

    fn config(&self) -> &ClusterConfig;

    /// Remove owned temporary state
    async fn close(&self) -> Result<(), ClusterError>;
}

/// The real client: kubectl + lock manager + store
pub struct KubeClusterClient {
    config: ClusterConfig,
    kubectl: Kubectl,
    locker: Option<Arc<dyn Locker>>,
    store: Option<Arc<dyn Store>>,
    /// Revision this client operates on behalf of
    head_sha: String,
    check_apply_consistency: bool,
    identity: String,
    /// Scratch space for cluster credentials; removed on close
    temp_dir: Mutex<Option<TempDir>>,
}

impl KubeClusterClient {
    pub fn new(
        config: ClusterConfig,
        head_sha: &str,
        locker: Option<Arc<dyn Locker>>,
        store: Option<Arc<dyn Store>>,
        check_apply_consistency: bool,
    ) -> Result<Self, ClusterError> {
        let temp_dir = TempDir::new()?;
        let kubectl = Kubectl::new(config.kube_config_path.clone());

        Ok(Self {
            config,
            kubectl,
            locker,
            store,
            head_sha: head_sha.to_string(),
            check_apply_consistency,
            identity: holder_identity(),
            temp_dir: Mutex::new(Some(temp_dir)),
        })
    }

    /// Acquire the cluster lock, bounded by LOCK_ACQUIRE_TIMEOUT
    async fn lock(&self) -> Result<(), ClusterError> {
        let Some(locker) = &self.locker else {
            return Ok(());
        };
        let name = self.config.lock_name();

        match timeout(LOCK_ACQUIRE_TIMEOUT, locker.acquire(name)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                // The election loop keeps running until released; stop it so
                // a timed-out acquire does not grab the lock later
                if let Err(e) = locker.release(name).await {
                    debug!(error = %e, cluster = %name, "Cleanup release after acquire timeout");
                }
                Err(ClusterError::LockTimeout {
                    cluster: name.to_string(),
                })
            }
        }
    }

    /// Release the cluster lock; failures are warnings, not errors
    async fn unlock(&self) {
        let Some(locker) = &self.locker else {
            return;
        };
        let name = self.config.lock_name();
        if let Err(e) = locker.release(name).await {
            warn!(error = %e, cluster = %name, "Failed to release cluster lock");
        }
    }

    /// Reject an apply whose revision is not the one last diffed
    async fn check_consistency(&self) -> Result<(), ClusterError> {
        if !self.check_apply_consistency {
            return Ok(());
        }
        let Some(store) = &self.store else {
            return Ok(());
        };

        let key = self.config.key();
        let Some(raw) = store.get(&key).await? else {
            return Err(ClusterError::NoDiffEvent { cluster: key });
        };

        let event: DiffEvent = serde_json::from_str(&raw)?;
        if event.sha != self.head_sha {
            return Err(ClusterError::ConsistencyMismatch {
                stored: event.sha,
                caller: self.head_sha.clone(),
            });
        }

        debug!(cluster = %key, sha = %event.sha, "Apply consistency check passed");
        Ok(())
    }

    /// Record that this revision has been diffed
    async fn record_diff_event(&self) -> Result<(), ClusterError> {
        if !self.check_apply_consistency {
            return Ok(());
        }
        let Some(store) = &self.store else {
            return Ok(());
        };

        let event = DiffEvent::new(&self.head_sha, &self.identity);
        store
            .set(&self.config.key(), &serde_json::to_string(&event)?)
            .await?;

        info!(
            cluster = %self.config.key(),
            sha = %self.head_sha,
            "Recorded diff event"
        );
        Ok(())
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn apply(&self, paths: &[PathBuf], server_side: bool) -> Result<Vec<u8>, ClusterError> {
        self.lock().await?;
        let result = async {
            self.check_consistency().await?;
            Ok(self.kubectl.apply(paths, false, server_side, false).await?)
        }
        .await;
        self.unlock().await;
        result
    }

    async fn apply_structured(
        &self,
        paths: &[PathBuf],
        server_side: bool,
    ) -> Result<Vec<ApplyResult>, ClusterError> {
        self.lock().await?;
        let result = async {
            self.check_consistency().await?;
            Ok(apply_kube(&self.kubectl, paths, server_side).await?)
        }
        .await;
        self.unlock().await;
        result
    }

    async fn diff(&self, paths: &[PathBuf], server_side: bool) -> Result<Vec<u8>, ClusterError> {
        self.lock().await?;
        let result = self.kubectl.diff_raw(paths, server_side).await;
        self.unlock().await;
        Ok(result?)
    }

    async fn diff_structured(
        &self,
        paths: &[PathBuf],
        server_side: bool,
        short_diff: bool,
    ) -> Result<Vec<DiffResult>, ClusterError> {
        self.lock().await?;
        let result = async {
            let results = self
                .kubectl
                .diff_structured(paths, server_side, short_diff)
                .await?;
            self.record_diff_event().await?;
            Ok(results)
        }
        .await;
        self.unlock().await;
        result
    }

    async fn summary(&self) -> Result<String, ClusterError> {
        Ok(self.kubectl.summary().await?)
    }

    async fn get_store_value(&self, key: &str) -> Result<Option<String>, ClusterError> {
        let Some(store) = &self.store else {
            return Err(ClusterError::StoreDisabled {
                cluster: self.config.key(),
            });
        };
        Ok(store.get(key).await?)
    }

    async fn set_store_value(&self, key: &str, value: &str) -> Result<(), ClusterError> {
        let Some(store) = &self.store else {
            return Err(ClusterError::StoreDisabled {
                cluster: self.config.key(),
            });
        };
        Ok(store.set(key, value).await?)
    }

    async fn get_namespace_uid(&self, namespace: &str) -> Result<String, ClusterError> {
        Ok(self.kubectl.namespace_uid(namespace).await?)
    }

    fn config(&self) -> &ClusterConfig {
        &self.config
    }

    async fn close(&self) -> Result<(), ClusterError> {
        if let Some(dir) = self.temp_dir.lock().await.take() {
            dir.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "client_test.rs"]
mod tests;
