//! Small key-value persistence for per-cluster state
//!
//! Holds the consistency token between diff and apply, addressed by the
//! cluster key. Writes are last-writer-wins; the backend is not required to
//! be transactional across keys.

mod configmap;
mod memory;

pub use configmap::{ConfigMapStore, DEFAULT_CONFIG_MAP};
pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store read failed for key {key}: {source}")]
    Read {
        key: String,
        source: kube::Error,
    },

    #[error("store write failed for key {key}: {source}")]
    Write {
        key: String,
        source: kube::Error,
    },
}

/// Key-value store
///
/// Absence is `Ok(None)`, never an error; `set` is an upsert.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "memory_test.rs"]
mod memory_tests;
