//! Named mutual exclusion across processes
//!
//! The lease-backed manager coordinates through Kubernetes Lease resources
//! so that at most one kubeapply process operates on a cluster at a time.
//! An in-process implementation satisfies the same contract for tests.

mod lease;
mod local;

pub use lease::{holder_identity, LeaseLockManager};
pub use local::LocalLockManager;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock {0} is already held by this process")]
    AlreadyHeld(String),

    #[error("lock {0} is not held by this process")]
    NotHeld(String),

    #[error("could not acquire lock {0}: election loop ended before leading")]
    AcquireFailed(String),

    #[error("timed out waiting for lock {0} to release")]
    ReleaseTimeout(String),
}

/// Named lock manager
///
/// `acquire` blocks until this process holds the named lock; callers impose
/// deadlines with `tokio::time::timeout` and perform a best-effort
/// `release` on expiry. Re-entrant acquisition is not supported.
#[async_trait]
pub trait Locker: Send + Sync {
    async fn acquire(&self, name: &str) -> Result<(), LockError>;

    /// Relinquish a held lock, waiting for the backing coordinator to
    /// confirm (bounded)
    async fn release(&self, name: &str) -> Result<(), LockError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "local_test.rs"]
mod local_tests;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "lease_test.rs"]
mod lease_tests;
