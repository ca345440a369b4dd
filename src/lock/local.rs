//! In-process lock manager
//!
//! Mutex + set-of-held-names implementation of the Locker contract, used in
//! tests and anywhere a single process is the whole coordination domain.

use super::{LockError, Locker};
use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::{Mutex, Notify};

#[derive(Default)]
pub struct LocalLockManager {
    held: Mutex<HashSet<String>>,
    freed: Notify,
}

impl LocalLockManager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Locker for LocalLockManager {
    async fn acquire(&self, name: &str) -> Result<(), LockError> {
        loop {
            // Register interest before checking, so a release between the
            // check and the await is not missed
            let freed = self.freed.notified();

            {
                let mut held = self.held.lock().await;
                if !held.contains(name) {
                    held.insert(name.to_string());
                    return Ok(());
                }
            }

            freed.await;
        }
    }

    async fn release(&self, name: &str) -> Result<(), LockError> {
        let mut held = self.held.lock().await;
        if !held.remove(name) {
            return Err(LockError::NotHeld(name.to_string()));
        }
        drop(held);

        self.freed.notify_waiters();
        Ok(())
    }
}
