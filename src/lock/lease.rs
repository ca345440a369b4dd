//! Lease-backed distributed locks
//!
//! Each acquired name runs its own election loop against a
//! coordination.k8s.io/v1 Lease resource, using the Lease API directly.
//! Acquire resolves when the loop first becomes holder; release cancels the
//! loop and waits for its completion signal.

use super::{LockError, Locker};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long a held lease is valid without renewal
pub const LEASE_DURATION: Duration = Duration::from_secs(20);

/// How long renewal may keep failing before the lock counts as lost
pub const RENEW_DEADLINE: Duration = Duration::from_secs(10);

/// Interval between acquisition attempts and renewals
pub const RETRY_PERIOD: Duration = Duration::from_secs(5);

/// Bound on waiting for the election loop to confirm release
pub const RELEASE_TIMEOUT: Duration = Duration::from_secs(10);

/// Lease name prefix; the lock name (cluster) is appended
const LEASE_NAME_PREFIX: &str = "kubeapply-lock-";

/// One held lock: the loop's cancellation handle and completion channel
///
/// The completion channel is created before the loop starts, so a
/// completion fired before release subscribes is buffered, never lost.
struct HeldLock {
    cancel: CancellationToken,
    done: oneshot::Receiver<()>,
}

/// Distributed lock manager backed by Lease resources
pub struct LeaseLockManager {
    client: Client,
    namespace: String,
    identity: String,
    held: Mutex<HashMap<String, HeldLock>>,
}

impl LeaseLockManager {
    /// Create a manager coordinating through the given namespace
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            identity: holder_identity(),
            held: Mutex::new(HashMap::new()),
        }
    }

    /// Identity written into held leases
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

#[async_trait]
impl Locker for LeaseLockManager {
    async fn acquire(&self, name: &str) -> Result<(), LockError> {
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = oneshot::channel();
        let (acquired_tx, acquired_rx) = oneshot::channel();

        {
            let mut held = self.held.lock().await;
            if held.contains_key(name) {
                return Err(LockError::AlreadyHeld(name.to_string()));
            }
            held.insert(
                name.to_string(),
                HeldLock {
                    cancel: cancel.clone(),
                    done: done_rx,
                },
            );
        }

        let api: Api<Lease> = Api::namespaced(self.client.clone(), &self.namespace);
        let lease_name = lease_name(name);
        let identity = self.identity.clone();

        info!(
            lock = %name,
            lease = %lease_name,
            holder_id = %identity,
            "Acquiring lock"
        );
        tokio::spawn(run_lock_loop(api, lease_name, identity, cancel, acquired_tx, done_tx));

        acquired_rx
            .await
            .map_err(|_| LockError::AcquireFailed(name.to_string()))
    }

    async fn release(&self, name: &str) -> Result<(), LockError> {
        let entry = {
            let mut held = self.held.lock().await;
            held.remove(name)
        }
        .ok_or_else(|| LockError::NotHeld(name.to_string()))?;

        entry.cancel.cancel();

        // A loop that already stopped (lost lease) has sent its completion;
        // either way the channel resolves unless the loop is wedged.
        match tokio::time::timeout(RELEASE_TIMEOUT, entry.done).await {
            Ok(_) => {
                info!(lock = %name, "Lock released");
                Ok(())
            }
            Err(_) => Err(LockError::ReleaseTimeout(name.to_string())),
        }
    }
}

pub(crate) fn lease_name(lock_name: &str) -> String {
    format!("{LEASE_NAME_PREFIX}{lock_name}")
}

/// Holder identity: `<hostname>-<microseconds-since-epoch>`
///
/// Falls back to a UUID when no hostname is available.
pub fn holder_identity() -> String {
    let host = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("kubeapply-{}", uuid::Uuid::new_v4()));
    format!("{}-{}", host, Utc::now().timestamp_micros())
}

/// Whether a lease spec has expired (or never carried renewal state)
pub(crate) fn is_expired(spec: Option<&LeaseSpec>, now: DateTime<Utc>) -> bool {
    let renew_time = spec.and_then(|s| s.renew_time.as_ref());
    let lease_duration = spec.and_then(|s| s.lease_duration_seconds);

    match (renew_time, lease_duration) {
        (Some(MicroTime(renew)), Some(duration)) => {
            let expiry = *renew + chrono::Duration::seconds(i64::from(duration));
            now > expiry
        }
        // No renew time or duration = expired
        _ => true,
    }
}

/// Try to acquire or renew the lease
///
/// Returns true if we now hold it, false if another holder does.
async fn try_acquire_or_renew(
    api: &Api<Lease>,
    lease_name: &str,
    identity: &str,
) -> Result<bool, kube::Error> {
    let now = Utc::now();
    let now_micro = MicroTime(now);

    match api.get(lease_name).await {
        Ok(existing) => {
            let spec = existing.spec.as_ref();
            let current_holder = spec
                .and_then(|s| s.holder_identity.as_deref())
                .filter(|h| !h.is_empty());

            if current_holder == Some(identity) {
                debug!(lease = %lease_name, "Renewing lease");
                let patch = serde_json::json!({
                    "spec": {
                        "renewTime": now_micro,
                        "leaseDurationSeconds": LEASE_DURATION.as_secs()
                    }
                });
                api.patch(lease_name, &PatchParams::default(), &Patch::Merge(&patch))
                    .await?;
                return Ok(true);
            }

            if current_holder.is_none() || is_expired(spec, now) {
                debug!(lease = %lease_name, holder_id = %identity, "Lease free or expired, attempting takeover");
                let transitions = spec.and_then(|s| s.lease_transitions).unwrap_or(0);

                let patch = serde_json::json!({
                    "spec": {
                        "holderIdentity": identity,
                        "acquireTime": now_micro,
                        "renewTime": now_micro,
                        "leaseDurationSeconds": LEASE_DURATION.as_secs(),
                        "leaseTransitions": transitions + 1
                    }
                });
                api.patch(lease_name, &PatchParams::default(), &Patch::Merge(&patch))
                    .await?;
                return Ok(true);
            }

            debug!(
                lease = %lease_name,
                current_holder = ?current_holder,
                "Lease held by another process"
            );
            Ok(false)
        }
        Err(kube::Error::Api(err)) if err.code == 404 => {
            info!(lease = %lease_name, holder_id = %identity, "Creating lease");
            let lease = Lease {
                metadata: kube::api::ObjectMeta {
                    name: Some(lease_name.to_string()),
                    ..Default::default()
                },
                spec: Some(LeaseSpec {
                    holder_identity: Some(identity.to_string()),
                    acquire_time: Some(now_micro.clone()),
                    renew_time: Some(now_micro),
                    lease_duration_seconds: Some(LEASE_DURATION.as_secs() as i32),
                    lease_transitions: Some(0),
                    ..Default::default()
                }),
            };

            match api.create(&PostParams::default(), &lease).await {
                Ok(_) => Ok(true),
                // Another process created the lease first; retry on the
                // next interval
                Err(kube::Error::Api(api_err)) if api_err.code == 409 => {
                    debug!(lease = %lease_name, "Lease created concurrently by another process");
                    Ok(false)
                }
                Err(e) => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}

/// Clear the holder so waiting processes can take over immediately
async fn release_lease(
    api: &Api<Lease>,
    lease_name: &str,
) -> Result<(), kube::Error> {
    let patch = serde_json::json!({
        "spec": {
            "holderIdentity": "",
            "leaseDurationSeconds": 1
        }
    });
    api.patch(lease_name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// Election loop for one named lock
///
/// Ticks every RETRY_PERIOD; signals `acquired` on first leadership and
/// `done` exactly once on exit (release or lease loss).
async fn run_lock_loop(
    api: Api<Lease>,
    lease_name: String,
    identity: String,
    cancel: CancellationToken,
    acquired: oneshot::Sender<()>,
    done: oneshot::Sender<()>,
) {
    let mut acquired = Some(acquired);
    let mut is_holder = false;
    let mut last_renew = Instant::now();

    // The first tick fires immediately so acquisition is attempted right
    // away; RETRY_PERIOD applies to subsequent attempts.
    let mut retry = tokio::time::interval(RETRY_PERIOD);

    loop {
        tokio::select! {
            _ = retry.tick() => {
                match try_acquire_or_renew(&api, &lease_name, &identity).await {
                    Ok(true) => {
                        last_renew = Instant::now();
                        if !is_holder {
                            is_holder = true;
                            info!(lease = %lease_name, holder_id = %identity, "Lock acquired");
                            if let Some(tx) = acquired.take() {
                                let _ = tx.send(());
                            }
                        }
                    }
                    Ok(false) => {
                        if is_holder {
                            warn!(lease = %lease_name, "Lease taken over by another holder; lock lost");
                            break;
                        }
                        debug!(lease = %lease_name, "Waiting for lease");
                    }
                    Err(e) => {
                        warn!(error = %e, lease = %lease_name, "Lease operation failed");
                        if is_holder && last_renew.elapsed() > RENEW_DEADLINE {
                            warn!(lease = %lease_name, "Could not renew within deadline; lock lost");
                            break;
                        }
                    }
                }
            }
            _ = cancel.cancelled() => {
                if is_holder {
                    if let Err(e) = release_lease(&api, &lease_name).await {
                        // The lease expires naturally after LEASE_DURATION
                        warn!(error = %e, lease = %lease_name, "Failed to release lease");
                    }
                }
                break;
            }
        }
    }

    let _ = done.send(());
}
