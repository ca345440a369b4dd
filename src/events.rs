//! Records persisted in the cluster store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Record of the last successful structured diff for a cluster
///
/// Written under the cluster key at the end of every successful structured
/// diff; read back before a consistency-checked apply to verify the
/// operator is applying the same revision that was last diffed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffEvent {
    /// Revision the diff was computed from
    pub sha: String,
    pub updated_at: DateTime<Utc>,
    /// Identity of the process that ran the diff
    pub updated_by: String,
}

impl DiffEvent {
    pub fn new(sha: &str, updated_by: &str) -> Self {
        Self {
            sha: sha.to_string(),
            updated_at: Utc::now(),
            updated_by: updated_by.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "events_test.rs"]
mod tests;
