//! Structured apply engine
//!
//! Captures the server's view of each target before and after an apply
//! (dry-run pass, then live pass, both in JSON mode) and joins the two
//! object sequences by identity into per-object results.

use crate::cluster::kubectl::{Kubectl, KubectlError};
use crate::cluster::object::{decode_json, KubeObject, ObjectError, ObjectId};
use crate::cluster::sort::compare_keys;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Kubectl(#[from] KubectlError),

    #[error("could not decode apply response: {0}")]
    Decode(#[from] ObjectError),
}

/// Outcome of applying one object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResult {
    pub id: ObjectId,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Resource version before the apply; empty for created objects
    pub old_version: String,
    /// Resource version after the apply
    pub new_version: String,
    /// Position in the dry-run response, so output order is stable
    pub index: usize,
}

impl ApplyResult {
    pub fn is_created(&self) -> bool {
        self.old_version.is_empty()
    }

    pub fn is_updated(&self) -> bool {
        !self.old_version.is_empty() && self.old_version != self.new_version
    }
}

/// Join pre- and post-apply object sequences by identity
///
/// Yields exactly one result per unique old identity, in input order of
/// first occurrence; a duplicate identity in the dry-run response is warned
/// and collapsed onto the first. A matching new object fills in the
/// post-apply resource version; old objects with no new counterpart are
/// warned and come back unchanged.
pub fn objs_to_results(old: &[KubeObject], new: &[KubeObject]) -> Vec<ApplyResult> {
    let mut results: Vec<ApplyResult> = Vec::with_capacity(old.len());
    let mut by_id: HashMap<ObjectId, usize> = HashMap::with_capacity(old.len());

    for obj in old {
        let id = obj.id();
        if by_id.contains_key(&id) {
            warn!(id = %id, "Duplicate object in dry-run response; keeping the first");
            continue;
        }

        let index = results.len();
        by_id.insert(id.clone(), index);
        results.push(ApplyResult {
            id,
            created_at: obj.metadata.creation_timestamp,
            old_version: obj.metadata.resource_version.clone(),
            new_version: obj.metadata.resource_version.clone(),
            index,
        });
    }

    let mut matched = vec![false; results.len()];
    for obj in new {
        match by_id.get(&obj.id()) {
            Some(&index) => {
                results[index].new_version = obj.metadata.resource_version.clone();
                if results[index].created_at.is_none() {
                    results[index].created_at = obj.metadata.creation_timestamp;
                }
                matched[index] = true;
            }
            None => {
                debug!(id = %obj.id(), "Apply response contains object absent from dry run");
            }
        }
    }

    for result in &results {
        if !matched[result.index] {
            warn!(id = %result.id, "No post-apply state for object; reporting unchanged");
        }
    }

    results
}

/// Sort results by (namespace, kind, name) with numeric-suffix tie-breaking
pub fn sort_apply_results(results: &mut [ApplyResult]) {
    results.sort_by(|a, b| {
        compare_keys(
            (&a.id.namespace, &a.id.kind, &a.id.name),
            (&b.id.namespace, &b.id.kind, &b.id.name),
        )
    });
}

/// Apply manifests and report per-object results
///
/// Either kubectl invocation failing is fatal; the error carries the
/// captured tool output.
pub async fn apply_kube(
    kubectl: &Kubectl,
    paths: &[PathBuf],
    server_side: bool,
) -> Result<Vec<ApplyResult>, ApplyError> {
    let before = kubectl.apply(paths, true, server_side, true).await?;
    let old = decode_json(&before)?;

    let after = kubectl.apply(paths, false, server_side, true).await?;
    let new = decode_json(&after)?;

    Ok(objs_to_results(&old, &new))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "apply_test.rs"]
mod tests;
