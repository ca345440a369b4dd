//! Cluster-operation engine
//!
//! Everything needed to diff and apply a manifest tree against one live
//! cluster: the loosely-typed object model, manifest canonicalization, the
//! structured diff and apply engines, the kubectl wrapper, and the client
//! facade that ties them to the lock manager and consistency store.

pub mod apply;
pub mod canonical;
pub mod client;
pub mod config;
pub mod diff;
pub mod kubectl;
pub mod object;
pub mod sort;

pub use apply::{objs_to_results, sort_apply_results, ApplyResult};
pub use client::{ClusterClient, ClusterError, KubeClusterClient};
pub use config::{discover_clusters, ClusterConfig, DiscoveredCluster};
pub use diff::{diff_kube, DiffResult};
pub use kubectl::Kubectl;
pub use object::{decode_json, decode_yaml, KubeObject, ObjectId};
