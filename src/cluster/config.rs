//! Cluster configuration
//!
//! A managed cluster is identified by the (cluster, region, env) triple and
//! described by a small YAML file kept in the manifest repository, next to
//! the manifests it governs.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read cluster config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse cluster config {path}: {source}")]
    Yaml {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("failed to scan {path} for cluster configs: {source}")]
    Walk {
        path: String,
        source: walkdir::Error,
    },
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from("manifests")
}

/// Configuration of one managed cluster
///
/// Immutable once constructed; the (cluster, region, env) triple uniquely
/// identifies it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    pub cluster: String,
    pub region: String,
    pub env: String,

    /// Absolute path to cluster credentials; ambient config is used when
    /// unset
    #[serde(default)]
    pub kube_config_path: Option<PathBuf>,

    /// Use server-side apply for this cluster
    #[serde(default)]
    pub server_side: bool,

    /// Manifest subtree, relative to the directory holding this config
    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,
}

impl ClusterConfig {
    /// Store key for this cluster: `<cluster>__<region>__<env>`
    ///
    /// Used verbatim as the consistency-store key; must be stable across
    /// processes.
    pub fn key(&self) -> String {
        format!("{}__{}__{}", self.cluster, self.region, self.env)
    }

    /// Name used for the cluster-scoped lock
    pub fn lock_name(&self) -> &str {
        &self.cluster
    }

    /// Manifest subtree resolved against the config file's directory
    pub fn manifests_under(&self, config_dir: &Path) -> PathBuf {
        config_dir.join(&self.manifest_path)
    }
}

/// Load a single cluster config
pub fn load_cluster_config(path: &Path) -> Result<ClusterConfig, ConfigError> {
    let raw = std::fs::read(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_yaml::from_slice(&raw).map_err(|source| ConfigError::Yaml {
        path: path.display().to_string(),
        source,
    })
}

/// A cluster config together with the directory it was found in
#[derive(Debug, Clone)]
pub struct DiscoveredCluster {
    pub config: ClusterConfig,
    pub config_dir: PathBuf,
}

impl DiscoveredCluster {
    pub fn manifest_root(&self) -> PathBuf {
        self.config.manifests_under(&self.config_dir)
    }
}

/// Discover cluster configs under a checkout subtree
///
/// Scans for `.yaml`/`.yml` files; files that do not parse as a cluster
/// config are skipped with a warning. `env_filter` restricts results to a
/// single environment label.
pub fn discover_clusters(
    root: &Path,
    env_filter: Option<&str>,
) -> Result<Vec<DiscoveredCluster>, ConfigError> {
    let mut found = Vec::new();
    if !root.exists() {
        return Ok(found);
    }

    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|source| ConfigError::Walk {
            path: root.display().to_string(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_yaml = entry
            .path()
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if !is_yaml {
            continue;
        }

        let config = match load_cluster_config(entry.path()) {
            Ok(config) => config,
            Err(err) => {
                warn!(path = %entry.path().display(), error = %err, "Skipping non-cluster YAML");
                continue;
            }
        };

        if let Some(env) = env_filter {
            if config.env != env {
                continue;
            }
        }

        let config_dir = entry
            .path()
            .parent()
            .unwrap_or(root)
            .to_path_buf();
        found.push(DiscoveredCluster { config, config_dir });
    }

    // Deterministic processing order across checkouts
    found.sort_by(|a, b| a.config.key().cmp(&b.config.key()));
    Ok(found)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "config_test.rs"]
mod tests;
