//! Tests for cluster config loading and discovery

use super::*;
use std::fs;
use tempfile::TempDir;

const STAGE_CONFIG: &str = "\
cluster: core
region: us-west-2
env: stage
serverSide: true
manifestPath: expanded
";

const PROD_CONFIG: &str = "\
cluster: core
region: us-west-2
env: production
";

#[test]
fn test_cluster_key_composition() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cluster.yaml");
    fs::write(&path, STAGE_CONFIG).unwrap();

    let config = load_cluster_config(&path).unwrap();

    assert_eq!(config.key(), "core__us-west-2__stage");
    assert_eq!(config.lock_name(), "core");
    assert!(config.server_side);
    assert_eq!(config.manifest_path, PathBuf::from("expanded"));
}

#[test]
fn test_manifest_path_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cluster.yaml");
    fs::write(&path, PROD_CONFIG).unwrap();

    let config = load_cluster_config(&path).unwrap();
    assert_eq!(config.manifest_path, PathBuf::from("manifests"));
    assert!(config.kube_config_path.is_none());
    assert!(!config.server_side);
}

#[test]
fn test_discover_filters_by_env() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("stage")).unwrap();
    fs::create_dir_all(dir.path().join("production")).unwrap();
    fs::write(dir.path().join("stage/cluster.yaml"), STAGE_CONFIG).unwrap();
    fs::write(dir.path().join("production/cluster.yaml"), PROD_CONFIG).unwrap();

    let all = discover_clusters(dir.path(), None).unwrap();
    assert_eq!(all.len(), 2);

    let stage = discover_clusters(dir.path(), Some("stage")).unwrap();
    assert_eq!(stage.len(), 1);
    assert_eq!(stage[0].config.env, "stage");
    assert!(stage[0].manifest_root().ends_with("stage/expanded"));
}

#[test]
fn test_discover_skips_unparsable_yaml() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("cluster.yaml"), STAGE_CONFIG).unwrap();
    fs::write(dir.path().join("notes.yaml"), "just: [a, list]\n").unwrap();
    fs::write(dir.path().join("readme.md"), "not yaml at all").unwrap();

    let found = discover_clusters(dir.path(), None).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].config.cluster, "core");
}

#[test]
fn test_discover_missing_root_is_empty() {
    let dir = TempDir::new().unwrap();
    let found = discover_clusters(&dir.path().join("absent"), None).unwrap();
    assert!(found.is_empty());
}
