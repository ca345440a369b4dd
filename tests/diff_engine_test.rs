//! End-to-end test of the structured diff engine over real trees,
//! including the JSON handoff used by the kubectl external-diff hook.

use kubeapply::cluster::diff::{diff_kube, DiffResult};
use kubeapply::cluster::kubectl::run_diff_helper;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn server_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "apps/web.yaml",
        "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n  namespace: apps\n  generation: 4\nspec:\n  replicas: 1\n",
    );
    write(
        dir.path(),
        "apps/svc.yaml",
        "apiVersion: v1\nkind: Service\nmetadata:\n  name: web\n  namespace: apps\nspec:\n  type: ClusterIP\n",
    );
    dir
}

fn local_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "apps/web.yaml",
        "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n  namespace: apps\n  generation: 9\nspec:\n  replicas: 3\n",
    );
    write(
        dir.path(),
        "apps/svc.yaml",
        "apiVersion: v1\nkind: Service\nmetadata:\n  name: web\n  namespace: apps\nspec:\n  type: ClusterIP\n",
    );
    write(
        dir.path(),
        "apps/new-cm.yaml",
        "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: settings\n  namespace: apps\n",
    );
    dir
}

#[test]
fn structured_diff_over_manifest_trees() {
    let server = server_tree();
    let local = local_tree();

    let results = diff_kube(server.path(), local.path(), true).unwrap();

    // The unchanged service never appears; generation noise is suppressed
    assert_eq!(results.len(), 2);

    // Sorted by (namespace, kind, name): ConfigMap before Deployment
    assert_eq!(results[0].object.as_ref().unwrap().kind, "ConfigMap");
    assert_eq!(results[1].object.as_ref().unwrap().kind, "Deployment");

    let deploy = &results[1];
    assert!(deploy.raw_diff.contains("-  replicas: 1"));
    assert!(deploy.raw_diff.contains("+  replicas: 3"));
    assert!(!deploy.raw_diff.contains("generation"));
    assert_eq!(deploy.num_added, 1);
    assert_eq!(deploy.num_removed, 1);

    let added = &results[0];
    assert!(added.raw_diff.contains("+++ Local:"));
    assert!(added.raw_diff.contains("+  name: settings"));
}

#[test]
fn diff_helper_round_trips_results_as_json() {
    let server = server_tree();
    let local = local_tree();
    let output = TempDir::new().unwrap();
    let output_file = output.path().join("results.json");

    run_diff_helper(server.path(), local.path(), true, &output_file).unwrap();

    let raw = fs::read(&output_file).unwrap();
    let decoded: Vec<DiffResult> = serde_json::from_slice(&raw).unwrap();

    let direct = diff_kube(server.path(), local.path(), true).unwrap();
    assert_eq!(decoded.len(), direct.len());
    assert_eq!(decoded[1].num_added, direct[1].num_added);
    assert_eq!(decoded[1].raw_diff, direct[1].raw_diff);
}

#[test]
fn identical_trees_produce_no_results() {
    let server = server_tree();

    let results = diff_kube(server.path(), server.path(), false).unwrap();
    assert!(results.is_empty());
}
