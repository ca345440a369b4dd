//! Tests for the structured diff engine

use super::*;
use std::fs;
use tempfile::TempDir;

fn write_manifest(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn tree(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (rel, content) in files {
        write_manifest(dir.path(), rel, content);
    }
    dir
}

const DEPLOY_V1: &str = "\
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: apps
spec:
  replicas: 1
";

const DEPLOY_V3: &str = "\
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: apps
spec:
  replicas: 3
";

#[test]
fn test_identical_trees_yield_nothing() {
    let old = tree(&[("a.yaml", DEPLOY_V1), ("sub/b.yaml", DEPLOY_V3)]);
    let new = tree(&[("a.yaml", DEPLOY_V1), ("sub/b.yaml", DEPLOY_V3)]);

    let results = diff_kube(old.path(), new.path(), false).unwrap();
    assert!(results.is_empty());
}

#[test]
fn test_replica_change_counts_one_each_way() {
    let old = tree(&[("a.yaml", DEPLOY_V1)]);
    let new = tree(&[("a.yaml", DEPLOY_V3)]);

    let results = diff_kube(old.path(), new.path(), false).unwrap();

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.name, "a.yaml");
    assert!(result.raw_diff.contains("-  replicas: 1"));
    assert!(result.raw_diff.contains("+  replicas: 3"));
    assert_eq!(result.num_added, 1);
    assert_eq!(result.num_removed, 1);
}

#[test]
fn test_headers_label_server_and_local() {
    let old = tree(&[("a.yaml", DEPLOY_V1)]);
    let new = tree(&[("a.yaml", DEPLOY_V3)]);

    let results = diff_kube(old.path(), new.path(), false).unwrap();

    assert!(results[0].raw_diff.contains("--- Server:a.yaml"));
    assert!(results[0].raw_diff.contains("+++ Local:a.yaml"));
}

#[test]
fn test_missing_side_uses_empty_label() {
    let old = tree(&[]);
    let new = tree(&[("new.yaml", DEPLOY_V3)]);

    let results = diff_kube(old.path(), new.path(), false).unwrap();

    assert_eq!(results.len(), 1);
    let diff = &results[0].raw_diff;
    assert!(diff.contains("+++ Local:new.yaml"));
    assert!(!diff.contains("Server:new.yaml"));
}

#[test]
fn test_file_headers_not_counted() {
    // A top-level key change produces `+kind: ...` (no space), and the
    // file headers start `+++ `/`--- `; neither may count
    let old = tree(&[("a.yaml", "kind: Service\n")]);
    let new = tree(&[("a.yaml", "kind: Endpoints\n")]);

    let results = diff_kube(old.path(), new.path(), false).unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].num_added, 0);
    assert_eq!(results[0].num_removed, 0);
}

#[test]
fn test_generation_only_change_suppressed_in_short_diff() {
    let old = tree(&[("a.yaml", "metadata:\n  generation: 5\n  name: web\n")]);
    let new = tree(&[("a.yaml", "metadata:\n  generation: 7\n  name: web\n")]);

    let short = diff_kube(old.path(), new.path(), true).unwrap();
    assert!(short.is_empty());

    let full = diff_kube(old.path(), new.path(), false).unwrap();
    assert_eq!(full.len(), 1);
}

#[test]
fn test_result_annotated_with_object() {
    let old = tree(&[("a.yaml", DEPLOY_V1)]);
    let new = tree(&[("a.yaml", DEPLOY_V3)]);

    let results = diff_kube(old.path(), new.path(), false).unwrap();

    let obj = results[0].object.as_ref().unwrap();
    assert_eq!(obj.kind, "Deployment");
    assert_eq!(obj.metadata.name, "web");
    assert_eq!(obj.metadata.namespace, "apps");
}

#[test]
fn test_results_sorted_by_namespace_kind_name() {
    let make = |name: &str, ns: &str, replicas: u32| {
        format!(
            "kind: Deployment\nmetadata:\n  name: {name}\n  namespace: {ns}\nspec:\n  replicas: {replicas}\n"
        )
    };

    let (z1, y1, x1) = (make("shard-10", "b", 1), make("shard-2", "b", 1), make("api", "a", 1));
    let (z2, y2, x2) = (make("shard-10", "b", 2), make("shard-2", "b", 2), make("api", "a", 2));

    let old = tree(&[
        ("z.yaml", z1.as_str()),
        ("y.yaml", y1.as_str()),
        ("x.yaml", x1.as_str()),
    ]);
    let new = tree(&[
        ("z.yaml", z2.as_str()),
        ("y.yaml", y2.as_str()),
        ("x.yaml", x2.as_str()),
    ]);

    let results = diff_kube(old.path(), new.path(), false).unwrap();

    let names: Vec<&str> = results
        .iter()
        .map(|r| r.object.as_ref().unwrap().metadata.name.as_str())
        .collect();
    assert_eq!(names, vec!["api", "shard-2", "shard-10"]);
}
