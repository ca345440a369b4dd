//! Tests for comment rendering and error surfacing

use super::*;
use crate::cluster::object::{KubeObject, ObjectId, ObjectMeta};

fn diff_result(kind: &str, name: &str, namespace: &str, added: usize, removed: usize) -> DiffResult {
    DiffResult {
        object: Some(KubeObject {
            api_version: "v1".to_string(),
            kind: kind.to_string(),
            metadata: ObjectMeta {
                name: name.to_string(),
                namespace: namespace.to_string(),
                resource_version: String::new(),
                creation_timestamp: None,
            },
            items: Vec::new(),
        }),
        name: format!("{name}.yaml"),
        raw_diff: format!("--- Server:{name}.yaml\n+++ Local:{name}.yaml\n@@ -1 +1 @@\n-  a: 1\n+  a: 2\n"),
        num_added: added,
        num_removed: removed,
    }
}

fn apply_result(name: &str, old: &str, new: &str, index: usize) -> ApplyResult {
    ApplyResult {
        id: ObjectId {
            kind: "Deployment".to_string(),
            name: name.to_string(),
            namespace: "apps".to_string(),
        },
        created_at: None,
        old_version: old.to_string(),
        new_version: new.to_string(),
        index,
    }
}

#[test]
fn test_empty_diff_renders_no_changes() {
    assert_eq!(render_diff_results(&[]), "No changes.");
}

#[test]
fn test_diff_table_and_raw_diff() {
    let results = vec![diff_result("Deployment", "web", "apps", 1, 1)];

    let text = render_diff_results(&results);

    assert!(text.contains("| Resource | Added | Removed |"));
    assert!(text.contains("| `apps/Deployment/web` | 1 | 1 |"));
    assert!(text.contains("```diff"));
    assert!(text.contains("+++ Local:web.yaml"));
    assert!(!text.contains("diff truncated"));
}

#[test]
fn test_oversized_diff_truncated() {
    let mut big = diff_result("Deployment", "web", "apps", 1, 1);
    big.raw_diff = "x".repeat(MAX_COMMENT_DIFF_CHARS + 100);

    let text = render_diff_results(&[big]);

    assert!(text.contains("… (diff truncated)"));
    assert!(text.len() < MAX_COMMENT_DIFF_CHARS + 1_000);
}

#[test]
fn test_objectless_result_uses_display_name() {
    let mut result = diff_result("Deployment", "web", "apps", 0, 0);
    result.object = None;

    let text = render_diff_results(&[result]);
    assert!(text.contains("| `web.yaml` |"));
}

#[test]
fn test_apply_results_counts_and_sorting() {
    let results = vec![
        apply_result("shard-10", "4", "5", 0),
        apply_result("shard-2", "", "1", 1),
        apply_result("api", "7", "7", 2),
    ];

    let text = render_apply_results(&results);

    assert!(text.starts_with("1 created, 1 updated, 1 unchanged"));

    // Sorted for display, numeric suffix respected
    let api = text.find("`apps/Deployment/api`").unwrap();
    let shard2 = text.find("`apps/Deployment/shard-2`").unwrap();
    let shard10 = text.find("`apps/Deployment/shard-10`").unwrap();
    assert!(api < shard2 && shard2 < shard10);

    // Created rows show a placeholder old version
    assert!(text.contains("| `apps/Deployment/shard-2` | - | 1 | created |"));
    assert!(text.contains("| `apps/Deployment/api` | 7 | 7 | unchanged |"));
}

#[test]
fn test_empty_apply_renders_notice() {
    assert_eq!(render_apply_results(&[]), "Nothing applied.");
}

#[test]
fn test_comment_sections() {
    let sections = vec![
        ClusterSection {
            heading: "core__us-west-2__stage".to_string(),
            body: "No changes.".to_string(),
            ok: true,
        },
        ClusterSection {
            heading: "core__us-west-2__production".to_string(),
            body: "Diff failed: boom".to_string(),
            ok: false,
        },
    ];

    let text = render_comment("kubeapply diff for `abc`", &sections);

    assert!(text.starts_with("### kubeapply diff for `abc`"));
    assert!(text.contains("#### `core__us-west-2__stage`"));
    assert!(text.contains("#### `core__us-west-2__production`"));
    assert!(text.contains("Diff failed: boom"));
}

#[test]
fn test_lock_timeout_surfaced_as_rejection_with_retry_hint() {
    let err = ClusterError::LockTimeout {
        cluster: "core".to_string(),
    };
    let text = apply_error_text(&err);

    assert!(text.starts_with("Apply rejected:"));
    assert!(text.contains("try again later"));
}

#[test]
fn test_consistency_mismatch_names_revisions() {
    let err = ClusterError::ConsistencyMismatch {
        stored: "abc".to_string(),
        caller: "def".to_string(),
    };
    let text = apply_error_text(&err);

    assert!(text.contains("abc"));
    assert!(text.contains("def"));
    assert!(text.contains("re-run diff"));
}
