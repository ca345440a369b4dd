//! Structured diff engine
//!
//! Walks two manifest trees (the server-side and local views that kubectl
//! materializes for its external diff hook), pairs files by relative path,
//! and emits a unified diff per changed object. Manifests whose canonical
//! digests match are never diffed.

use crate::cluster::canonical::canonicalize;
use crate::cluster::object::{decode_yaml, KubeObject};
use crate::cluster::sort::compare_keys;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use walkdir::WalkDir;

/// Unified-diff context lines
const CONTEXT_LINES: usize = 3;

#[derive(Debug, Error)]
pub enum DiffError {
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to walk manifest tree: {0}")]
    Walk(#[from] walkdir::Error),
}

/// One changed object in a structured diff
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    /// Parsed manifest, when the YAML could be decoded
    pub object: Option<KubeObject>,
    /// Display name (path relative to the tree root)
    pub name: String,
    /// Unified diff text
    pub raw_diff: String,
    /// Lines added (prefix `+ `, hunk and file headers excluded)
    pub num_added: usize,
    /// Lines removed (prefix `- `)
    pub num_removed: usize,
}

/// Diff two manifest trees
///
/// Walks both roots, forms the union of relative paths, and compares each
/// pair through canonicalization. Files present on only one side diff
/// against empty content with an empty header label on the missing side.
pub fn diff_kube(
    old_root: &Path,
    new_root: &Path,
    short_diff: bool,
) -> Result<Vec<DiffResult>, DiffError> {
    let mut paths = relative_files(old_root)?;
    paths.extend(relative_files(new_root)?);

    let mut results = Vec::new();

    for rel in &paths {
        let old_content = read_side(&old_root.join(rel))?;
        let new_content = read_side(&new_root.join(rel))?;

        if let Some(result) = diff_pair(rel, old_content.as_deref(), new_content.as_deref(), short_diff) {
            results.push(result);
        }
    }

    sort_diff_results(&mut results);
    Ok(results)
}

/// Sort results by (namespace, kind, name) with numeric-suffix tie-breaking
///
/// Results without a parsed object sort on their display name with empty
/// namespace and kind.
pub fn sort_diff_results(results: &mut [DiffResult]) {
    results.sort_by(|a, b| compare_keys(sort_key(a), sort_key(b)));
}

fn sort_key(result: &DiffResult) -> (&str, &str, &str) {
    match &result.object {
        Some(obj) => (&obj.metadata.namespace, &obj.kind, &obj.metadata.name),
        None => ("", "", &result.name),
    }
}

fn diff_pair(
    rel: &Path,
    old_content: Option<&str>,
    new_content: Option<&str>,
    short_diff: bool,
) -> Option<DiffResult> {
    let old = canonicalize(old_content.unwrap_or(""), short_diff);
    let new = canonicalize(new_content.unwrap_or(""), short_diff);

    if old.digest == new.digest {
        return None;
    }

    let name = rel.to_string_lossy().to_string();
    let old_text = join_lines(&old.lines);
    let new_text = join_lines(&new.lines);

    let old_label = if old_content.is_some() {
        format!("Server:{name}")
    } else {
        String::new()
    };
    let new_label = if new_content.is_some() {
        format!("Local:{name}")
    } else {
        String::new()
    };

    let text_diff = similar::TextDiff::from_lines(old_text.as_str(), new_text.as_str());
    let raw_diff = text_diff
        .unified_diff()
        .context_radius(CONTEXT_LINES)
        .header(&old_label, &new_label)
        .to_string();

    if raw_diff.is_empty() {
        return None;
    }

    // The required space after the marker excludes file headers (`+++ `,
    // `--- `) and hunk headers, and with it top-level manifest keys; this
    // matches the counting contract, do not broaden the prefix.
    let num_added = raw_diff.lines().filter(|l| l.starts_with("+ ")).count();
    let num_removed = raw_diff.lines().filter(|l| l.starts_with("- ")).count();

    // Old side preferred so unchanged top-level fields are not re-decoded
    // from the local manifest
    let object = annotate(old_content.or(new_content), &name);

    Some(DiffResult {
        object,
        name,
        raw_diff,
        num_added,
        num_removed,
    })
}

/// Decode the manifest for result annotation; parse failure is a warning
fn annotate(content: Option<&str>, name: &str) -> Option<KubeObject> {
    let content = content?;
    match decode_yaml(content.as_bytes()) {
        Ok(obj) => Some(obj),
        Err(err) => {
            warn!(manifest = %name, error = %err, "Could not parse manifest for diff annotation");
            None
        }
    }
}

/// Collect relative file paths under a root in lexicographic order
///
/// Directories are skipped; walk errors (including broken symlinks)
/// propagate to the caller.
fn relative_files(root: &Path) -> Result<BTreeSet<PathBuf>, DiffError> {
    let mut paths = BTreeSet::new();
    if !root.exists() {
        return Ok(paths);
    }

    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(root) {
            paths.insert(rel.to_path_buf());
        }
    }

    Ok(paths)
}

fn read_side(path: &Path) -> Result<Option<String>, DiffError> {
    if !path.is_file() {
        return Ok(None);
    }
    let raw = std::fs::read(path)?;
    Ok(Some(String::from_utf8_lossy(&raw).to_string()))
}

fn join_lines(lines: &[String]) -> String {
    if lines.is_empty() {
        String::new()
    } else {
        let mut text = lines.join("\n");
        text.push('\n');
        text
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "diff_test.rs"]
mod tests;
