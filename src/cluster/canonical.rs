//! Manifest canonicalization for diff hashing
//!
//! Decides which lines of a serialized manifest participate in diffing.
//! Server-side bookkeeping (managedFields) is always dropped; in short-diff
//! mode the noisier metadata (annotations, tooling-owned labels, generation)
//! is dropped as well so reviewers only see meaningful changes.
//!
//! Two manifests with equal digests are never diffed.

use sha1::{Digest, Sha1};

/// Kept lines longer than this are truncated
pub const MAX_LINE_LEN: usize = 256;

/// Label keys owned by providers and tooling, dropped in short-diff mode
const NOISY_LABEL_PREFIXES: &[&str] = &[
    "app.kubernetes.io/managed-by",
    "app.kubernetes.io/version",
    "helm.sh/chart",
    "chart",
    "heritage",
    "release",
];

/// Suppression region the filter is currently inside
#[derive(Debug, Clone, Copy, PartialEq)]
enum Region {
    None,
    /// `  managedFields:` block, ends at the first line that is neither
    /// `  - ` nor indented by three or more spaces
    ManagedFields,
    /// `annotations:` block (short diff), ends at the next line with
    /// exactly two leading spaces
    Annotations,
    /// `labels` block (short diff): only known-noisy keys are dropped,
    /// ends at the next line with exactly two leading spaces
    Labels,
}

/// Streaming line filter implementing the selection rules
///
/// Feed lines in file order; `filter` returns the line to keep (possibly
/// truncated) or `None` when the line is suppressed.
pub struct LineFilter {
    short_diff: bool,
    region: Region,
}

impl LineFilter {
    pub fn new(short_diff: bool) -> Self {
        Self {
            short_diff,
            region: Region::None,
        }
    }

    pub fn filter(&mut self, line: &str) -> Option<String> {
        match self.region {
            Region::ManagedFields => {
                if line.starts_with("  - ") || line.starts_with("   ") {
                    return None;
                }
                // Region over; the closing line is processed normally
                self.region = Region::None;
            }
            Region::Annotations => {
                if leading_spaces(line) != 2 {
                    return None;
                }
                self.region = Region::None;
            }
            Region::Labels => {
                if leading_spaces(line) == 2 {
                    self.region = Region::None;
                } else if is_noisy_label(line) {
                    return None;
                } else {
                    return Some(truncate(line));
                }
            }
            Region::None => {}
        }

        if line.starts_with("  managedFields:") {
            self.region = Region::ManagedFields;
            return None;
        }

        if self.short_diff {
            let trimmed = line.trim_start();
            if trimmed.starts_with("annotations:") {
                self.region = Region::Annotations;
                return None;
            }
            if trimmed.starts_with("generation") {
                return None;
            }
            if trimmed.starts_with("labels") {
                // The key line itself is kept; only noisy children drop
                self.region = Region::Labels;
                return Some(truncate(line));
            }
        }

        Some(truncate(line))
    }
}

/// Canonicalized view of one manifest
#[derive(Debug, Clone)]
pub struct Canonical {
    /// Lines that survived the selection rules, in file order
    pub lines: Vec<String>,
    /// Hex SHA-1 over the kept lines; identifies the effective content
    pub digest: String,
}

/// Apply the selection rules to a whole manifest and digest the result
pub fn canonicalize(content: &str, short_diff: bool) -> Canonical {
    let mut filter = LineFilter::new(short_diff);
    let mut hasher = Sha1::new();
    let mut lines = Vec::new();

    for line in content.lines() {
        if let Some(kept) = filter.filter(line) {
            hasher.update(kept.as_bytes());
            hasher.update(b"\n");
            lines.push(kept);
        }
    }

    Canonical {
        lines,
        digest: hex::encode(hasher.finalize()),
    }
}

fn leading_spaces(line: &str) -> usize {
    line.chars().take_while(|c| *c == ' ').count()
}

fn is_noisy_label(line: &str) -> bool {
    let trimmed = line.trim_start();
    NOISY_LABEL_PREFIXES.iter().any(|p| trimmed.starts_with(p))
}

fn truncate(line: &str) -> String {
    let total = line.chars().count();
    if total <= MAX_LINE_LEN {
        return line.to_string();
    }

    let prefix: String = line.chars().take(MAX_LINE_LEN).collect();
    format!("{}… ({} chars omitted)", prefix, total - MAX_LINE_LEN)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "canonical_test.rs"]
mod tests;
