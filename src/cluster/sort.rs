//! Stable ordering shared by diff and apply results
//!
//! Sorts by (namespace, kind, name) with numeric-suffix tie-breaking so
//! sibling resources come out in human order (`shard-2` before `shard-10`).

use std::cmp::Ordering;

/// Split a trailing integer suffix off a resource name
///
/// `resource-10` → `("resource", 10)`; a name without an integer suffix
/// sorts as the whole name with index 0.
pub fn parse_name(name: &str) -> (&str, u64) {
    if let Some((base, suffix)) = name.rsplit_once('-') {
        if let Ok(n) = suffix.parse::<u64>() {
            return (base, n);
        }
    }
    (name, 0)
}

/// Compare two names with numeric-suffix tie-breaking
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let (a_base, a_n) = parse_name(a);
    let (b_base, b_n) = parse_name(b);
    a_base.cmp(b_base).then(a_n.cmp(&b_n))
}

/// Compare two (namespace, kind, name) keys
pub fn compare_keys(a: (&str, &str, &str), b: (&str, &str, &str)) -> Ordering {
    a.0.cmp(b.0)
        .then(a.1.cmp(b.1))
        .then_with(|| compare_names(a.2, b.2))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "sort_test.rs"]
mod tests;
