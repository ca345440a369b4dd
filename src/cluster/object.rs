//! Minimal object model for kubectl responses and repo manifests
//!
//! kubectl is free to evolve its output; we only ever look at identity
//! fields (kind, name, namespace), resource versions, and creation
//! timestamps, so decoding is deliberately permissive and unknown fields
//! are ignored.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("response contains no JSON object")]
    NoJson,

    #[error("failed to decode kubectl JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to decode manifest YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("decoded object has empty kind")]
    EmptyKind,
}

/// Identity of an object within a cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.kind, self.name)
    }
}

/// Object metadata subset we care about
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    pub resource_version: String,
    pub creation_timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

/// A loosely-typed cluster object
///
/// Covers both single objects and `kind: List` responses; for a list the
/// children are inline in `items`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KubeObject {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub items: Vec<KubeObject>,
}

impl KubeObject {
    /// Identity triple for joining old/new apply responses
    pub fn id(&self) -> ObjectId {
        ObjectId {
            kind: self.kind.clone(),
            name: self.metadata.name.clone(),
            namespace: self.metadata.namespace.clone(),
        }
    }
}

/// Decode a kubectl JSON response into a flat object sequence
///
/// Part of the decoder's contract: any bytes before the first `{` are
/// skipped, because kubectl writes warning text to stdout ahead of its JSON
/// payload. Applying more than one resource makes kubectl print one JSON
/// document per object, concatenated with no enclosing array, so the
/// buffer is decoded as a stream of top-level values. Each root of kind
/// `List` is flattened to its `items`; an empty kind on any value is an
/// error.
pub fn decode_json(raw: &[u8]) -> Result<Vec<KubeObject>, ObjectError> {
    let start = raw
        .iter()
        .position(|b| *b == b'{')
        .ok_or(ObjectError::NoJson)?;

    let mut objs = Vec::new();
    for decoded in serde_json::Deserializer::from_slice(&raw[start..]).into_iter::<KubeObject>() {
        let obj = decoded?;

        if obj.kind.is_empty() {
            return Err(ObjectError::EmptyKind);
        }

        if obj.kind == "List" {
            objs.extend(obj.items);
        } else {
            objs.push(obj);
        }
    }

    Ok(objs)
}

/// Decode a single YAML manifest
///
/// Used only to annotate diff results with (kind, name, namespace); callers
/// treat failure as a warning, not a fatal error.
pub fn decode_yaml(raw: &[u8]) -> Result<KubeObject, ObjectError> {
    let obj: KubeObject = serde_yaml::from_slice(raw)?;
    Ok(obj)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "object_test.rs"]
mod tests;
