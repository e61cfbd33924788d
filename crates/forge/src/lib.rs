//! # The Forge: Manifest Projection Engine
//!
//! Makes a store-published extension manifest comparable with the manifest the
//! build pipeline certified, even though stores inject and rewrite fields.
//!
//! ## Projection Rule
//! The result has the **keys of the deployed tree** and the **values of the
//! published tree**:
//! - mapping vs mapping: walk the deployed keys; a key missing from the
//!   published side becomes `null`; published-only keys are dropped.
//! - sequence vs sequence: walk the deployed indices; a missing published index
//!   becomes `null`; extra published elements are dropped.
//! - scalar on the published side: taken as-is.
//! - composite on the published side but a different kind on the deployed
//!   side: an empty container of the published kind, so the divergence shows
//!   without leaking published keys.
//!
//! Projecting a tree against itself returns the tree unchanged.

use serde_json::{Map, Number, Value};

/// Errors from manifest decoding.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("manifest is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

/// A manifest document. Mapping keys keep their document order.
#[derive(Debug, Clone, PartialEq)]
pub enum Tree {
    Scalar(Scalar),
    Sequence(Vec<Tree>),
    Mapping(Vec<(String, Tree)>),
}

impl Tree {
    pub const NULL: Tree = Tree::Scalar(Scalar::Null);

    /// Decodes a JSON document.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ProjectionError> {
        // Tolerate a UTF-8 byte order mark, which some build tools emit.
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let value: Value = serde_json::from_slice(bytes)?;
        Ok(Self::from(value))
    }

    pub fn get(&self, key: &str) -> Option<&Tree> {
        match self {
            Tree::Mapping(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Tree::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    /// The top-level `version` string of an extension manifest.
    pub fn version(&self) -> Option<&str> {
        self.get("version").and_then(Tree::as_str)
    }

    pub fn to_value(&self) -> Value {
        match self {
            Tree::Scalar(Scalar::Null) => Value::Null,
            Tree::Scalar(Scalar::Bool(b)) => Value::Bool(*b),
            Tree::Scalar(Scalar::Number(n)) => Value::Number(n.clone()),
            Tree::Scalar(Scalar::String(s)) => Value::String(s.clone()),
            Tree::Sequence(items) => Value::Array(items.iter().map(Tree::to_value).collect()),
            Tree::Mapping(entries) => {
                let mut map = Map::with_capacity(entries.len());
                for (k, v) in entries {
                    map.insert(k.clone(), v.to_value());
                }
                Value::Object(map)
            }
        }
    }

    /// Compact JSON with key order preserved. Equal trees encode identically.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        self.to_value().to_string().into_bytes()
    }

    /// [`common::content_digest`] of the canonical encoding.
    pub fn digest(&self) -> String {
        common::content_digest(&self.canonical_bytes())
    }

    fn empty_like(&self) -> Tree {
        match self {
            Tree::Sequence(_) => Tree::Sequence(Vec::new()),
            Tree::Mapping(_) => Tree::Mapping(Vec::new()),
            Tree::Scalar(s) => Tree::Scalar(s.clone()),
        }
    }
}

impl From<Value> for Tree {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Tree::NULL,
            Value::Bool(b) => Tree::Scalar(Scalar::Bool(b)),
            Value::Number(n) => Tree::Scalar(Scalar::Number(n)),
            Value::String(s) => Tree::Scalar(Scalar::String(s)),
            Value::Array(items) => Tree::Sequence(items.into_iter().map(Tree::from).collect()),
            Value::Object(map) => {
                Tree::Mapping(map.into_iter().map(|(k, v)| (k, Tree::from(v))).collect())
            }
        }
    }
}

/// Projects `published` onto the shape of `deployed`.
///
/// The output never contains a mapping key that `deployed` does not have at
/// the same position.
pub fn project(deployed: &Tree, published: &Tree) -> Tree {
    match (deployed, published) {
        (Tree::Mapping(d), Tree::Mapping(_)) => Tree::Mapping(
            d.iter()
                .map(|(key, d_value)| {
                    let projected = match published.get(key) {
                        Some(p_value) => project(d_value, p_value),
                        None => Tree::NULL,
                    };
                    (key.clone(), projected)
                })
                .collect(),
        ),
        (Tree::Sequence(d), Tree::Sequence(p)) => Tree::Sequence(
            d.iter()
                .enumerate()
                .map(|(i, d_item)| match p.get(i) {
                    Some(p_item) => project(d_item, p_item),
                    None => Tree::NULL,
                })
                .collect(),
        ),
        (_, Tree::Scalar(_)) => published.clone(),
        (_, composite) => composite.empty_like(),
    }
}
