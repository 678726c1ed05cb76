//! Structured values exchanged between tasks
//!
//! A [`Literal`] is a recursive scalar / collection / map tree. Any node may
//! carry a precomputed `hash`; when it does, cache fingerprinting uses that
//! hash instead of the node's contents. This is how values whose payload
//! lives elsewhere (an uploaded blob, a large dataset) stay cheap to key.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single structured value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Literal {
    /// The value itself
    pub value: LiteralValue,

    /// Precomputed digest, authoritative for fingerprinting when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Shape of a literal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralValue {
    /// Leaf value
    Scalar(Scalar),
    /// Ordered sequence
    Collection(Vec<Literal>),
    /// String-keyed mapping
    Map(LiteralMap),
}

/// Leaf values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scalar {
    None,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Datetime(DateTime<Utc>),
    Duration(Duration),
    Binary(Binary),
    Blob(Blob),
    /// Untyped struct; field order carries no meaning
    Generic(serde_json::Map<String, serde_json::Value>),
}

/// Reference to an externally stored file or directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub uri: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub dimensionality: BlobDimensionality,
}

/// Whether a blob is a single file or a directory of parts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobDimensionality {
    #[default]
    Single,
    Multipart,
}

/// Raw bytes with a free-form tag describing the encoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binary {
    pub value: Vec<u8>,
    #[serde(default)]
    pub tag: String,
}

impl Literal {
    /// Wrap a scalar
    pub fn scalar(scalar: Scalar) -> Self {
        Self {
            value: LiteralValue::Scalar(scalar),
            hash: None,
        }
    }

    /// Build a collection literal
    pub fn collection(items: impl IntoIterator<Item = Literal>) -> Self {
        Self {
            value: LiteralValue::Collection(items.into_iter().collect()),
            hash: None,
        }
    }

    /// Build a map literal
    pub fn map(map: LiteralMap) -> Self {
        Self {
            value: LiteralValue::Map(map),
            hash: None,
        }
    }

    /// Literal representing the absence of a value
    pub fn none() -> Self {
        Self::scalar(Scalar::None)
    }

    /// Build a blob reference
    pub fn blob(uri: impl Into<String>, format: impl Into<String>) -> Self {
        Self::scalar(Scalar::Blob(Blob {
            uri: uri.into(),
            format: format.into(),
            dimensionality: BlobDimensionality::Single,
        }))
    }

    /// Attach a precomputed hash
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    /// Get the scalar, if this is a leaf
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match &self.value {
            LiteralValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self.as_scalar()? {
            Scalar::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self.as_scalar()? {
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.as_scalar()? {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self.as_scalar()? {
            Scalar::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&[Literal]> {
        match &self.value {
            LiteralValue::Collection(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&LiteralMap> {
        match &self.value {
            LiteralValue::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl From<Scalar> for Literal {
    fn from(scalar: Scalar) -> Self {
        Self::scalar(scalar)
    }
}

impl From<i64> for Literal {
    fn from(v: i64) -> Self {
        Self::scalar(Scalar::Integer(v))
    }
}

impl From<f64> for Literal {
    fn from(v: f64) -> Self {
        Self::scalar(Scalar::Float(v))
    }
}

impl From<bool> for Literal {
    fn from(v: bool) -> Self {
        Self::scalar(Scalar::Boolean(v))
    }
}

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Self::scalar(Scalar::String(v.to_string()))
    }
}

impl From<String> for Literal {
    fn from(v: String) -> Self {
        Self::scalar(Scalar::String(v))
    }
}

impl From<DateTime<Utc>> for Literal {
    fn from(v: DateTime<Utc>) -> Self {
        Self::scalar(Scalar::Datetime(v))
    }
}

/// Named set of literals (task inputs or outputs)
///
/// Backed by a `BTreeMap`, so iteration is always sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LiteralMap {
    literals: BTreeMap<String, Literal>,
}

impl LiteralMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, literal: impl Into<Literal>) -> Self {
        self.insert(name, literal);
        self
    }

    /// Insert a literal, returning the previous one under that name
    pub fn insert(&mut self, name: impl Into<String>, literal: impl Into<Literal>) -> Option<Literal> {
        self.literals.insert(name.into(), literal.into())
    }

    pub fn get(&self, name: &str) -> Option<&Literal> {
        self.literals.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.literals.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    /// Iterate in name order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Literal)> {
        self.literals.iter()
    }

    /// Names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.literals.keys().map(String::as_str)
    }
}

impl FromIterator<(String, Literal)> for LiteralMap {
    fn from_iter<I: IntoIterator<Item = (String, Literal)>>(iter: I) -> Self {
        Self {
            literals: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for LiteralMap {
    type Item = (String, Literal);
    type IntoIter = std::collections::btree_map::IntoIter<String, Literal>;

    fn into_iter(self) -> Self::IntoIter {
        self.literals.into_iter()
    }
}

impl<'a> IntoIterator for &'a LiteralMap {
    type Item = (&'a String, &'a Literal);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Literal>;

    fn into_iter(self) -> Self::IntoIter {
        self.literals.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_map_iterates_sorted() {
        let map = LiteralMap::new()
            .with("zeta", 1i64)
            .with("alpha", 2i64)
            .with("mid", 3i64);

        let names: Vec<_> = map.names().collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_literal_accessors() {
        assert_eq!(Literal::from(7i64).as_integer(), Some(7));
        assert_eq!(Literal::from("hi").as_str(), Some("hi"));
        assert_eq!(Literal::from(1.5).as_float(), Some(1.5));
        assert!(Literal::from(7i64).as_str().is_none());

        let blob = Literal::blob("s3://bucket/key", "csv");
        assert_eq!(blob.as_blob().unwrap().uri, "s3://bucket/key");
    }

    #[test]
    fn test_with_hash() {
        let lit = Literal::blob("s3://bucket/key", "").with_hash("abc123");
        assert_eq!(lit.hash.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_nested_serde_shape() {
        let map = LiteralMap::new().with(
            "xs",
            Literal::collection(vec![Literal::from(1i64), Literal::from(2i64)]),
        );
        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(
            json["xs"]["value"]["collection"][0]["value"]["scalar"]["integer"],
            1
        );

        let back: LiteralMap = serde_json::from_value(json).unwrap();
        assert_eq!(back, map);
    }
}
