//! Cache keys for task inputs
//!
//! Inputs are first reduced to a [`Canonical`] tree: any node carrying a
//! precomputed hash collapses to that hash, everything else keeps its shape.
//! The tree is then fed through SHA-256 with a type tag before every node and
//! a length prefix before every variable-size field, so no two distinct trees
//! share an encoding.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use kiln_core::{BlobDimensionality, Literal, LiteralMap, LiteralValue, Scalar};

/// Key of one cached task result: `<task>-<cache_version>-<digest>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name usable as a single path component
    ///
    /// Keys made only of `[A-Za-z0-9._-]` are used as is. Other characters
    /// become `_` and a digest of the full key is appended to keep names
    /// distinct.
    pub fn file_name(&self) -> String {
        let safe = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-');
        if !self.0.is_empty() && self.0.chars().all(safe) && !self.0.starts_with('.') {
            return self.0.clone();
        }
        let cleaned: String = self
            .0
            .chars()
            .map(|c| if safe(c) { c } else { '_' })
            .collect();
        let digest = format!("{:x}", Sha256::digest(self.0.as_bytes()));
        format!("{}-{}", cleaned.trim_start_matches('.'), &digest[..12])
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Canonical form of a literal, ready for hashing
#[derive(Debug, Clone, PartialEq)]
pub enum Canonical<'a> {
    /// Node replaced by its precomputed hash
    Hash(&'a str),
    Scalar(&'a Scalar),
    Collection(Vec<Canonical<'a>>),
    /// Entries sorted by key
    Map(Vec<(&'a str, Canonical<'a>)>),
}

/// Reduce a literal to its canonical form
///
/// A node with a hash never has its children visited.
pub fn canonicalize(literal: &Literal) -> Canonical<'_> {
    if let Some(hash) = &literal.hash {
        return Canonical::Hash(hash);
    }
    match &literal.value {
        LiteralValue::Scalar(scalar) => Canonical::Scalar(scalar),
        LiteralValue::Collection(items) => {
            Canonical::Collection(items.iter().map(canonicalize).collect())
        }
        LiteralValue::Map(map) => Canonical::Map(canonicalize_map(map)),
    }
}

fn canonicalize_map(map: &LiteralMap) -> Vec<(&str, Canonical<'_>)> {
    // LiteralMap iterates in key order already
    map.iter()
        .map(|(name, literal)| (name.as_str(), canonicalize(literal)))
        .collect()
}

/// Compute the cache key for one task invocation
pub fn fingerprint(task_name: &str, cache_version: &str, inputs: &LiteralMap) -> CacheKey {
    let mut hasher = StructuralHasher::new();
    hasher.map(&canonicalize_map(inputs));
    CacheKey(format!("{}-{}-{}", task_name, cache_version, hasher.finish()))
}

/// Digest of a single literal, as used inside [`fingerprint`]
pub fn literal_digest(literal: &Literal) -> String {
    let mut hasher = StructuralHasher::new();
    hasher.node(&canonicalize(literal));
    hasher.finish()
}

mod tag {
    pub const HASH: u8 = 0x01;
    pub const COLLECTION: u8 = 0x02;
    pub const MAP: u8 = 0x03;
    pub const NONE: u8 = 0x10;
    pub const BOOLEAN: u8 = 0x11;
    pub const INTEGER: u8 = 0x12;
    pub const FLOAT: u8 = 0x13;
    pub const STRING: u8 = 0x14;
    pub const DATETIME: u8 = 0x15;
    pub const DURATION: u8 = 0x16;
    pub const BINARY: u8 = 0x17;
    pub const BLOB: u8 = 0x18;
    pub const GENERIC: u8 = 0x19;
    pub const JSON_NULL: u8 = 0x20;
    pub const JSON_BOOL: u8 = 0x21;
    /// Struct numbers are doubles, so `1` and `1.0` share one encoding
    pub const JSON_NUMBER: u8 = 0x24;
    pub const JSON_STRING: u8 = 0x25;
    pub const JSON_ARRAY: u8 = 0x26;
    pub const JSON_OBJECT: u8 = 0x27;
}

struct StructuralHasher {
    inner: Sha256,
}

impl StructuralHasher {
    fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    fn finish(self) -> String {
        format!("{:x}", self.inner.finalize())
    }

    fn tag(&mut self, tag: u8) {
        self.inner.update([tag]);
    }

    fn len(&mut self, len: usize) {
        self.inner.update((len as u64).to_le_bytes());
    }

    fn bytes(&mut self, bytes: &[u8]) {
        self.len(bytes.len());
        self.inner.update(bytes);
    }

    fn float(&mut self, value: f64) {
        // -0.0 == 0.0 and every NaN is the same NaN
        let normalized = if value == 0.0 {
            0.0f64
        } else if value.is_nan() {
            f64::NAN
        } else {
            value
        };
        self.inner.update(normalized.to_bits().to_le_bytes());
    }

    fn node(&mut self, node: &Canonical<'_>) {
        match node {
            Canonical::Hash(hash) => {
                self.tag(tag::HASH);
                self.bytes(hash.as_bytes());
            }
            Canonical::Scalar(scalar) => self.scalar(scalar),
            Canonical::Collection(items) => {
                self.tag(tag::COLLECTION);
                self.len(items.len());
                for item in items {
                    self.node(item);
                }
            }
            Canonical::Map(entries) => self.map(entries),
        }
    }

    fn map(&mut self, entries: &[(&str, Canonical<'_>)]) {
        self.tag(tag::MAP);
        self.len(entries.len());
        for (key, value) in entries {
            self.bytes(key.as_bytes());
            self.node(value);
        }
    }

    fn scalar(&mut self, scalar: &Scalar) {
        match scalar {
            Scalar::None => self.tag(tag::NONE),
            Scalar::Boolean(b) => {
                self.tag(tag::BOOLEAN);
                self.inner.update([u8::from(*b)]);
            }
            Scalar::Integer(i) => {
                self.tag(tag::INTEGER);
                self.inner.update(i.to_le_bytes());
            }
            Scalar::Float(f) => {
                self.tag(tag::FLOAT);
                self.float(*f);
            }
            Scalar::String(s) => {
                self.tag(tag::STRING);
                self.bytes(s.as_bytes());
            }
            Scalar::Datetime(dt) => {
                self.tag(tag::DATETIME);
                self.inner.update(dt.timestamp().to_le_bytes());
                self.inner.update(dt.timestamp_subsec_nanos().to_le_bytes());
            }
            Scalar::Duration(d) => {
                self.tag(tag::DURATION);
                self.inner.update(d.as_secs().to_le_bytes());
                self.inner.update(d.subsec_nanos().to_le_bytes());
            }
            Scalar::Binary(binary) => {
                self.tag(tag::BINARY);
                self.bytes(binary.tag.as_bytes());
                self.bytes(&binary.value);
            }
            Scalar::Blob(blob) => {
                self.tag(tag::BLOB);
                self.bytes(blob.uri.as_bytes());
                self.bytes(blob.format.as_bytes());
                self.inner.update([match blob.dimensionality {
                    BlobDimensionality::Single => 0u8,
                    BlobDimensionality::Multipart => 1u8,
                }]);
            }
            Scalar::Generic(fields) => {
                self.tag(tag::GENERIC);
                self.json_object(fields);
            }
        }
    }

    fn json_object(&mut self, fields: &serde_json::Map<String, serde_json::Value>) {
        let mut sorted: Vec<_> = fields.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        self.len(sorted.len());
        for (key, value) in sorted {
            self.bytes(key.as_bytes());
            self.json(value);
        }
    }

    fn json(&mut self, value: &serde_json::Value) {
        use serde_json::Value;
        match value {
            Value::Null => self.tag(tag::JSON_NULL),
            Value::Bool(b) => {
                self.tag(tag::JSON_BOOL);
                self.inner.update([u8::from(*b)]);
            }
            Value::Number(n) => {
                self.tag(tag::JSON_NUMBER);
                self.float(n.as_f64().unwrap_or(f64::NAN));
            }
            Value::String(s) => {
                self.tag(tag::JSON_STRING);
                self.bytes(s.as_bytes());
            }
            Value::Array(items) => {
                self.tag(tag::JSON_ARRAY);
                self.len(items.len());
                for item in items {
                    self.json(item);
                }
            }
            Value::Object(fields) => {
                self.tag(tag::JSON_OBJECT);
                self.json_object(fields);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn generic(value: serde_json::Value) -> Literal {
        match value {
            serde_json::Value::Object(fields) => Literal::scalar(Scalar::Generic(fields)),
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let inputs = LiteralMap::new().with("x", 3i64).with("y", 4i64);
        let a = fingerprint("add_numbers", "1", &inputs);
        let b = fingerprint("add_numbers", "1", &inputs.clone());
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("add_numbers-1-"));
        assert_eq!(a.as_str().len(), "add_numbers-1-".len() + 64);
    }

    #[test]
    fn test_fingerprint_ignores_insertion_order() {
        let inputs = LiteralMap::new().with("x", 3i64).with("y", 4i64);
        let first = fingerprint("add_numbers", "1", &inputs);
        let rebuilt = LiteralMap::new().with("y", 4i64).with("x", 3i64);
        assert_eq!(first, fingerprint("add_numbers", "1", &rebuilt));
    }

    #[test]
    fn test_fingerprint_differs_on_identity_and_values() {
        let inputs = LiteralMap::new().with("x", 3i64);
        let base = fingerprint("t", "1", &inputs);
        assert_ne!(base, fingerprint("t", "2", &inputs));
        assert_ne!(base, fingerprint("u", "1", &inputs));
        assert_ne!(base, fingerprint("t", "1", &LiteralMap::new().with("x", 4i64)));
        assert_ne!(base, fingerprint("t", "1", &LiteralMap::new().with("x", 3.0f64)));
        assert_ne!(base, fingerprint("t", "1", &LiteralMap::new().with("x", "3")));
    }

    #[test]
    fn test_hashed_node_short_circuits() {
        let a = Literal::blob("s3://bucket/a.parquet", "parquet").with_hash("abc123");
        let b = Literal::blob("file:///tmp/copy.parquet", "parquet").with_hash("abc123");

        let in_a = LiteralMap::new().with("df", a);
        let in_b = LiteralMap::new().with("df", b);
        assert_eq!(fingerprint("t", "1", &in_a), fingerprint("t", "1", &in_b));

        let nested_a = Literal::collection(vec![Literal::from(1i64)]).with_hash("h");
        let nested_b = Literal::collection(vec![Literal::from(2i64), Literal::from(3i64)]).with_hash("h");
        assert_eq!(canonicalize(&nested_a), canonicalize(&nested_b));
    }

    #[test]
    fn test_hash_differs_from_unhashed_content() {
        let hashed = LiteralMap::new().with("v", Literal::from("abc").with_hash("abc"));
        let plain = LiteralMap::new().with("v", "abc");
        assert_ne!(fingerprint("t", "1", &hashed), fingerprint("t", "1", &plain));
    }

    #[test]
    fn test_struct_field_order_invariance() {
        let mut ab = serde_json::Map::new();
        ab.insert("a".to_string(), json!(1));
        ab.insert("b".to_string(), json!({"y": 2, "x": [1, 2]}));
        let mut ba = serde_json::Map::new();
        ba.insert("b".to_string(), json!({"x": [1, 2], "y": 2}));
        ba.insert("a".to_string(), json!(1));

        let left = LiteralMap::new().with("s", Literal::scalar(Scalar::Generic(ab)));
        let right = LiteralMap::new().with("s", Literal::scalar(Scalar::Generic(ba)));
        assert_eq!(fingerprint("t", "1", &left), fingerprint("t", "1", &right));
    }

    #[test]
    fn test_struct_numbers_hash_as_doubles() {
        let generic = |value: serde_json::Value| {
            let serde_json::Value::Object(fields) = value else {
                unreachable!()
            };
            LiteralMap::new().with("s", Literal::scalar(Scalar::Generic(fields)))
        };

        let int = fingerprint("t", "1", &generic(json!({"n": 1, "list": [2, -0]})));
        let float = fingerprint("t", "1", &generic(json!({"n": 1.0, "list": [2.0, 0.0]})));
        assert_eq!(int, float);

        let other = fingerprint("t", "1", &generic(json!({"n": 1.5, "list": [2, 0]})));
        assert_ne!(int, other);
    }

    #[test]
    fn test_nested_structures() {
        let nested = LiteralMap::new().with(
            "m",
            Literal::map(LiteralMap::new().with(
                "inner",
                Literal::collection(vec![Literal::from(1i64), generic(json!({"k": true}))]),
            )),
        );
        let same = nested.clone();
        assert_eq!(fingerprint("t", "1", &nested), fingerprint("t", "1", &same));

        let flattened = LiteralMap::new().with(
            "m",
            Literal::collection(vec![Literal::from(1i64), generic(json!({"k": true}))]),
        );
        assert_ne!(fingerprint("t", "1", &nested), fingerprint("t", "1", &flattened));
    }

    #[test]
    fn test_float_zero_normalized() {
        let pos = LiteralMap::new().with("f", 0.0f64);
        let neg = LiteralMap::new().with("f", -0.0f64);
        assert_eq!(fingerprint("t", "1", &pos), fingerprint("t", "1", &neg));
    }

    #[test]
    fn test_file_name_for_unsafe_keys() {
        let plain = CacheKey::from("add_numbers-1-abc".to_string());
        assert_eq!(plain.file_name(), "add_numbers-1-abc");

        let nested = CacheKey::from("wf/step one-1-abc".to_string());
        let name = nested.file_name();
        assert!(name.starts_with("wf_step_one-1-abc-"));
        assert!(!name.contains('/'));
        assert_ne!(name, CacheKey::from("wf_step one-1-abc".to_string()).file_name());
    }
}
