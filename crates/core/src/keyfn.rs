//! Serializable key functions for derived indexes
//!
//! A key function is a pure mapping from document to scalar. Its definition
//! travels with persisted index metadata so that independently deployed
//! processes can compare and reconstruct it; logical equivalence therefore
//! cannot rely on in-process identity, and arbitrary closures are ruled out
//! by construction.
//!
//! ## Combinator language
//!
//! Key functions are a closed AST:
//!
//! - `Field(name)`: pick a top-level field (the bare-name shorthand)
//! - `Path(names)`: pick through nested documents
//! - `Lower` / `Upper`: case-fold a text result
//! - `Length`: code-point count of a text result
//! - `Add` / `Mul`: integer arithmetic on an integer result
//!
//! ## Blob format
//!
//! The persisted blob is the AST's canonical JSON encoding (externally
//! tagged enum, e.g. `{"field":"age"}` or
//! `{"lower":{"field":"email"}}`). The encoding contains no maps with
//! nondeterministic order, so equal functions always produce byte-equal
//! blobs, and blob byte equality is the definition of key-function
//! equality.

use crate::error::{Error, Result};
use crate::value::{Document, Scalar, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error raised while applying a key function to one document
///
/// Converted to `Error::IndexApply` (with the index name attached) at the
/// write boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyError(pub String);

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ApplyError {}

/// A pure, serializable mapping from document to scalar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyFn {
    /// Pick a top-level field
    Field(String),
    /// Pick through nested documents
    Path(Vec<String>),
    /// Lowercase a text result
    Lower(Box<KeyFn>),
    /// Uppercase a text result
    Upper(Box<KeyFn>),
    /// Code-point count of a text result
    Length(Box<KeyFn>),
    /// Add a constant to an integer result
    Add {
        /// Inner function, must yield an integer
        inner: Box<KeyFn>,
        /// Constant to add
        amount: i64,
    },
    /// Multiply an integer result by a constant
    Mul {
        /// Inner function, must yield an integer
        inner: Box<KeyFn>,
        /// Constant factor
        factor: i64,
    },
}

impl KeyFn {
    /// Shorthand: pick the named top-level field
    pub fn field(name: impl Into<String>) -> Self {
        KeyFn::Field(name.into())
    }

    /// Pick through nested documents along `names`
    pub fn path<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        KeyFn::Path(names.into_iter().map(Into::into).collect())
    }

    /// Lowercase the text this function yields
    pub fn lower(self) -> Self {
        KeyFn::Lower(Box::new(self))
    }

    /// Uppercase the text this function yields
    pub fn upper(self) -> Self {
        KeyFn::Upper(Box::new(self))
    }

    /// Code-point count of the text this function yields
    pub fn length(self) -> Self {
        KeyFn::Length(Box::new(self))
    }

    /// Add a constant to the integer this function yields
    pub fn plus(self, amount: i64) -> Self {
        KeyFn::Add {
            inner: Box::new(self),
            amount,
        }
    }

    /// Multiply the integer this function yields by a constant
    pub fn times(self, factor: i64) -> Self {
        KeyFn::Mul {
            inner: Box::new(self),
            factor,
        }
    }

    /// Apply the function to one document
    ///
    /// Deterministic and side-effect free. Missing fields, nulls, and
    /// unordered values (arrays, nested documents where a scalar is
    /// required) are errors: a record must never be indexed to a null,
    /// missing, or unordered value.
    pub fn apply(&self, doc: &Document) -> std::result::Result<Scalar, ApplyError> {
        match self {
            KeyFn::Field(name) => pick(doc, std::slice::from_ref(name)),
            KeyFn::Path(names) => {
                if names.is_empty() {
                    return Err(ApplyError("empty field path".to_string()));
                }
                pick(doc, names)
            }
            KeyFn::Lower(inner) => match inner.apply(doc)? {
                Scalar::Text(s) => Ok(Scalar::Text(s.to_lowercase())),
                other => Err(ApplyError(format!(
                    "lower requires text, got {}",
                    other.scalar_type()
                ))),
            },
            KeyFn::Upper(inner) => match inner.apply(doc)? {
                Scalar::Text(s) => Ok(Scalar::Text(s.to_uppercase())),
                other => Err(ApplyError(format!(
                    "upper requires text, got {}",
                    other.scalar_type()
                ))),
            },
            KeyFn::Length(inner) => match inner.apply(doc)? {
                Scalar::Text(s) => Ok(Scalar::Int(s.chars().count() as i64)),
                other => Err(ApplyError(format!(
                    "length requires text, got {}",
                    other.scalar_type()
                ))),
            },
            KeyFn::Add { inner, amount } => match inner.apply(doc)? {
                Scalar::Int(i) => i
                    .checked_add(*amount)
                    .map(Scalar::Int)
                    .ok_or_else(|| ApplyError("integer overflow in add".to_string())),
                other => Err(ApplyError(format!(
                    "add requires int, got {}",
                    other.scalar_type()
                ))),
            },
            KeyFn::Mul { inner, factor } => match inner.apply(doc)? {
                Scalar::Int(i) => i
                    .checked_mul(*factor)
                    .map(Scalar::Int)
                    .ok_or_else(|| ApplyError("integer overflow in mul".to_string())),
                other => Err(ApplyError(format!(
                    "mul requires int, got {}",
                    other.scalar_type()
                ))),
            },
        }
    }

    /// Encode the function as its canonical persisted blob
    pub fn to_blob(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| Error::invalid_key_fn(format!("serialization failed: {e}")))
    }

    /// Decode a function from a persisted blob
    pub fn from_blob(blob: &[u8]) -> Result<Self> {
        serde_json::from_slice(blob)
            .map_err(|e| Error::invalid_key_fn(format!("deserialization failed: {e}")))
    }

    /// Round-trip the function through its blob and verify equivalence
    ///
    /// Encodes, decodes, applies both the original and the reconstruction
    /// to `sample`, and requires identical outcomes. Returns the
    /// reconstructed function on success.
    pub fn verify_round_trip(&self, sample: &Document) -> Result<KeyFn> {
        let blob = self.to_blob()?;
        let restored = KeyFn::from_blob(&blob)?;
        if restored != *self {
            return Err(Error::invalid_key_fn(
                "reconstructed function differs from original",
            ));
        }
        let original = self.apply(sample);
        let replayed = restored.apply(sample);
        if original != replayed {
            return Err(Error::invalid_key_fn(format!(
                "round-trip output mismatch: {original:?} vs {replayed:?}"
            )));
        }
        Ok(restored)
    }
}

/// Walk `names` through nested documents and return the scalar leaf
fn pick(doc: &Document, names: &[String]) -> std::result::Result<Scalar, ApplyError> {
    let (last, prefix) = names.split_last().expect("pick requires at least one name");
    let mut current = doc;
    for name in prefix {
        match current.get(name) {
            Some(Value::Document(d)) => current = d,
            Some(other) => {
                return Err(ApplyError(format!(
                    "field {name:?} is {}, expected document",
                    other.kind()
                )))
            }
            None => return Err(ApplyError(format!("field {name:?} is missing"))),
        }
    }
    match current.get(last) {
        Some(Value::Scalar(s)) => {
            if s.is_storable() {
                Ok(s.clone())
            } else {
                Err(ApplyError(format!("field {last:?} is a non-finite float")))
            }
        }
        Some(Value::Null) => Err(ApplyError(format!("field {last:?} is null"))),
        Some(other) => Err(ApplyError(format!(
            "field {last:?} is {}, not indexable",
            other.kind()
        ))),
        None => Err(ApplyError(format!("field {last:?} is missing"))),
    }
}

impl fmt::Display for KeyFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyFn::Field(name) => write!(f, "d[{name:?}]"),
            KeyFn::Path(names) => {
                write!(f, "d")?;
                for n in names {
                    write!(f, "[{n:?}]")?;
                }
                Ok(())
            }
            KeyFn::Lower(inner) => write!(f, "lower({inner})"),
            KeyFn::Upper(inner) => write!(f, "upper({inner})"),
            KeyFn::Length(inner) => write!(f, "length({inner})"),
            KeyFn::Add { inner, amount } => write!(f, "({inner} + {amount})"),
            KeyFn::Mul { inner, factor } => write!(f, "({inner} * {factor})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ScalarType;

    fn sample() -> Document {
        Document::new()
            .with("name", "Alex")
            .with("age", 31)
            .with("email", "ABC@X")
            .with(
                "address",
                Value::Document(Document::new().with("city", "Oslo")),
            )
    }

    #[test]
    fn field_pick() {
        assert_eq!(
            KeyFn::field("age").apply(&sample()).unwrap(),
            Scalar::Int(31)
        );
    }

    #[test]
    fn nested_path_pick() {
        let f = KeyFn::path(["address", "city"]);
        assert_eq!(f.apply(&sample()).unwrap(), Scalar::Text("Oslo".into()));
    }

    #[test]
    fn missing_field_is_an_error() {
        let err = KeyFn::field("height").apply(&sample()).unwrap_err();
        assert!(err.0.contains("missing"));
    }

    #[test]
    fn null_field_is_an_error() {
        let doc = Document::new().with("x", Value::Null);
        let err = KeyFn::field("x").apply(&doc).unwrap_err();
        assert!(err.0.contains("null"));
    }

    #[test]
    fn unordered_values_are_errors() {
        let err = KeyFn::field("address").apply(&sample()).unwrap_err();
        assert!(err.0.contains("not indexable"));
    }

    #[test]
    fn lower_folds_case() {
        let f = KeyFn::field("email").lower();
        assert_eq!(f.apply(&sample()).unwrap(), Scalar::Text("abc@x".into()));
    }

    #[test]
    fn lower_rejects_non_text() {
        let err = KeyFn::field("age").lower().apply(&sample()).unwrap_err();
        assert!(err.0.contains("requires text"));
    }

    #[test]
    fn length_counts_code_points() {
        let doc = Document::new().with("s", "héllo");
        assert_eq!(
            KeyFn::field("s").length().apply(&doc).unwrap(),
            Scalar::Int(5)
        );
    }

    #[test]
    fn arithmetic_combinators() {
        let f = KeyFn::field("age").plus(1).times(2);
        assert_eq!(f.apply(&sample()).unwrap(), Scalar::Int(64));
    }

    #[test]
    fn arithmetic_overflow_is_an_error() {
        let doc = Document::new().with("n", i64::MAX);
        let err = KeyFn::field("n").plus(1).apply(&doc).unwrap_err();
        assert!(err.0.contains("overflow"));
    }

    #[test]
    fn blob_is_canonical_and_byte_equal() {
        let a = KeyFn::field("email").lower();
        let b = KeyFn::field("email").lower();
        assert_eq!(a.to_blob().unwrap(), b.to_blob().unwrap());

        let c = KeyFn::field("email").upper();
        assert_ne!(a.to_blob().unwrap(), c.to_blob().unwrap());
    }

    #[test]
    fn blob_roundtrip() {
        let f = KeyFn::path(["a", "b"]).length().plus(-3).times(7);
        let blob = f.to_blob().unwrap();
        assert_eq!(KeyFn::from_blob(&blob).unwrap(), f);
    }

    #[test]
    fn from_blob_rejects_garbage() {
        let err = KeyFn::from_blob(b"{not json").unwrap_err();
        assert!(matches!(err, Error::InvalidKeyFn { .. }));
    }

    #[test]
    fn verify_round_trip_matches_direct_apply() {
        let f = KeyFn::field("email").lower();
        let doc = sample();
        let restored = f.verify_round_trip(&doc).unwrap();
        assert_eq!(restored.apply(&doc), f.apply(&doc));
    }

    #[test]
    fn apply_output_type_is_stable() {
        let f = KeyFn::field("email").lower();
        let tag = f.apply(&sample()).unwrap().scalar_type();
        assert_eq!(tag, ScalarType::Text);
    }
}
