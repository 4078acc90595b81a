//! Error types for LodeDB
//!
//! One unified `Error` enum covers every failure kind the facade can
//! surface. We use `thiserror` for `Display` and `Error` derivation.
//!
//! ## Failure kinds
//!
//! | Variant | Meaning |
//! |---------|---------|
//! | `NotFound` | No record with the given identifier |
//! | `UnknownIndex` | Query references an index not active on the collection |
//! | `InvalidCondition` | Malformed condition (cross-type comparison, NaN literal) |
//! | `IndexApply` | Key function raised or returned null/unsupported during a write |
//! | `IndexTypeMismatch` | Persisted value type disagrees with a newly computed one |
//! | `InvalidKeyFn` | Key function fails to serialize, deserialize, or round-trip |
//! | `InvalidDocument` | Document body fails structural validation |
//! | `Backend` | Wrapped lower-level failure; carries a retriable flag |
//!
//! ## Policy
//!
//! Writes are all-or-nothing: an `IndexApply` or `IndexTypeMismatch` during
//! a write leaves the store unchanged. `init` retries backfill on
//! `Backend { retriable: true }` with exponential backoff; everything else
//! propagates.

use crate::types::RecordId;
use crate::value::ScalarType;
use thiserror::Error;

/// Result type alias for LodeDB operations
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all LodeDB operations
#[derive(Debug, Error)]
pub enum Error {
    /// No record with the given identifier
    #[error("not found: {collection}/{id}")]
    NotFound {
        /// Collection searched
        collection: String,
        /// Identifier that was not found
        id: RecordId,
    },

    /// Query references an index that is not active on this collection
    #[error("unknown index {index:?} on collection {collection:?}")]
    UnknownIndex {
        /// Collection queried
        collection: String,
        /// Index name the query referenced
        index: String,
    },

    /// Malformed condition
    #[error("invalid condition: {reason}")]
    InvalidCondition {
        /// What is wrong with the condition
        reason: String,
    },

    /// Key function raised or produced an unindexable value during a write
    #[error("index {index:?} apply failed: {reason}")]
    IndexApply {
        /// Index whose key function failed
        index: String,
        /// Why the application failed
        reason: String,
    },

    /// Persisted value type disagrees with a newly computed one
    #[error("index {index:?} type mismatch: persisted {persisted}, computed {computed}")]
    IndexTypeMismatch {
        /// Index in disagreement
        index: String,
        /// Type recorded in persisted metadata
        persisted: ScalarType,
        /// Type just computed from a document
        computed: ScalarType,
    },

    /// Key function fails to serialize, deserialize, or round-trip
    #[error("invalid key function: {reason}")]
    InvalidKeyFn {
        /// What went wrong
        reason: String,
    },

    /// Document body fails structural validation
    #[error("invalid document: {reason}")]
    InvalidDocument {
        /// What is wrong with the document
        reason: String,
    },

    /// Wrapped lower-level backend failure
    ///
    /// `retriable` encodes whether the caller may retry; `init` uses it to
    /// drive backfill backoff.
    #[error("backend error: {message}")]
    Backend {
        /// Human-readable description
        message: String,
        /// Whether retrying the operation may succeed
        retriable: bool,
        /// Underlying cause, when one exists
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Create a NotFound error
    pub fn not_found(collection: impl Into<String>, id: RecordId) -> Self {
        Error::NotFound {
            collection: collection.into(),
            id,
        }
    }

    /// Create an UnknownIndex error
    pub fn unknown_index(collection: impl Into<String>, index: impl Into<String>) -> Self {
        Error::UnknownIndex {
            collection: collection.into(),
            index: index.into(),
        }
    }

    /// Create an InvalidCondition error
    pub fn invalid_condition(reason: impl Into<String>) -> Self {
        Error::InvalidCondition {
            reason: reason.into(),
        }
    }

    /// Create an IndexApply error
    pub fn index_apply(index: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::IndexApply {
            index: index.into(),
            reason: reason.into(),
        }
    }

    /// Create an IndexTypeMismatch error
    pub fn type_mismatch(
        index: impl Into<String>,
        persisted: ScalarType,
        computed: ScalarType,
    ) -> Self {
        Error::IndexTypeMismatch {
            index: index.into(),
            persisted,
            computed,
        }
    }

    /// Create an InvalidKeyFn error
    pub fn invalid_key_fn(reason: impl Into<String>) -> Self {
        Error::InvalidKeyFn {
            reason: reason.into(),
        }
    }

    /// Create an InvalidDocument error
    pub fn invalid_document(reason: impl Into<String>) -> Self {
        Error::InvalidDocument {
            reason: reason.into(),
        }
    }

    /// Create a non-retriable Backend error
    pub fn backend(message: impl Into<String>) -> Self {
        Error::Backend {
            message: message.into(),
            retriable: false,
            source: None,
        }
    }

    /// Create a retriable Backend error
    pub fn backend_retriable(message: impl Into<String>) -> Self {
        Error::Backend {
            message: message.into(),
            retriable: true,
            source: None,
        }
    }

    /// Create a Backend error wrapping a lower-level cause
    pub fn backend_with_source(
        message: impl Into<String>,
        retriable: bool,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Backend {
            message: message.into(),
            retriable,
            source: Some(Box::new(source)),
        }
    }

    /// True for "no record with that identifier"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// True when retrying the failed operation may succeed
    ///
    /// Only backend failures are ever retriable; every other kind needs a
    /// changed input to resolve.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Backend { retriable: true, .. })
    }

    /// True for input-validation failures (fix the input, don't retry)
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidCondition { .. }
                | Error::InvalidDocument { .. }
                | Error::InvalidKeyFn { .. }
        )
    }

    /// True for write-time index maintenance failures
    pub fn is_index_failure(&self) -> bool {
        matches!(
            self,
            Error::IndexApply { .. } | Error::IndexTypeMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let id = RecordId::new();
        let err = Error::not_found("user", id);
        let msg = err.to_string();
        assert!(msg.contains("user"));
        assert!(msg.contains(&id.to_string()));
    }

    #[test]
    fn unknown_index_display() {
        let msg = Error::unknown_index("user", "age").to_string();
        assert!(msg.contains("age") && msg.contains("user"));
    }

    #[test]
    fn type_mismatch_display() {
        let msg = Error::type_mismatch("age", ScalarType::Int, ScalarType::Text).to_string();
        assert!(msg.contains("int") && msg.contains("text"));
    }

    #[test]
    fn retriable_classification() {
        assert!(Error::backend_retriable("transient").is_retryable());
        assert!(!Error::backend("fatal").is_retryable());
        assert!(!Error::invalid_condition("x").is_retryable());
    }

    #[test]
    fn validation_classification() {
        assert!(Error::invalid_document("bad").is_validation());
        assert!(Error::invalid_key_fn("bad").is_validation());
        assert!(!Error::backend("x").is_validation());
    }

    #[test]
    fn index_failure_classification() {
        assert!(Error::index_apply("age", "missing field").is_index_failure());
        assert!(Error::type_mismatch("age", ScalarType::Int, ScalarType::Float).is_index_failure());
        assert!(!Error::not_found("user", RecordId::new()).is_index_failure());
    }

    #[test]
    fn backend_source_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = Error::backend_with_source("write failed", true, io);
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.is_retryable());
    }
}
