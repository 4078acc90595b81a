//! Identifier and timestamp types
//!
//! This module defines:
//! - `RecordId`: 128-bit record identifier, generated uniformly at random
//! - `ProcessId`: identity of one running process, used for heartbeats
//! - `Timestamp`: nanosecond-precision instant
//!
//! Identifiers order by unsigned big-endian byte sequence, which is the
//! derived `Ord` of the underlying UUID. Timestamps order by absolute
//! instant. Both orderings are part of the index-value ordering contract,
//! so every backend must agree with them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

// =============================================================================
// RecordId
// =============================================================================

/// Unique identifier for a stored record
///
/// Generated uniformly at random on `create`. Identifiers are immutable and
/// never reused after deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Generate a fresh random identifier
    pub fn new() -> Self {
        RecordId(Uuid::new_v4())
    }

    /// Parse an identifier from its string form
    ///
    /// Accepts hyphenated, simple, and urn forms.
    pub fn from_string(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(RecordId)
    }

    /// The identifier as big-endian bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Smallest possible identifier (all zero bytes)
    ///
    /// Used by backends to form half-open scan bounds over (value, id) keys.
    pub fn min_value() -> Self {
        RecordId(Uuid::nil())
    }

    /// Largest possible identifier (all 0xFF bytes)
    pub fn max_value() -> Self {
        RecordId(Uuid::max())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

// =============================================================================
// ProcessId
// =============================================================================

/// Identity of one running process
///
/// A fresh `ProcessId` is minted when a store is opened. Heartbeats are
/// keyed by `(process_id, collection)`, so two stores in the same OS
/// process count as two independent processes for lifecycle purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProcessId(Uuid);

impl ProcessId {
    /// Generate a fresh process identity
    pub fn new() -> Self {
        ProcessId(Uuid::new_v4())
    }
}

impl Default for ProcessId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

// =============================================================================
// Timestamp
// =============================================================================

/// An instant with nanosecond precision
///
/// Stored as signed nanoseconds since the Unix epoch. Lifecycle bookkeeping
/// (`last_seen_at`, `retiring_since`, heartbeats) always uses the backend's
/// authoritative clock, never a process-local one, so clock skew between
/// processes cannot cause spurious index drops.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Construct from nanoseconds since the Unix epoch
    pub fn from_nanos(nanos: i64) -> Self {
        Timestamp(nanos)
    }

    /// Construct from microseconds since the Unix epoch
    pub fn from_micros(micros: i64) -> Self {
        Timestamp(micros.saturating_mul(1_000))
    }

    /// The current wall-clock instant
    pub fn now() -> Self {
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos().min(i64::MAX as u128) as i64)
            .unwrap_or(0);
        Timestamp(nanos)
    }

    /// Nanoseconds since the Unix epoch
    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    /// The instant `d` after this one (saturating)
    pub fn plus(&self, d: Duration) -> Self {
        Timestamp(
            self.0
                .saturating_add(d.as_nanos().min(i64::MAX as u128) as i64),
        )
    }

    /// Duration elapsed from `earlier` to `self`, zero if `earlier` is later
    pub fn since(&self, earlier: Timestamp) -> Duration {
        if self.0 <= earlier.0 {
            Duration::ZERO
        } else {
            Duration::from_nanos((self.0 - earlier.0) as u64)
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_ids_are_unique() {
        let a = RecordId::new();
        let b = RecordId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn record_id_roundtrips_through_string() {
        let id = RecordId::new();
        let parsed = RecordId::from_string(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn record_id_rejects_garbage() {
        assert!(RecordId::from_string("not-a-uuid").is_none());
    }

    #[test]
    fn record_id_orders_by_bytes() {
        let lo = RecordId::min_value();
        let hi = RecordId::max_value();
        assert!(lo < hi);
        let mid = RecordId::new();
        assert!(lo <= mid && mid <= hi);
    }

    #[test]
    fn timestamp_plus_and_since() {
        let t = Timestamp::from_nanos(1_000);
        let later = t.plus(Duration::from_nanos(500));
        assert_eq!(later.as_nanos(), 1_500);
        assert_eq!(later.since(t), Duration::from_nanos(500));
        assert_eq!(t.since(later), Duration::ZERO);
    }

    #[test]
    fn timestamp_micros_scale() {
        assert_eq!(Timestamp::from_micros(2).as_nanos(), 2_000);
    }

    #[test]
    fn timestamp_now_is_monotonic_enough() {
        let a = Timestamp::now();
        let b = Timestamp::now();
        assert!(b >= a);
    }
}
