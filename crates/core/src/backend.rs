//! The backend contract
//!
//! Every concrete store (in-memory, relational, or otherwise) implements
//! this trait identically. Upper layers (lifecycle engine, facade) are
//! written against it only, so implementations can be swapped without
//! breaking them.
//!
//! ## Atomicity
//!
//! Each method is atomic per call. Record writes update the record body
//! and every active (and building) index entry in one step: if any key
//! function fails to apply, the call fails and the store is unchanged.
//!
//! ## Ordering
//!
//! Writes against a single collection are linearizable at this boundary.
//! `list_records` observes a snapshot consistent with some serial order of
//! completed writes. Nothing is promised across collections.
//!
//! ## Clock
//!
//! `now()` is the backend's authoritative clock. All lifecycle bookkeeping
//! uses it, never a process-local clock, so skew between processes cannot
//! retire a live index.

use crate::condition::QueryPlan;
use crate::error::Result;
use crate::schema::{Heartbeat, IndexMeta, SchemaState};
use crate::types::{RecordId, Timestamp};
use crate::value::Document;
use std::time::Duration;

/// Abstract operations every store must implement
///
/// Thread safety: all methods must be safe to call concurrently from
/// multiple threads (the trait requires `Send + Sync`).
pub trait Backend: Send + Sync {
    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    /// Store a new record, updating all index entries atomically
    ///
    /// # Errors
    ///
    /// `IndexApply` or `IndexTypeMismatch` when index maintenance fails;
    /// the store is left unchanged.
    fn put_record(&self, collection: &str, id: RecordId, doc: &Document) -> Result<()>;

    /// Replace an existing record wholesale, updating all index entries
    /// atomically
    ///
    /// # Errors
    ///
    /// `NotFound` when no record has `id`; index errors as for
    /// [`put_record`](Backend::put_record).
    fn replace_record(&self, collection: &str, id: RecordId, doc: &Document) -> Result<()>;

    /// Fetch a record body
    ///
    /// # Errors
    ///
    /// `NotFound` when no record has `id`.
    fn get_record(&self, collection: &str, id: RecordId) -> Result<Document>;

    /// Delete a record and all its index entries
    ///
    /// # Errors
    ///
    /// `NotFound` when no record has `id`.
    fn delete_record(&self, collection: &str, id: RecordId) -> Result<()>;

    /// Execute a normalized query plan
    ///
    /// Returns the records whose current index entries lie in every
    /// interval of the plan. When the plan constrains exactly one index,
    /// results are ordered ascending by that index's value; otherwise the
    /// order is unspecified. An unconstrained plan returns every record.
    fn list_records(&self, collection: &str, plan: &QueryPlan) -> Result<Vec<(RecordId, Document)>>;

    // ------------------------------------------------------------------
    // Schema metadata
    // ------------------------------------------------------------------

    /// Read the collection's persisted schema table
    ///
    /// A collection that has never been written to has an empty schema.
    fn read_schema(&self, collection: &str) -> Result<SchemaState>;

    /// Insert or overwrite one index's metadata
    fn upsert_index(&self, collection: &str, meta: IndexMeta) -> Result<()>;

    /// Physically drop an index and its entries
    ///
    /// Dropping an unknown index is a no-op.
    fn drop_index(&self, collection: &str, name: &str) -> Result<()>;

    /// Compute every entry of one index from the existing records
    ///
    /// Idempotent; safe to interrupt and re-run. Infers and persists the
    /// index's value type from the first record when it is still unset.
    ///
    /// # Errors
    ///
    /// `IndexApply` when the key function is not total over the current
    /// records; already-computed entries may remain (a re-run after the
    /// offending record is fixed resumes the work).
    fn backfill_index(&self, collection: &str, name: &str) -> Result<()>;

    // ------------------------------------------------------------------
    // Heartbeats
    // ------------------------------------------------------------------

    /// Record a process's declared index set for one collection
    fn heartbeat(&self, heartbeat: Heartbeat) -> Result<()>;

    /// All current heartbeats for one collection
    fn read_heartbeats(&self, collection: &str) -> Result<Vec<Heartbeat>>;

    /// Remove heartbeats older than `ttl` before `now`
    fn prune_stale_heartbeats(&self, now: Timestamp, ttl: Duration) -> Result<()>;

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Names of every known collection
    fn collections(&self) -> Result<Vec<String>>;

    /// The backend's authoritative clock
    fn now(&self) -> Timestamp;
}

#[cfg(test)]
mod tests {
    use super::*;

    // The contract must stay object-safe and shareable: upper layers hold
    // `Arc<dyn Backend>`.
    #[test]
    fn backend_is_object_safe() {
        fn accepts_backend(_b: &dyn Backend) {}
        let _ = accepts_backend as fn(&dyn Backend);
    }

    #[test]
    fn backend_trait_objects_are_send_sync() {
        fn assert_send<T: Send + ?Sized>() {}
        fn assert_sync<T: Sync + ?Sized>() {}
        assert_send::<Box<dyn Backend>>();
        assert_sync::<Box<dyn Backend>>();
    }
}
