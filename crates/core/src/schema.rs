//! Index specifications, persisted schema state, and the reconcile diff
//!
//! Persisted state is shared by every live process that opened the same
//! backend. Each process declares its own index set at `init`; the diff
//! computed here is the three-way reconciliation between the declared set,
//! the persisted set, and (through heartbeats) the sets other live
//! processes still rely on.
//!
//! A persisted index an init call does not declare is never downgraded by
//! that call; another deployed version of the application may need it.
//! Only the reclaim tick retires indexes, and only on heartbeat evidence.

use crate::error::{Error, Result};
use crate::keyfn::KeyFn;
use crate::types::{ProcessId, Timestamp};
use crate::value::ScalarType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// IndexSpec
// =============================================================================

/// A declared index: logical name plus key function
///
/// The value type is derived, not declared; it is inferred from the first
/// record the key function is applied to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Logical index name
    pub name: String,
    /// Key function deriving the indexed value
    pub key_fn: KeyFn,
}

impl IndexSpec {
    /// The bare-field shorthand: `field("age")` indexes `d["age"]` as `"age"`
    pub fn field(name: impl Into<String>) -> Self {
        let name = name.into();
        IndexSpec {
            key_fn: KeyFn::field(name.clone()),
            name,
        }
    }

    /// A derived index with an explicit key function
    pub fn derived(name: impl Into<String>, key_fn: KeyFn) -> Self {
        IndexSpec {
            name: name.into(),
            key_fn,
        }
    }

    /// Canonical key-function blob for this declaration
    pub fn blob(&self) -> Result<Vec<u8>> {
        self.key_fn.to_blob()
    }

    /// Equivalence: same logical name and byte-equal key-function blobs
    pub fn is_equivalent(&self, meta: &IndexMeta) -> Result<bool> {
        Ok(self.name == meta.name && self.blob()? == meta.key_fn_blob)
    }
}

// =============================================================================
// IndexMeta and SchemaState
// =============================================================================

/// Lifecycle state of one persisted index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    /// Declared, backfill not yet complete
    Building,
    /// Backfilled and serving queries
    Active,
    /// Undeclared by every live process; awaiting the drop window
    Retiring,
}

/// One persisted index entry in a collection's schema table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    /// Logical index name
    pub name: String,
    /// Canonical serialized key function
    pub key_fn_blob: Vec<u8>,
    /// Derived value type; `None` until the first entry is computed
    pub value_type: Option<ScalarType>,
    /// Lifecycle state
    pub state: IndexState,
    /// When the index was first declared
    pub created_at: Timestamp,
    /// Last time any live process declared it
    pub last_seen_at: Timestamp,
    /// When the index entered `Retiring`, if it has
    pub retiring_since: Option<Timestamp>,
}

impl IndexMeta {
    /// Fresh metadata for a newly declared index
    pub fn building(spec: &IndexSpec, now: Timestamp) -> Result<Self> {
        Ok(IndexMeta {
            name: spec.name.clone(),
            key_fn_blob: spec.blob()?,
            value_type: None,
            state: IndexState::Building,
            created_at: now,
            last_seen_at: now,
            retiring_since: None,
        })
    }

    /// Reconstruct the key function from the persisted blob
    pub fn key_fn(&self) -> Result<KeyFn> {
        KeyFn::from_blob(&self.key_fn_blob)
    }

    /// Record that a live process declared this index at `now`
    pub fn touch(&mut self, now: Timestamp) {
        self.last_seen_at = now;
    }
}

/// Per-collection persisted schema: logical name → index metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaState {
    /// All known indexes, including building and retiring ones
    pub indexes: BTreeMap<String, IndexMeta>,
}

impl SchemaState {
    /// Empty schema
    pub fn new() -> Self {
        SchemaState::default()
    }

    /// Metadata for one index
    pub fn get(&self, name: &str) -> Option<&IndexMeta> {
        self.indexes.get(name)
    }

    /// True when `name` is active
    pub fn is_active(&self, name: &str) -> bool {
        matches!(
            self.indexes.get(name),
            Some(IndexMeta {
                state: IndexState::Active,
                ..
            })
        )
    }

    /// Names of all active indexes (the live-index set)
    pub fn active_names(&self) -> BTreeSet<String> {
        self.indexes
            .values()
            .filter(|m| m.state == IndexState::Active)
            .map(|m| m.name.clone())
            .collect()
    }

    /// Compute the reconcile plan for a declared index set
    pub fn diff(&self, declared: &[IndexSpec]) -> Result<ReconcilePlan> {
        let mut plan = ReconcilePlan::default();
        for spec in declared {
            match self.indexes.get(&spec.name) {
                None => plan.create.push(spec.clone()),
                Some(meta) => {
                    if !spec.is_equivalent(meta)? {
                        return Err(Error::invalid_key_fn(format!(
                            "index {:?} already exists with a different key function",
                            spec.name
                        )));
                    }
                    match meta.state {
                        IndexState::Active => plan.refresh.push(spec.name.clone()),
                        IndexState::Retiring => plan.revive.push(spec.name.clone()),
                        // A concurrent init is backfilling; finish the job
                        // locally too; backfill is idempotent.
                        IndexState::Building => plan.create.push(spec.clone()),
                    }
                }
            }
        }
        Ok(plan)
    }
}

/// Work items produced by the three-way reconcile diff
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    /// Specs to insert as building and backfill
    pub create: Vec<IndexSpec>,
    /// Active indexes to refresh `last_seen_at` on
    pub refresh: Vec<String>,
    /// Retiring indexes to return to active
    pub revive: Vec<String>,
}

impl ReconcilePlan {
    /// True when the diff requires no work beyond heartbeating
    pub fn is_noop(&self) -> bool {
        self.create.is_empty() && self.revive.is_empty()
    }
}

// =============================================================================
// Heartbeat
// =============================================================================

/// Periodic liveness record written by a process
///
/// Declares which indexes the process currently relies on for one
/// collection. Keyed by `(process_id, collection)` in the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Identity of the declaring process
    pub process_id: ProcessId,
    /// Collection the declaration applies to
    pub collection: String,
    /// Index names the process relies on
    pub declared: BTreeSet<String>,
    /// Backend-clock instant of the heartbeat
    pub at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> Timestamp {
        Timestamp::from_nanos(1_000_000)
    }

    fn meta_for(spec: &IndexSpec, state: IndexState) -> IndexMeta {
        let mut meta = IndexMeta::building(spec, now()).unwrap();
        meta.state = state;
        meta
    }

    #[test]
    fn field_shorthand_expands_to_field_pick() {
        let spec = IndexSpec::field("age");
        assert_eq!(spec.name, "age");
        assert_eq!(spec.key_fn, KeyFn::field("age"));
    }

    #[test]
    fn equivalence_is_blob_byte_equality() {
        let spec = IndexSpec::derived("email_lower", KeyFn::field("email").lower());
        let meta = meta_for(&spec, IndexState::Active);
        assert!(spec.is_equivalent(&meta).unwrap());

        let other = IndexSpec::derived("email_lower", KeyFn::field("email").upper());
        assert!(!other.is_equivalent(&meta).unwrap());
    }

    #[test]
    fn diff_creates_missing_indexes() {
        let schema = SchemaState::new();
        let plan = schema.diff(&[IndexSpec::field("age")]).unwrap();
        assert_eq!(plan.create.len(), 1);
        assert!(plan.refresh.is_empty());
        assert!(!plan.is_noop());
    }

    #[test]
    fn diff_refreshes_equivalent_active_indexes() {
        let spec = IndexSpec::field("age");
        let mut schema = SchemaState::new();
        schema
            .indexes
            .insert("age".into(), meta_for(&spec, IndexState::Active));

        let plan = schema.diff(&[spec]).unwrap();
        assert!(plan.create.is_empty());
        assert_eq!(plan.refresh, vec!["age".to_string()]);
        assert!(plan.is_noop());
    }

    #[test]
    fn diff_revives_retiring_indexes() {
        let spec = IndexSpec::field("age");
        let mut schema = SchemaState::new();
        schema
            .indexes
            .insert("age".into(), meta_for(&spec, IndexState::Retiring));

        let plan = schema.diff(&[spec]).unwrap();
        assert_eq!(plan.revive, vec!["age".to_string()]);
    }

    #[test]
    fn diff_rebuilds_indexes_stuck_building() {
        let spec = IndexSpec::field("age");
        let mut schema = SchemaState::new();
        schema
            .indexes
            .insert("age".into(), meta_for(&spec, IndexState::Building));

        let plan = schema.diff(&[spec]).unwrap();
        assert_eq!(plan.create.len(), 1);
    }

    #[test]
    fn diff_rejects_conflicting_definitions() {
        let persisted = IndexSpec::field("age");
        let mut schema = SchemaState::new();
        schema
            .indexes
            .insert("age".into(), meta_for(&persisted, IndexState::Active));

        let conflicting = IndexSpec::derived("age", KeyFn::field("age").plus(1));
        let err = schema.diff(&[conflicting]).unwrap_err();
        assert!(matches!(err, Error::InvalidKeyFn { .. }));
    }

    #[test]
    fn diff_leaves_undeclared_indexes_untouched() {
        let spec = IndexSpec::field("age");
        let other = IndexSpec::field("height");
        let mut schema = SchemaState::new();
        schema
            .indexes
            .insert("age".into(), meta_for(&spec, IndexState::Active));
        schema
            .indexes
            .insert("height".into(), meta_for(&other, IndexState::Active));

        // Declaring only "age" must not plan anything against "height"
        let plan = schema.diff(&[spec]).unwrap();
        assert_eq!(plan.refresh, vec!["age".to_string()]);
        assert!(plan.create.is_empty() && plan.revive.is_empty());
    }

    #[test]
    fn meta_roundtrips_its_key_fn() {
        let spec = IndexSpec::derived("len", KeyFn::field("name").length());
        let meta = IndexMeta::building(&spec, now()).unwrap();
        assert_eq!(meta.key_fn().unwrap(), spec.key_fn);
        assert_eq!(meta.value_type, None);
        assert_eq!(meta.state, IndexState::Building);
    }

    #[test]
    fn active_names_excludes_building_and_retiring() {
        let mut schema = SchemaState::new();
        schema.indexes.insert(
            "a".into(),
            meta_for(&IndexSpec::field("a"), IndexState::Active),
        );
        schema.indexes.insert(
            "b".into(),
            meta_for(&IndexSpec::field("b"), IndexState::Building),
        );
        schema.indexes.insert(
            "c".into(),
            meta_for(&IndexSpec::field("c"), IndexState::Retiring),
        );
        let active = schema.active_names();
        assert_eq!(active.len(), 1);
        assert!(active.contains("a"));
        assert!(schema.is_active("a"));
        assert!(!schema.is_active("b"));
    }
}
