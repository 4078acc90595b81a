//! In-memory reference backend
//!
//! Each collection is one shard: a mapping from id to document plus, per
//! index, an ordered set of `(value, id)` entries. A shard is guarded by a
//! `parking_lot::RwLock`, giving the per-collection readers-writer
//! discipline the facade promises: many concurrent readers, single writer
//! for CRUD and index-entry maintenance. Queries observe a snapshot by
//! holding the read lock for the duration of the scan.
//!
//! ## Atomicity
//!
//! Writes compute every index entry before touching the shard's maps, so
//! a key-function failure on any index leaves the store unchanged.
//!
//! ## Index maintenance by state
//!
//! - `Building` and `Active` indexes are strict: an apply failure fails
//!   the write.
//! - `Retiring` indexes never block a write: their old entries are still
//!   removed (no stale entries), but a failing apply skips the new entry.
//!   Revival re-backfills, which repairs any gap.
//!
//! ## Test clock
//!
//! `advance_clock` shifts the backend's authoritative clock forward so
//! TTL-driven lifecycle transitions are testable without wall time.

use lode_core::{
    Backend, Document, Error, Heartbeat, IndexMeta, IndexState, KeyFn, OrderedScalar, ProcessId,
    QueryPlan, RecordId, Result, Scalar, SchemaState, Timestamp,
};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Ordered multi-map entry: index value then record id
type EntryKey = (OrderedScalar, RecordId);

#[derive(Default)]
struct CollectionShard {
    records: HashMap<RecordId, Document>,
    entries: HashMap<String, BTreeSet<EntryKey>>,
    schema: SchemaState,
    heartbeats: HashMap<ProcessId, Heartbeat>,
}

impl CollectionShard {
    /// Compute the index entries a document would produce
    ///
    /// Returns the entries to add and the value types newly inferred.
    /// Nothing is mutated; the caller commits only on full success.
    fn compute_entries(
        &self,
        doc: &Document,
    ) -> Result<(Vec<(String, Scalar)>, Vec<(String, lode_core::ScalarType)>)> {
        let mut adds = Vec::new();
        let mut inferred = Vec::new();
        for meta in self.schema.indexes.values() {
            let key_fn = meta.key_fn()?;
            match key_fn.apply(doc) {
                Ok(value) => {
                    let tag = value.scalar_type();
                    match meta.value_type {
                        Some(expected) if expected != tag => {
                            return Err(Error::type_mismatch(&meta.name, expected, tag));
                        }
                        Some(_) => {}
                        None => inferred.push((meta.name.clone(), tag)),
                    }
                    adds.push((meta.name.clone(), value));
                }
                Err(e) => {
                    if meta.state == IndexState::Retiring {
                        continue;
                    }
                    return Err(Error::index_apply(&meta.name, e.to_string()));
                }
            }
        }
        Ok((adds, inferred))
    }

    /// Remove every entry referencing `id`
    ///
    /// Fast path recomputes the entry from the old document; the retain
    /// scan covers indexes whose key function no longer applies to it.
    fn remove_entries_for(&mut self, id: RecordId, old_doc: &Document) {
        for (name, set) in self.entries.iter_mut() {
            let removed = match self
                .schema
                .indexes
                .get(name)
                .and_then(|m| m.key_fn().ok())
                .and_then(|f| f.apply(old_doc).ok())
            {
                Some(value) => set.remove(&(OrderedScalar(value), id)),
                None => false,
            };
            if !removed {
                set.retain(|(_, rid)| *rid != id);
            }
        }
    }

    fn commit_entries(
        &mut self,
        id: RecordId,
        adds: Vec<(String, Scalar)>,
        inferred: Vec<(String, lode_core::ScalarType)>,
    ) {
        for (name, value) in adds {
            self.entries
                .entry(name)
                .or_default()
                .insert((OrderedScalar(value), id));
        }
        for (name, tag) in inferred {
            if let Some(meta) = self.schema.indexes.get_mut(&name) {
                meta.value_type = Some(tag);
            }
        }
    }
}

/// In-memory backend: the reference implementation of the contract
///
/// Useful on its own for tests and ephemeral workloads, and normative for
/// the semantics every other backend must match.
#[derive(Default)]
pub struct MemoryBackend {
    collections: RwLock<HashMap<String, Arc<RwLock<CollectionShard>>>>,
    clock_skew_nanos: AtomicI64,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Shift the authoritative clock forward by `d`
    ///
    /// Test support: lets TTL-driven reclaim transitions run without
    /// waiting out wall time. The shift is permanent for this backend.
    pub fn advance_clock(&self, d: Duration) {
        self.clock_skew_nanos
            .fetch_add(d.as_nanos().min(i64::MAX as u128) as i64, Ordering::SeqCst);
    }

    fn shard(&self, collection: &str) -> Arc<RwLock<CollectionShard>> {
        if let Some(shard) = self.collections.read().get(collection) {
            return Arc::clone(shard);
        }
        let mut all = self.collections.write();
        Arc::clone(
            all.entry(collection.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(CollectionShard::default()))),
        )
    }

    /// Map interval bounds onto `(value, id)` entry-key bounds
    fn entry_bounds(
        interval: &lode_core::Interval,
    ) -> (Bound<EntryKey>, Bound<EntryKey>) {
        let lower = match &interval.lower {
            Bound::Unbounded => Bound::Unbounded,
            Bound::Included(s) => {
                Bound::Included((OrderedScalar(s.clone()), RecordId::min_value()))
            }
            Bound::Excluded(s) => {
                Bound::Excluded((OrderedScalar(s.clone()), RecordId::max_value()))
            }
        };
        let upper = match &interval.upper {
            Bound::Unbounded => Bound::Unbounded,
            Bound::Included(s) => {
                Bound::Included((OrderedScalar(s.clone()), RecordId::max_value()))
            }
            Bound::Excluded(s) => {
                Bound::Excluded((OrderedScalar(s.clone()), RecordId::min_value()))
            }
        };
        (lower, upper)
    }
}

impl Backend for MemoryBackend {
    fn put_record(&self, collection: &str, id: RecordId, doc: &Document) -> Result<()> {
        let shard = self.shard(collection);
        let mut shard = shard.write();
        if shard.records.contains_key(&id) {
            return Err(Error::backend(format!(
                "identifier collision on {collection}/{id}"
            )));
        }
        let (adds, inferred) = shard.compute_entries(doc)?;
        shard.records.insert(id, doc.clone());
        shard.commit_entries(id, adds, inferred);
        Ok(())
    }

    fn replace_record(&self, collection: &str, id: RecordId, doc: &Document) -> Result<()> {
        let shard = self.shard(collection);
        let mut shard = shard.write();
        let old = match shard.records.get(&id) {
            Some(d) => d.clone(),
            None => return Err(Error::not_found(collection, id)),
        };
        let (adds, inferred) = shard.compute_entries(doc)?;
        shard.remove_entries_for(id, &old);
        shard.records.insert(id, doc.clone());
        shard.commit_entries(id, adds, inferred);
        Ok(())
    }

    fn get_record(&self, collection: &str, id: RecordId) -> Result<Document> {
        let shard = self.shard(collection);
        let shard = shard.read();
        shard
            .records
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(collection, id))
    }

    fn delete_record(&self, collection: &str, id: RecordId) -> Result<()> {
        let shard = self.shard(collection);
        let mut shard = shard.write();
        let old = match shard.records.remove(&id) {
            Some(d) => d,
            None => return Err(Error::not_found(collection, id)),
        };
        shard.remove_entries_for(id, &old);
        Ok(())
    }

    fn list_records(&self, collection: &str, plan: &QueryPlan) -> Result<Vec<(RecordId, Document)>> {
        if plan.is_empty_result() {
            return Ok(Vec::new());
        }
        let shard = self.shard(collection);
        let shard = shard.read();

        if plan.is_unconstrained() {
            return Ok(shard
                .records
                .iter()
                .map(|(id, doc)| (*id, doc.clone()))
                .collect());
        }

        // Drive the scan from the first constrained index; filter the
        // candidates through the remaining intervals by recomputing their
        // index values from the document.
        let mut ranges = plan.ranges().iter();
        let (driver_name, driver_interval) = ranges.next().expect("constrained plan has a range");

        let rest: Vec<(&String, &lode_core::Interval, KeyFn)> = ranges
            .map(|(name, interval)| {
                let meta = shard
                    .schema
                    .indexes
                    .get(name)
                    .ok_or_else(|| Error::unknown_index(collection, name))?;
                Ok((name, interval, meta.key_fn()?))
            })
            .collect::<Result<_>>()?;

        let Some(driver_entries) = shard.entries.get(driver_name) else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        'candidates: for (_, id) in driver_entries.range(Self::entry_bounds(driver_interval)) {
            let doc = shard
                .records
                .get(id)
                .ok_or_else(|| Error::backend(format!("dangling index entry for {id}")))?;
            for (_, interval, key_fn) in &rest {
                match key_fn.apply(doc) {
                    Ok(value) if interval.contains(&value) => {}
                    _ => continue 'candidates,
                }
            }
            out.push((*id, doc.clone()));
        }
        Ok(out)
    }

    fn read_schema(&self, collection: &str) -> Result<SchemaState> {
        let shard = self.shard(collection);
        let shard = shard.read();
        Ok(shard.schema.clone())
    }

    fn upsert_index(&self, collection: &str, meta: IndexMeta) -> Result<()> {
        let shard = self.shard(collection);
        let mut shard = shard.write();
        shard.entries.entry(meta.name.clone()).or_default();
        shard.schema.indexes.insert(meta.name.clone(), meta);
        Ok(())
    }

    fn drop_index(&self, collection: &str, name: &str) -> Result<()> {
        let shard = self.shard(collection);
        let mut shard = shard.write();
        shard.schema.indexes.remove(name);
        shard.entries.remove(name);
        Ok(())
    }

    fn backfill_index(&self, collection: &str, name: &str) -> Result<()> {
        let shard = self.shard(collection);
        let mut shard = shard.write();
        let meta = shard
            .schema
            .indexes
            .get(name)
            .ok_or_else(|| Error::backend(format!("backfill of unknown index {name:?}")))?;
        let key_fn = meta.key_fn()?;
        let mut value_type = meta.value_type;

        // Compute the full entry set first so a non-total key function
        // leaves previously computed entries intact but commits nothing new.
        let mut computed = BTreeSet::new();
        for (id, doc) in &shard.records {
            let value = key_fn
                .apply(doc)
                .map_err(|e| Error::index_apply(name, format!("record {id}: {e}")))?;
            let tag = value.scalar_type();
            match value_type {
                Some(expected) if expected != tag => {
                    return Err(Error::type_mismatch(name, expected, tag));
                }
                Some(_) => {}
                None => value_type = Some(tag),
            }
            computed.insert((OrderedScalar(value), *id));
        }

        shard.entries.insert(name.to_string(), computed);
        if let Some(meta) = shard.schema.indexes.get_mut(name) {
            meta.value_type = value_type;
        }
        Ok(())
    }

    fn heartbeat(&self, heartbeat: Heartbeat) -> Result<()> {
        let shard = self.shard(&heartbeat.collection);
        let mut shard = shard.write();
        shard.heartbeats.insert(heartbeat.process_id, heartbeat);
        Ok(())
    }

    fn read_heartbeats(&self, collection: &str) -> Result<Vec<Heartbeat>> {
        let shard = self.shard(collection);
        let shard = shard.read();
        Ok(shard.heartbeats.values().cloned().collect())
    }

    fn prune_stale_heartbeats(&self, now: Timestamp, ttl: Duration) -> Result<()> {
        let shards: Vec<_> = self.collections.read().values().cloned().collect();
        for shard in shards {
            let mut shard = shard.write();
            shard.heartbeats.retain(|_, hb| now.since(hb.at) <= ttl);
        }
        Ok(())
    }

    fn collections(&self) -> Result<Vec<String>> {
        Ok(self.collections.read().keys().cloned().collect())
    }

    fn now(&self) -> Timestamp {
        Timestamp::now().plus(Duration::from_nanos(
            self.clock_skew_nanos.load(Ordering::SeqCst).max(0) as u64,
        ))
    }
}
