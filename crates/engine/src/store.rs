//! Store facade
//!
//! The public entry point. A `Store` composes a backend, this process's
//! declared schema, and the background lifecycle worker, and exposes the
//! full API surface: `init`, `create`, `get`, `update`, `delete`, `list`,
//! plus introspection (`handle`, `describe`, `supported_index_types`,
//! `test_key_fn`).
//!
//! The facade holds no record state of its own: records and index
//! entries are exclusively owned by the backend; the only facade state is
//! the declared schema registry shared with the worker.
//!
//! Every query-accepting call validates that each referenced index is
//! active on the collection before compiling conditions into a plan, so a
//! query can never reach a backend through an undeclared index.

use crate::factory;
use crate::lifecycle::{self, LifecycleConfig};
use crate::worker::{Declarations, LifecycleWorker};
use lode_core::{
    Backend, Condition, Document, Error, Handle, KeyFn, IndexSpec, ProcessId, QueryPlan, RecordId,
    Result, ScalarType, SchemaState,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// A document store bound to one backend
///
/// Safe to share across threads. Writes against one collection are
/// linearizable at the backend boundary; queries observe a snapshot
/// consistent with some serial order of completed writes.
pub struct Store {
    backend: Arc<dyn Backend>,
    process_id: ProcessId,
    declarations: Declarations,
    config: LifecycleConfig,
    _worker: Option<LifecycleWorker>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("process_id", &self.process_id)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Start configuring a store
    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }

    /// Open an in-memory store with default lifecycle settings
    pub fn in_memory() -> Result<Store> {
        Store::builder().open()
    }

    /// This process's lifecycle identity
    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    /// The backend this store operates on
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    // ------------------------------------------------------------------
    // Schema
    // ------------------------------------------------------------------

    /// Declare a collection's index set and block until it is queryable
    ///
    /// Idempotent. When `init` returns, every declared index is active:
    /// missing ones were inserted and backfilled, retiring ones revived,
    /// active ones refreshed. Indexes declared by other processes are
    /// never touched.
    pub fn init(&self, collection: &str, indexes: &[IndexSpec]) -> Result<()> {
        lifecycle::reconcile(
            self.backend.as_ref(),
            self.process_id,
            collection,
            indexes,
            &self.config,
        )?;
        // The process's declared set is whatever it declared last; a
        // re-init with fewer indexes stops heartbeating for the rest.
        let names: BTreeSet<String> = indexes.iter().map(|s| s.name.clone()).collect();
        self.declarations
            .write()
            .insert(collection.to_string(), names);
        debug!(collection, "collection initialized");
        Ok(())
    }

    /// The persisted schema table for one collection
    pub fn describe(&self, collection: &str) -> Result<SchemaState> {
        self.backend.read_schema(collection)
    }

    /// The supported index type set
    pub fn supported_index_types(&self) -> &'static [ScalarType] {
        &ScalarType::ALL
    }

    /// Round-trip a key function through serialization and verify it
    ///
    /// Applies both the original and the reconstruction to `sample` and
    /// requires identical outcomes. Returns the reconstructed function.
    pub fn test_key_fn(&self, key_fn: &KeyFn, sample: &Document) -> Result<KeyFn> {
        key_fn.verify_round_trip(sample)
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    /// Store a new document and return its freshly generated identifier
    pub fn create(&self, collection: &str, doc: &Document) -> Result<RecordId> {
        doc.check_storable().map_err(Error::invalid_document)?;
        let id = RecordId::new();
        self.backend.put_record(collection, id, doc)?;
        Ok(id)
    }

    /// Fetch a document by identifier
    pub fn get(&self, collection: &str, id: RecordId) -> Result<Document> {
        self.backend.get_record(collection, id)
    }

    /// Replace a document wholesale
    pub fn update(&self, collection: &str, id: RecordId, doc: &Document) -> Result<()> {
        doc.check_storable().map_err(Error::invalid_document)?;
        self.backend.replace_record(collection, id, doc)
    }

    /// Delete a record and its index entries
    pub fn delete(&self, collection: &str, id: RecordId) -> Result<()> {
        self.backend.delete_record(collection, id)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Obtain a handle onto an active index
    pub fn handle(&self, collection: &str, index: &str) -> Result<Handle> {
        let schema = self.backend.read_schema(collection)?;
        if !schema.is_active(index) {
            return Err(Error::unknown_index(collection, index));
        }
        Ok(Handle::new(collection, index))
    }

    /// Query a collection
    ///
    /// With no conditions, returns every record. With conditions, returns
    /// the records whose index values satisfy all of them; when a single
    /// index is constrained, results are ordered ascending by its value.
    /// A provably empty query (contradictory bounds) returns an empty
    /// iterator without consulting the backend.
    pub fn list(&self, collection: &str, conditions: &[Condition]) -> Result<ListIter> {
        if conditions.is_empty() {
            let records = self
                .backend
                .list_records(collection, &QueryPlan::unconstrained())?;
            return Ok(ListIter::new(records));
        }

        let schema = self.backend.read_schema(collection)?;
        let mut value_types: BTreeMap<String, Option<ScalarType>> = BTreeMap::new();
        for cond in conditions {
            let meta = schema.get(cond.index());
            match meta {
                Some(meta) if schema.is_active(cond.index()) => {
                    value_types.insert(cond.index().to_string(), meta.value_type);
                }
                _ => return Err(Error::unknown_index(collection, cond.index())),
            }
        }

        let plan = QueryPlan::compile(conditions, &value_types)?;
        if plan.is_empty_result() {
            debug!(collection, "contradictory query, skipping backend");
            return Ok(ListIter::new(Vec::new()));
        }
        let records = self.backend.list_records(collection, &plan)?;
        Ok(ListIter::new(records))
    }
}

/// Lazily iterable query result: `(identifier, document)` pairs
#[derive(Debug)]
pub struct ListIter {
    inner: std::vec::IntoIter<(RecordId, Document)>,
}

impl ListIter {
    fn new(records: Vec<(RecordId, Document)>) -> Self {
        ListIter {
            inner: records.into_iter(),
        }
    }

    /// Number of results not yet yielded
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True when no results remain
    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }
}

impl Iterator for ListIter {
    type Item = (RecordId, Document);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for ListIter {}

// =============================================================================
// StoreBuilder
// =============================================================================

/// Fluent configuration for opening a store
///
/// ```no_run
/// use lode_engine::Store;
/// use std::time::Duration;
///
/// # fn main() -> lode_core::Result<()> {
/// let store = Store::builder()
///     .backend("in-memory")
///     .heartbeat_period(Duration::from_secs(10))
///     .open()?;
/// # Ok(())
/// # }
/// ```
pub struct StoreBuilder {
    kind: String,
    backend_config: serde_json::Value,
    config: LifecycleConfig,
    worker: bool,
    shared: Option<Arc<dyn Backend>>,
}

impl StoreBuilder {
    /// New builder with in-memory backend and default lifecycle tuning
    pub fn new() -> Self {
        StoreBuilder {
            kind: "in-memory".to_string(),
            backend_config: serde_json::Value::Null,
            config: LifecycleConfig::default(),
            worker: true,
            shared: None,
        }
    }

    /// Select the backend by name (`"in-memory"`, ...)
    pub fn backend(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Backend-specific configuration descriptor, opaque to the core
    pub fn backend_config(mut self, config: serde_json::Value) -> Self {
        self.backend_config = config;
        self
    }

    /// Interval between heartbeats (H)
    pub fn heartbeat_period(mut self, period: std::time::Duration) -> Self {
        self.config.heartbeat_period = period;
        self
    }

    /// Liveness TTL (TTL₁): stale-heartbeat and retirement threshold
    pub fn liveness_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.config.liveness_ttl = ttl;
        self
    }

    /// Drop TTL (TTL₂): quiescence window before a physical drop
    pub fn drop_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.config.drop_ttl = ttl;
        self
    }

    /// Full lifecycle configuration in one call
    pub fn lifecycle(mut self, config: LifecycleConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable or disable the background lifecycle worker
    ///
    /// A store without a worker can serve as a pure query client, but a
    /// process that calls `init` must be heartbeating for as long as it
    /// relies on those indexes. Disable only when driving heartbeats and
    /// reclaim ticks by other means (tests do this with a shared clock).
    pub fn worker(mut self, enabled: bool) -> Self {
        self.worker = enabled;
        self
    }

    /// Open the store
    pub fn open(self) -> Result<Store> {
        let backend = match self.shared {
            Some(backend) => backend,
            None => factory::open_backend(&self.kind, &self.backend_config)?,
        };
        let process_id = ProcessId::new();
        let declarations: Declarations = Arc::new(RwLock::new(BTreeMap::new()));
        let worker = if self.worker {
            Some(LifecycleWorker::spawn(
                Arc::clone(&backend),
                process_id,
                Arc::clone(&declarations),
                self.config.clone(),
            ))
        } else {
            None
        };
        Ok(Store {
            backend,
            process_id,
            declarations,
            config: self.config,
            _worker: worker,
        })
    }

    /// Open against an already constructed backend
    ///
    /// This is how several stores, each standing in for a deployed
    /// process, coexist against one shared backend.
    pub fn open_shared(mut self, backend: Arc<dyn Backend>) -> Result<Store> {
        self.shared = Some(backend);
        self.open()
    }
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use lode_core::Scalar;

    fn quiet_store() -> Store {
        Store::builder().worker(false).open().unwrap()
    }

    fn user(name: &str, age: i64) -> Document {
        Document::new().with("name", name).with("age", age)
    }

    #[test]
    fn create_returns_fresh_ids() {
        let store = quiet_store();
        store.init("user", &[]).unwrap();
        let a = store.create("user", &user("Alex", 31)).unwrap();
        let b = store.create("user", &user("Ben", 27)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn create_rejects_non_finite_floats() {
        let store = quiet_store();
        let doc = Document::new().with("score", f64::INFINITY);
        let err = store.create("user", &doc).unwrap_err();
        assert!(matches!(err, Error::InvalidDocument { .. }));
    }

    #[test]
    fn handle_requires_an_active_index() {
        let store = quiet_store();
        store.init("user", &[IndexSpec::field("age")]).unwrap();
        assert!(store.handle("user", "age").is_ok());
        let err = store.handle("user", "name").unwrap_err();
        assert!(matches!(err, Error::UnknownIndex { .. }));
    }

    #[test]
    fn list_rejects_unknown_indexes() {
        let store = quiet_store();
        store.init("user", &[]).unwrap();
        store.create("user", &user("Alex", 31)).unwrap();
        // A handle forged against an undeclared index must still fail
        let h = Handle::new("user", "name");
        let err = store.list("user", &[h.eq("Alex")]).unwrap_err();
        assert!(matches!(err, Error::UnknownIndex { .. }));
    }

    #[test]
    fn empty_query_lists_everything() {
        let store = quiet_store();
        store.init("user", &[]).unwrap();
        store.create("user", &user("Alex", 31)).unwrap();
        store.create("user", &user("Ben", 27)).unwrap();
        assert_eq!(store.list("user", &[]).unwrap().len(), 2);
    }

    #[test]
    fn contradictory_query_skips_the_backend() {
        let store = quiet_store();
        store.init("user", &[IndexSpec::field("age")]).unwrap();
        store.create("user", &user("Alex", 31)).unwrap();
        let h = store.handle("user", "age").unwrap();
        let results = store.list("user", &[h.ge(5), h.lt(3)]).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn cross_type_comparison_is_invalid() {
        let store = quiet_store();
        store.init("user", &[IndexSpec::field("age")]).unwrap();
        store.create("user", &user("Alex", 31)).unwrap();
        let h = store.handle("user", "age").unwrap();
        let err = store.list("user", &[h.eq("x")]).unwrap_err();
        assert!(matches!(err, Error::InvalidCondition { .. }));
    }

    #[test]
    fn list_streams_pairs_in_index_order() {
        let store = quiet_store();
        store.init("user", &[IndexSpec::field("age")]).unwrap();
        for (n, a) in [("Alex", 31), ("Kelly", 29), ("Ben", 27)] {
            store.create("user", &user(n, a)).unwrap();
        }
        let h = store.handle("user", "age").unwrap();
        let ages: Vec<Scalar> = store
            .list("user", &[h.ge(20)])
            .unwrap()
            .map(|(_, d)| d.get("age").unwrap().as_scalar().unwrap().clone())
            .collect();
        assert_eq!(
            ages,
            vec![Scalar::Int(27), Scalar::Int(29), Scalar::Int(31)]
        );
    }

    #[test]
    fn describe_exposes_schema_state(){
        let store = quiet_store();
        store.init("user", &[IndexSpec::field("age")]).unwrap();
        let schema = store.describe("user").unwrap();
        assert!(schema.is_active("age"));
    }

    #[test]
    fn supported_types_are_exposed() {
        let store = quiet_store();
        assert_eq!(store.supported_index_types().len(), 6);
    }

    #[test]
    fn test_key_fn_round_trips() {
        let store = quiet_store();
        let f = KeyFn::field("email").lower();
        let sample = Document::new().with("email", "ABC@X");
        let restored = store.test_key_fn(&f, &sample).unwrap();
        assert_eq!(restored.apply(&sample), f.apply(&sample));
    }

    #[test]
    fn stores_share_a_backend() {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        let a = Store::builder()
            .worker(false)
            .open_shared(Arc::clone(&backend))
            .unwrap();
        let b = Store::builder().worker(false).open_shared(backend).unwrap();
        assert_ne!(a.process_id(), b.process_id());

        a.init("user", &[IndexSpec::field("age")]).unwrap();
        let id = a.create("user", &user("Alex", 31)).unwrap();
        assert_eq!(b.get("user", id).unwrap(), user("Alex", 31));
    }
}
