//! Index lifecycle: reconcile on init, reclaim on a periodic tick
//!
//! Multiple deployed versions of application code, each declaring its own
//! index set, share one backend. The rules that let them coexist:
//!
//! - `reconcile` (the init path) only ever adds, refreshes, or revives
//!   indexes. It never downgrades an index it does not declare.
//! - The reclaim tick is the only thing that retires indexes, and only on
//!   heartbeat evidence: an index declared by any live process stays
//!   active; an index declared by no live process is retired after TTL₁
//!   and physically dropped after a further TTL₂.
//! - All timestamps come from the backend's authoritative clock.
//!
//! `reconcile` is idempotent and blocking: when it returns, every declared
//! index is active and queries on them are valid immediately.

use lode_core::{
    Backend, Error, Heartbeat, IndexMeta, IndexSpec, IndexState, ProcessId, Result,
};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tuning for heartbeats, reclaim TTLs, and backfill retry
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Interval between heartbeats (H)
    pub heartbeat_period: Duration,
    /// Heartbeats older than this are pruned; undeclared active indexes
    /// become retiring (TTL₁)
    pub liveness_ttl: Duration,
    /// Retiring indexes older than this are physically dropped (TTL₂)
    pub drop_ttl: Duration,
    /// Backfill retry attempts on retriable backend errors
    pub backfill_retries: u32,
    /// Initial backoff between backfill retries; doubles per attempt
    pub backfill_backoff: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        LifecycleConfig {
            heartbeat_period: Duration::from_secs(30),
            liveness_ttl: Duration::from_secs(150),
            drop_ttl: Duration::from_secs(24 * 60 * 60),
            backfill_retries: 5,
            backfill_backoff: Duration::from_millis(50),
        }
    }
}

/// Reconcile a declared index set against persisted state
///
/// For each declared index: missing ones are inserted as building,
/// backfilled, and marked active; active ones get `last_seen_at`
/// refreshed; retiring ones are revived (and re-backfilled to repair any
/// entries skipped while retiring). Persisted indexes the caller does not
/// declare are left untouched.
///
/// Blocks until every declared index is active, then writes the caller's
/// first heartbeat so the declared set is covered from the moment queries
/// become possible.
pub fn reconcile(
    backend: &dyn Backend,
    process_id: ProcessId,
    collection: &str,
    declared: &[IndexSpec],
    config: &LifecycleConfig,
) -> Result<()> {
    // Validate serializability up front: an unrepresentable key function
    // must fail init before anything is persisted.
    for spec in declared {
        let blob = spec.blob()?;
        let restored = lode_core::KeyFn::from_blob(&blob)?;
        if restored != spec.key_fn {
            return Err(Error::invalid_key_fn(format!(
                "index {:?} does not survive serialization",
                spec.name
            )));
        }
    }

    let schema = backend.read_schema(collection)?;
    let plan = schema.diff(declared)?;
    let now = backend.now();

    for spec in &plan.create {
        let meta = match schema.get(&spec.name) {
            // Left over from an interrupted init; resume it.
            Some(existing) => existing.clone(),
            None => IndexMeta::building(spec, now)?,
        };
        info!(collection, index = %spec.name, "building index");
        backend.upsert_index(collection, meta)?;
        backfill_with_retry(backend, collection, &spec.name, config)?;
        activate(backend, collection, &spec.name)?;
    }

    for name in &plan.revive {
        info!(collection, index = %name, "reviving retiring index");
        backfill_with_retry(backend, collection, name, config)?;
        activate(backend, collection, name)?;
    }

    for name in &plan.refresh {
        debug!(collection, index = %name, "refreshing index liveness");
        if let Some(meta) = backend.read_schema(collection)?.get(name) {
            let mut meta = meta.clone();
            meta.touch(backend.now());
            backend.upsert_index(collection, meta)?;
        }
    }

    let declared_names: BTreeSet<String> = declared.iter().map(|s| s.name.clone()).collect();
    backend.heartbeat(Heartbeat {
        process_id,
        collection: collection.to_string(),
        declared: declared_names,
        at: backend.now(),
    })?;
    Ok(())
}

/// Mark one index active, clearing any retirement bookkeeping
fn activate(backend: &dyn Backend, collection: &str, name: &str) -> Result<()> {
    let schema = backend.read_schema(collection)?;
    let meta = schema
        .get(name)
        .ok_or_else(|| Error::backend(format!("index {name:?} vanished during init")))?;
    let mut meta = meta.clone();
    meta.state = IndexState::Active;
    meta.retiring_since = None;
    meta.touch(backend.now());
    backend.upsert_index(collection, meta)?;
    info!(collection, index = %name, "index active");
    Ok(())
}

/// Run a backfill, retrying retriable backend failures with exponential
/// backoff
fn backfill_with_retry(
    backend: &dyn Backend,
    collection: &str,
    name: &str,
    config: &LifecycleConfig,
) -> Result<()> {
    let mut backoff = config.backfill_backoff;
    let mut attempt = 0;
    loop {
        match backend.backfill_index(collection, name) {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() && attempt < config.backfill_retries => {
                attempt += 1;
                warn!(
                    collection,
                    index = %name,
                    attempt,
                    error = %e,
                    "backfill failed, retrying"
                );
                std::thread::sleep(backoff);
                backoff = backoff.saturating_mul(2);
            }
            Err(e) => return Err(e),
        }
    }
}

/// One pass of the reclaim state machine
///
/// 1. Prune heartbeats older than TTL₁.
/// 2. Retire active indexes no remaining heartbeat declares.
/// 3. Drop retiring indexes older than TTL₂.
/// 4. Revive retiring indexes a fresh heartbeat re-declares.
pub fn reclaim_tick(backend: &dyn Backend, config: &LifecycleConfig) -> Result<()> {
    let now = backend.now();
    backend.prune_stale_heartbeats(now, config.liveness_ttl)?;

    for collection in backend.collections()? {
        let declared: BTreeSet<String> = backend
            .read_heartbeats(&collection)?
            .into_iter()
            .flat_map(|hb| hb.declared)
            .collect();
        let schema = backend.read_schema(&collection)?;

        for meta in schema.indexes.values() {
            match meta.state {
                IndexState::Active if !declared.contains(&meta.name) => {
                    info!(
                        collection = %collection,
                        index = %meta.name,
                        "no live declaration, retiring index"
                    );
                    let mut meta = meta.clone();
                    meta.state = IndexState::Retiring;
                    meta.retiring_since = Some(now);
                    backend.upsert_index(&collection, meta)?;
                }
                IndexState::Retiring if declared.contains(&meta.name) => {
                    info!(
                        collection = %collection,
                        index = %meta.name,
                        "re-declared, returning index to active"
                    );
                    let mut meta = meta.clone();
                    meta.state = IndexState::Active;
                    meta.retiring_since = None;
                    meta.touch(now);
                    backend.upsert_index(&collection, meta)?;
                }
                IndexState::Retiring => {
                    let expired = meta
                        .retiring_since
                        .map(|since| now.since(since) > config.drop_ttl)
                        .unwrap_or(false);
                    if expired {
                        info!(
                            collection = %collection,
                            index = %meta.name,
                            "quiescence window elapsed, dropping index"
                        );
                        backend.drop_index(&collection, &meta.name)?;
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}
