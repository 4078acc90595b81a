//! Multi-process index lifecycle against one shared backend: overlap,
//! heartbeat-driven retirement, and physical drops.
//!
//! Workers are disabled so each "process" heartbeats only when it calls
//! `init`; the reclaim tick and the backend clock are driven explicitly.

use lodedb::{
    lifecycle, Backend, Document, Error, IndexSpec, LifecycleConfig, MemoryBackend, Store,
};
use std::sync::Arc;
use std::time::Duration;

fn config() -> LifecycleConfig {
    LifecycleConfig {
        heartbeat_period: Duration::from_secs(30),
        liveness_ttl: Duration::from_secs(150),
        drop_ttl: Duration::from_secs(24 * 60 * 60),
        backfill_retries: 2,
        backfill_backoff: Duration::from_millis(1),
    }
}

fn process(backend: &Arc<MemoryBackend>) -> Store {
    let shared: Arc<dyn Backend> = backend.clone();
    Store::builder()
        .worker(false)
        .lifecycle(config())
        .open_shared(shared)
        .unwrap()
}

fn user(name: &str, age: i64, height_in: i64) -> Document {
    Document::new()
        .with("name", name)
        .with("age", age)
        .with("height_in", height_in)
}

#[test]
fn two_processes_overlap_then_reclaim() {
    let backend = Arc::new(MemoryBackend::new());
    let cfg = config();

    // Process A declares "age" and seeds the collection
    let a = process(&backend);
    a.init("user", &[IndexSpec::field("age")]).unwrap();
    for (n, age, h) in [("Alex", 31, 71), ("Kelly", 29, 64), ("Ben", 27, 69)] {
        a.create("user", &user(n, age, h)).unwrap();
    }

    // Process B additionally declares "height_in"; init blocks until the
    // backfill over A's records completes
    let b = process(&backend);
    b.init(
        "user",
        &[IndexSpec::field("age"), IndexSpec::field("height_in")],
    )
    .unwrap();

    let schema = b.describe("user").unwrap();
    assert!(schema.is_active("age"));
    assert!(schema.is_active("height_in"));

    // A still queries by age; B queries by either
    let age_a = a.handle("user", "age").unwrap();
    assert_eq!(a.list("user", &[age_a.ge(28)]).unwrap().len(), 2);
    let height_b = b.handle("user", "height_in").unwrap();
    assert_eq!(b.list("user", &[height_b.ge(65)]).unwrap().len(), 2);

    // A stops. B keeps heartbeating (re-init) across the liveness window:
    // both indexes survive because B declares both.
    backend.advance_clock(cfg.liveness_ttl + Duration::from_secs(1));
    b.init(
        "user",
        &[IndexSpec::field("age"), IndexSpec::field("height_in")],
    )
    .unwrap();
    lifecycle::reclaim_tick(backend.as_ref(), &cfg).unwrap();
    let schema = b.describe("user").unwrap();
    assert!(schema.is_active("age"));
    assert!(schema.is_active("height_in"));
}

#[test]
fn undeclared_index_retires_and_drops() {
    let backend = Arc::new(MemoryBackend::new());
    let cfg = config();

    let a = process(&backend);
    a.init("user", &[IndexSpec::field("age")]).unwrap();
    a.create("user", &user("Alex", 31, 71)).unwrap();

    // A new deployment declares only "height_in"; A goes silent
    let c = process(&backend);
    c.init("user", &[IndexSpec::field("height_in")]).unwrap();

    backend.advance_clock(cfg.liveness_ttl + Duration::from_secs(1));
    c.init("user", &[IndexSpec::field("height_in")]).unwrap();
    lifecycle::reclaim_tick(backend.as_ref(), &cfg).unwrap();

    let schema = c.describe("user").unwrap();
    assert_eq!(
        schema.get("age").unwrap().state,
        lodedb::IndexState::Retiring
    );
    assert!(schema.is_active("height_in"));

    // Retiring indexes are no longer queryable through the facade
    let err = c.handle("user", "age").unwrap_err();
    assert!(matches!(err, Error::UnknownIndex { .. }));

    // After the quiescence window the index is physically dropped
    backend.advance_clock(cfg.drop_ttl + Duration::from_secs(1));
    c.init("user", &[IndexSpec::field("height_in")]).unwrap();
    lifecycle::reclaim_tick(backend.as_ref(), &cfg).unwrap();

    let schema = c.describe("user").unwrap();
    assert!(schema.get("age").is_none());
    assert!(schema.is_active("height_in"));
}

#[test]
fn brief_liveness_gaps_do_not_drop_indexes() {
    let backend = Arc::new(MemoryBackend::new());
    let cfg = config();

    let a = process(&backend);
    a.init("user", &[IndexSpec::field("age")]).unwrap();

    // Heartbeat drift shorter than TTL₁ must be harmless
    backend.advance_clock(cfg.liveness_ttl - Duration::from_secs(10));
    lifecycle::reclaim_tick(backend.as_ref(), &cfg).unwrap();
    assert!(a.describe("user").unwrap().is_active("age"));
}

#[test]
fn retiring_index_is_revived_by_redeclaration() {
    let backend = Arc::new(MemoryBackend::new());
    let cfg = config();

    let a = process(&backend);
    a.init("user", &[IndexSpec::field("age")]).unwrap();
    a.create("user", &user("Alex", 31, 71)).unwrap();

    backend.advance_clock(cfg.liveness_ttl + Duration::from_secs(1));
    lifecycle::reclaim_tick(backend.as_ref(), &cfg).unwrap();
    assert_eq!(
        a.describe("user").unwrap().get("age").unwrap().state,
        lodedb::IndexState::Retiring
    );

    // A late process re-declares it before the drop window elapses
    let d = process(&backend);
    d.init("user", &[IndexSpec::field("age")]).unwrap();
    let meta = d.describe("user").unwrap().get("age").unwrap().clone();
    assert_eq!(meta.state, lodedb::IndexState::Active);
    assert_eq!(meta.retiring_since, None);

    let h = d.handle("user", "age").unwrap();
    assert_eq!(d.list("user", &[h.eq(31)]).unwrap().len(), 1);
}

#[test]
fn second_init_with_identical_specs_is_a_noop() {
    let backend = Arc::new(MemoryBackend::new());
    let a = process(&backend);

    a.init("user", &[IndexSpec::field("age")]).unwrap();
    a.create("user", &user("Alex", 31, 71)).unwrap();
    let before = a.describe("user").unwrap().get("age").unwrap().created_at;

    a.init("user", &[IndexSpec::field("age")]).unwrap();
    let schema = a.describe("user").unwrap();
    let after = schema.get("age").unwrap();
    assert_eq!(after.created_at, before);
    assert_eq!(after.state, lodedb::IndexState::Active);
}

#[test]
fn conflicting_key_fn_for_existing_name_fails_init() {
    let backend = Arc::new(MemoryBackend::new());
    let a = process(&backend);
    a.init("user", &[IndexSpec::field("age")]).unwrap();

    let b = process(&backend);
    let conflicting = IndexSpec::derived("age", lodedb::KeyFn::field("age").plus(1));
    let err = b.init("user", &[conflicting]).unwrap_err();
    assert!(matches!(err, Error::InvalidKeyFn { .. }));
}

#[test]
fn worker_keeps_indexes_alive_without_explicit_heartbeats() {
    // One store with a fast worker; the worker's own heartbeats must keep
    // the index active across several reclaim ticks.
    let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
    let store = Store::builder()
        .lifecycle(LifecycleConfig {
            heartbeat_period: Duration::from_millis(10),
            liveness_ttl: Duration::from_millis(200),
            drop_ttl: Duration::from_secs(3600),
            backfill_retries: 2,
            backfill_backoff: Duration::from_millis(1),
        })
        .open_shared(Arc::clone(&backend))
        .unwrap();

    store.init("user", &[IndexSpec::field("age")]).unwrap();
    std::thread::sleep(Duration::from_millis(300));
    assert!(store.describe("user").unwrap().is_active("age"));
}
