//! # LodeDB
//!
//! A document-store abstraction layer: JSON-like records behind a uniform,
//! backend-agnostic facade, where every query is served by a declared
//! index.
//!
//! Independently deployed versions of an application, each declaring its
//! own index set, coexist safely against one shared backend: `init` only
//! ever adds or revives indexes, heartbeats declare which indexes each
//! live process relies on, and a background reclaim tick retires and
//! eventually drops indexes no live process declares.
//!
//! # Quick Start
//!
//! ```no_run
//! use lodedb::{Document, IndexSpec, KeyFn, Store};
//!
//! fn main() -> lodedb::Result<()> {
//!     let store = Store::in_memory()?;
//!
//!     // Declare the index set; blocks until every index is active
//!     store.init(
//!         "user",
//!         &[
//!             IndexSpec::field("age"),
//!             IndexSpec::derived("email_lower", KeyFn::field("email").lower()),
//!         ],
//!     )?;
//!
//!     let id = store.create(
//!         "user",
//!         &Document::new()
//!             .with("name", "Alex")
//!             .with("age", 31)
//!             .with("email", "Alex@example.com"),
//!     )?;
//!
//!     // Conditions come from index handles; non-indexed queries are
//!     // unrepresentable
//!     let age = store.handle("user", "age")?;
//!     for (found, doc) in store.list("user", &[age.ge(30), age.lt(40)])? {
//!         assert_eq!(found, id);
//!         assert_eq!(doc.get("name"), Some(&"Alex".into()));
//!     }
//!
//!     store.delete("user", id)?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! | Layer | Crate | Role |
//! |-------|-------|------|
//! | Facade | `lode-engine` | [`Store`]: validated CRUD + queries |
//! | Lifecycle | `lode-engine` | reconcile on init, heartbeat + reclaim worker |
//! | Backend | `lode-core` / `lode-engine` | [`Backend`] contract, [`MemoryBackend`] reference |
//! | Model | `lode-core` | documents, scalars, key functions, conditions |
//!
//! The [`Backend`] trait is the seam: every concrete store implements the
//! same operations with identical semantics, and the upper layers are
//! written against the trait only.

pub use lode_core::{
    Backend, CmpOp, Condition, Document, Error, Handle, Heartbeat, IndexMeta, IndexSpec,
    IndexState, Interval, KeyFn, ProcessId, QueryPlan, RecordId, Result, Scalar, ScalarType,
    SchemaState, Timestamp, Value,
};
pub use lode_engine::{
    lifecycle, open_backend, LifecycleConfig, LifecycleWorker, ListIter, MemoryBackend, Store,
    StoreBuilder,
};
