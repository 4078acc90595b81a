//! # lode-engine
//!
//! The LodeDB engine: the in-memory reference backend, the index
//! lifecycle (reconcile on init, heartbeat-driven reclaim), the
//! background lifecycle worker, and the store facade.
//!
//! Most callers only need [`Store`]:
//!
//! ```no_run
//! use lode_engine::Store;
//! use lode_core::{Document, IndexSpec};
//!
//! # fn main() -> lode_core::Result<()> {
//! let store = Store::in_memory()?;
//! store.init("user", &[IndexSpec::field("age")])?;
//!
//! let id = store.create("user", &Document::new().with("name", "Alex").with("age", 31))?;
//! let age = store.handle("user", "age")?;
//! for (found, doc) in store.list("user", &[age.ge(30)])? {
//!     assert_eq!(found, id);
//!     assert_eq!(doc, store.get("user", id)?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod factory;
pub mod lifecycle;
pub mod memory;
pub mod store;
pub mod worker;

pub use factory::open_backend;
pub use lifecycle::LifecycleConfig;
pub use memory::MemoryBackend;
pub use store::{ListIter, Store, StoreBuilder};
pub use worker::LifecycleWorker;
