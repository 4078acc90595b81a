//! # lode-core
//!
//! Core types for LodeDB, a backend-agnostic document store where every
//! query is served by a declared index.
//!
//! This crate defines the model shared by every backend and by the engine:
//!
//! - [`value`]: scalars, documents, and the index-value ordering
//! - [`types`]: record/process identifiers and nanosecond timestamps
//! - [`keyfn`]: serializable key functions for derived indexes
//! - [`condition`]: the range-condition DSL and query-plan normalization
//! - [`schema`]: index specs, persisted schema state, heartbeats
//! - [`backend`]: the contract every concrete store implements
//! - [`error`]: the unified error type
//!
//! Nothing here performs I/O; concrete stores and the lifecycle engine
//! live in `lode-engine`.

pub mod backend;
pub mod condition;
pub mod error;
pub mod keyfn;
pub mod schema;
pub mod types;
pub mod value;

pub use backend::Backend;
pub use condition::{CmpOp, Condition, Handle, Interval, QueryPlan};
pub use error::{Error, Result};
pub use keyfn::{ApplyError, KeyFn};
pub use schema::{Heartbeat, IndexMeta, IndexSpec, IndexState, ReconcilePlan, SchemaState};
pub use types::{ProcessId, RecordId, Timestamp};
pub use value::{Document, OrderedScalar, Scalar, ScalarType, Value};
