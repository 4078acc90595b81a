//! Backend factory
//!
//! Maps a backend name and an opaque configuration descriptor onto a
//! concrete `Backend`. Both dimensions are opaque to the core: a backend
//! interprets its own descriptor and may reject it.

use crate::memory::MemoryBackend;
use lode_core::{Backend, Error, Result};
use std::sync::Arc;

/// Open a backend by name
///
/// `"in-memory"` (alias `"memory"`) is built in and takes no
/// configuration. Unknown names fail with a non-retriable backend error.
pub fn open_backend(kind: &str, config: &serde_json::Value) -> Result<Arc<dyn Backend>> {
    match kind {
        "in-memory" | "memory" => {
            if !config.is_null() {
                return Err(Error::backend(
                    "in-memory backend takes no configuration",
                ));
            }
            Ok(Arc::new(MemoryBackend::new()))
        }
        other => Err(Error::backend(format!("unknown backend kind {other:?}"))),
    }
}
