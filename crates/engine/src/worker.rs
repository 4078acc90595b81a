//! Background lifecycle worker
//!
//! One worker per store. Every heartbeat period it re-declares the store's
//! index sets and runs one reclaim tick. A process that calls `init` must
//! be heartbeating for as long as it relies on those indexes; the worker
//! is what makes that true without application involvement.
//!
//! The loop parks on a condvar with a timeout, so shutdown is immediate:
//! set the flag, notify, join.

use crate::lifecycle::{self, LifecycleConfig};
use lode_core::{Backend, Heartbeat, ProcessId};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Declared index sets, shared between facade and worker
///
/// Collection name → index names this process relies on.
pub(crate) type Declarations = Arc<RwLock<BTreeMap<String, BTreeSet<String>>>>;

struct WorkerShared {
    shutdown: AtomicBool,
    gate: Mutex<()>,
    wake: Condvar,
}

/// Handle to the lifecycle worker thread
///
/// Shutting down (or dropping) the handle stops the thread and joins it.
pub struct LifecycleWorker {
    shared: Arc<WorkerShared>,
    handle: Option<JoinHandle<()>>,
}

impl LifecycleWorker {
    /// Spawn the worker
    pub(crate) fn spawn(
        backend: Arc<dyn Backend>,
        process_id: ProcessId,
        declarations: Declarations,
        config: LifecycleConfig,
    ) -> Self {
        let shared = Arc::new(WorkerShared {
            shutdown: AtomicBool::new(false),
            gate: Mutex::new(()),
            wake: Condvar::new(),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("lode-lifecycle".to_string())
            .spawn(move || {
                worker_loop(&backend, process_id, &declarations, &config, &thread_shared)
            })
            .expect("failed to spawn lifecycle worker thread");

        LifecycleWorker {
            shared,
            handle: Some(handle),
        }
    }

    /// Stop the worker and join its thread
    pub fn shutdown(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        // Hold the gate while notifying so a worker between its shutdown
        // check and the condvar wait cannot miss the wakeup.
        {
            let _gate = self.shared.gate.lock();
            self.shared.wake.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LifecycleWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    backend: &Arc<dyn Backend>,
    process_id: ProcessId,
    declarations: &Declarations,
    config: &LifecycleConfig,
    shared: &WorkerShared,
) {
    while !shared.shutdown.load(Ordering::Acquire) {
        let declared: Vec<(String, BTreeSet<String>)> = declarations
            .read()
            .iter()
            .map(|(c, names)| (c.clone(), names.clone()))
            .collect();

        for (collection, names) in declared {
            let beat = Heartbeat {
                process_id,
                collection,
                declared: names,
                at: backend.now(),
            };
            if let Err(e) = backend.heartbeat(beat) {
                // Never surfaced to users; a missed beat only feeds reclaim
                warn!(error = %e, "heartbeat write failed");
            }
        }

        if let Err(e) = lifecycle::reclaim_tick(backend.as_ref(), config) {
            warn!(error = %e, "reclaim tick failed");
        }
        debug!("lifecycle tick complete");

        let mut gate = shared.gate.lock();
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }
        let _ = shared
            .wake
            .wait_for(&mut gate, config.heartbeat_period);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use std::time::Duration;

    fn declarations_for(collection: &str, names: &[&str]) -> Declarations {
        let mut map = BTreeMap::new();
        map.insert(
            collection.to_string(),
            names.iter().map(|s| s.to_string()).collect(),
        );
        Arc::new(RwLock::new(map))
    }

    #[test]
    fn worker_emits_heartbeats() {
        let backend: Arc<MemoryBackend> = Arc::new(MemoryBackend::new());
        let dyn_backend: Arc<dyn Backend> = backend.clone();
        let config = LifecycleConfig {
            heartbeat_period: Duration::from_millis(10),
            ..LifecycleConfig::default()
        };
        let mut worker = LifecycleWorker::spawn(
            dyn_backend,
            ProcessId::new(),
            declarations_for("user", &["age"]),
            config,
        );

        // The first tick runs immediately on spawn
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            if !backend.read_heartbeats("user").unwrap().is_empty() {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "no heartbeat written");
            std::thread::sleep(Duration::from_millis(5));
        }
        worker.shutdown();
    }

    #[test]
    fn shutdown_is_idempotent_and_joins() {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        let mut worker = LifecycleWorker::spawn(
            backend,
            ProcessId::new(),
            Arc::new(RwLock::new(BTreeMap::new())),
            LifecycleConfig::default(),
        );
        worker.shutdown();
        worker.shutdown();
    }
}
