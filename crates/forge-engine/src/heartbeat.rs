//! Worker heartbeat registry.
//!
//! Worker records are created on first heartbeat. Offline state is derived
//! purely by applying a last-seen threshold at read time; rejected state
//! comes from the license enforcer. Heartbeat-layer failures are swallowed
//! so observation never destabilises execution.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::debug;

use forge_models::{JobId, WorkerState, WorkerStatus};

use crate::license::LicenseEnforcer;

/// This machine's hostname, with a stable fallback.
pub fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown-host".to_string())
}

/// Hostname-scoped worker id for this process.
pub fn local_worker_id(suffix: &str) -> String {
    format!("{}-{suffix}", local_hostname())
}

/// In-memory registry of known workers.
pub struct WorkerRegistry {
    workers: Mutex<HashMap<String, WorkerStatus>>,
    enforcer: Arc<LicenseEnforcer>,
    offline_threshold_secs: i64,
}

impl WorkerRegistry {
    pub fn new(enforcer: Arc<LicenseEnforcer>, offline_threshold_secs: i64) -> Self {
        Self {
            workers: Mutex::new(HashMap::new()),
            enforcer,
            offline_threshold_secs,
        }
    }

    /// Apply a heartbeat. Returns true when the worker is admitted.
    ///
    /// A refused worker is still recorded (state Rejected) so monitoring can
    /// show why it must not execute.
    pub fn heartbeat(
        &self,
        worker_id: &str,
        hostname: &str,
        current_job_id: Option<JobId>,
    ) -> bool {
        let admitted = self.enforcer.register_heartbeat(worker_id);

        let mut workers = self.workers.lock().expect("registry mutex poisoned");
        let status = workers
            .entry(worker_id.to_string())
            .or_insert_with(|| WorkerStatus::new(worker_id, hostname));
        status.heartbeat(current_job_id);
        if !admitted {
            status.state = WorkerState::Rejected;
        }
        debug!(worker_id, admitted, "heartbeat");
        admitted
    }

    /// Remove a worker on clean shutdown.
    pub fn deregister(&self, worker_id: &str) {
        self.workers
            .lock()
            .expect("registry mutex poisoned")
            .remove(worker_id);
        self.enforcer.deregister(worker_id);
    }

    /// Snapshot all workers with the offline threshold applied.
    pub fn snapshot(&self) -> Vec<WorkerStatus> {
        let now = Utc::now();
        let workers = self.workers.lock().expect("registry mutex poisoned");
        let mut snapshot: Vec<WorkerStatus> = workers
            .values()
            .map(|w| {
                let mut w = w.clone();
                if w.state != WorkerState::Rejected
                    && w.is_offline(self.offline_threshold_secs, now)
                {
                    w.state = WorkerState::Offline;
                }
                w
            })
            .collect();
        snapshot.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        snapshot
    }

    /// Deregister workers whose last heartbeat is older than the threshold,
    /// freeing their license slots.
    pub fn purge_stale(&self) -> usize {
        let now = Utc::now();
        let mut workers = self.workers.lock().expect("registry mutex poisoned");
        let stale: Vec<String> = workers
            .values()
            .filter(|w| w.is_offline(self.offline_threshold_secs, now))
            .map(|w| w.worker_id.clone())
            .collect();
        for worker_id in &stale {
            workers.remove(worker_id);
            self.enforcer.deregister(worker_id);
        }
        stale.len()
    }
}
