//! Worker status snapshots used by the license enforcer and monitoring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::JobId;

/// Observed worker state.
///
/// `Offline` is derived purely by the monitor applying a last-seen
/// threshold; workers never report it themselves. `Rejected` comes from the
/// license enforcer; a rejected worker must not execute any task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    #[default]
    Idle,
    Busy,
    Offline,
    Rejected,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Idle => "idle",
            WorkerState::Busy => "busy",
            WorkerState::Offline => "offline",
            WorkerState::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Last known state of a worker, created on first heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub worker_id: String,
    pub hostname: String,
    pub state: WorkerState,
    pub last_seen: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_job_id: Option<JobId>,
}

impl WorkerStatus {
    pub fn new(worker_id: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            hostname: hostname.into(),
            state: WorkerState::Idle,
            last_seen: Utc::now(),
            current_job_id: None,
        }
    }

    /// Apply a heartbeat: refresh last_seen and the busy/idle state.
    pub fn heartbeat(&mut self, current_job_id: Option<JobId>) {
        self.last_seen = Utc::now();
        self.state = if current_job_id.is_some() {
            WorkerState::Busy
        } else {
            WorkerState::Idle
        };
        self.current_job_id = current_job_id;
    }

    /// Whether the worker should be shown offline for the given threshold.
    pub fn is_offline(&self, threshold_secs: i64, now: DateTime<Utc>) -> bool {
        (now - self.last_seen).num_seconds() > threshold_secs
    }
}
