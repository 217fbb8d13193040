//! Job model and aggregate state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::ExecutionEvent;
use crate::ids::JobId;
use crate::settings::DeliverSettings;
use crate::task::{ClipTask, TaskStatus};

/// Aggregate job state.
///
/// Pending → Running → (Paused ⇄ Running) → {Completed, Failed, Partial,
/// Cancelled}. `Skipped` is terminal and reserved for intentionally unmet
/// preconditions such as Resolve edition gating. Terminal states are
/// absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Partial,
    Cancelled,
    Skipped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Partial => "partial",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "paused" => Some(JobStatus::Paused),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "partial" => Some(JobStatus::Partial),
            "cancelled" => Some(JobStatus::Cancelled),
            "skipped" => Some(JobStatus::Skipped),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed
                | JobStatus::Failed
                | JobStatus::Partial
                | JobStatus::Cancelled
                | JobStatus::Skipped
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Counters derived from task states; never stored independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct JobCounters {
    pub total: usize,
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub warnings: usize,
}

/// Why a job was skipped instead of executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipMetadata {
    pub reason: String,
    pub detected_edition: String,
    pub required_edition: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolve_version: Option<String>,
}

/// A proxy-generation job: a frozen settings snapshot plus its clip tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: JobStatus,
    /// Immutable after creation.
    pub settings: DeliverSettings,
    /// Optional layer applied atop the snapshot without overwriting it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_settings: Option<DeliverSettings>,
    /// Ordered; dispatch follows this order.
    #[serde(default)]
    pub tasks: Vec<ClipTask>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_metadata: Option<SkipMetadata>,
    /// Append-only execution timeline, serialised with the job.
    #[serde(default)]
    pub timeline: Vec<ExecutionEvent>,
}

impl Job {
    /// Create a pending job with a frozen settings snapshot and no tasks yet.
    pub fn new(settings: DeliverSettings) -> Self {
        Self {
            id: JobId::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            status: JobStatus::Pending,
            settings,
            override_settings: None,
            tasks: Vec::new(),
            failure_reason: None,
            skip_metadata: None,
            timeline: Vec::new(),
        }
    }

    /// Settings in effect: the override layer when present, else the snapshot.
    pub fn effective_settings(&self) -> &DeliverSettings {
        self.override_settings.as_ref().unwrap_or(&self.settings)
    }

    /// Derive the aggregate counters from task states.
    pub fn counters(&self) -> JobCounters {
        let mut counters = JobCounters {
            total: self.tasks.len(),
            ..JobCounters::default()
        };
        for task in &self.tasks {
            match task.status {
                TaskStatus::Queued => counters.queued += 1,
                TaskStatus::Running => counters.running += 1,
                TaskStatus::Completed => counters.completed += 1,
                TaskStatus::Failed => counters.failed += 1,
                TaskStatus::Skipped => counters.skipped += 1,
            }
            counters.warnings += task.warnings.len();
        }
        counters
    }

    /// Mark the job running and stamp its start instant.
    pub fn start(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Terminal status implied by the current task states.
    ///
    /// Only meaningful once no task is queued or running: all completed →
    /// Completed; none completed and ≥1 failed → Failed; mixed terminal
    /// outcomes → Partial; everything skipped → Skipped.
    pub fn terminal_status_from_tasks(&self) -> JobStatus {
        let c = self.counters();
        debug_assert_eq!(c.queued + c.running, 0);
        if c.total > 0 && c.completed == c.total {
            JobStatus::Completed
        } else if c.completed == 0 && c.failed > 0 {
            JobStatus::Failed
        } else if c.completed > 0 {
            JobStatus::Partial
        } else {
            JobStatus::Skipped
        }
    }

    /// Finish the job with an explicit terminal status.
    pub fn finish(&mut self, status: JobStatus) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    /// Whether any task is still queued or running.
    pub fn has_live_tasks(&self) -> bool {
        self.tasks
            .iter()
            .any(|t| matches!(t.status, TaskStatus::Queued | TaskStatus::Running))
    }
}
