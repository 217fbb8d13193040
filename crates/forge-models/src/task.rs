//! Clip task model: one encode unit inside a job.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{JobId, TaskId};

/// Clip task state.
///
/// Transitions form a DAG: Queued → Running → {Completed, Failed}, and
/// Queued → Skipped when a job is cancelled or gated before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Queued,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(TaskStatus::Queued),
            "running" => Some(TaskStatus::Running),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            "skipped" => Some(TaskStatus::Skipped),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse, monotone phase indicator on a running task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStage {
    #[default]
    Queued,
    Starting,
    Encoding,
    Finalizing,
    Completed,
    Failed,
}

impl DeliveryStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStage::Queued => "queued",
            DeliveryStage::Starting => "starting",
            DeliveryStage::Encoding => "encoding",
            DeliveryStage::Finalizing => "finalizing",
            DeliveryStage::Completed => "completed",
            DeliveryStage::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DeliveryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Media metadata captured from the probe at ingest, for display only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MediaMetadata {
    /// e.g. "1920x1080"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    /// e.g. "prores"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    /// e.g. 23.976
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    /// Duration in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// e.g. "stereo" or "5.1"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_channels: Option<String>,
    /// e.g. "bt709"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_space: Option<String>,
}

/// A single clip encode inside a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipTask {
    pub id: TaskId,
    /// Parent job, by id only. Tasks never hold a back-reference.
    pub job_id: JobId,
    pub source_path: PathBuf,
    /// Resolved absolute output path.
    pub output_path: PathBuf,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub delivery_stage: DeliveryStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Set only when status is Failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Ordered, append-only.
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Never incremented by the core; retry is an operator decision.
    #[serde(default)]
    pub retry_count: u32,
    /// Honest progress: written only from parsed encoder output.
    #[serde(default)]
    pub progress_percent: f64,
    /// Set only when the encoder reported a usable speed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<f64>,
    /// Current encode speed in frames per second, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encode_fps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MediaMetadata>,
}

impl ClipTask {
    /// Create a queued task for a source/output pair.
    pub fn new(job_id: JobId, source_path: PathBuf, output_path: PathBuf) -> Self {
        Self {
            id: TaskId::new(),
            job_id,
            source_path,
            output_path,
            status: TaskStatus::Queued,
            delivery_stage: DeliveryStage::Queued,
            started_at: None,
            completed_at: None,
            failure_reason: None,
            warnings: Vec::new(),
            retry_count: 0,
            progress_percent: 0.0,
            eta_seconds: None,
            encode_fps: None,
            metadata: None,
        }
    }

    /// Mark the task running and stamp its start instant.
    pub fn start(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
        self.advance_stage(DeliveryStage::Starting);
    }

    /// Mark the task completed and stamp its completion instant.
    pub fn complete(&mut self) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.delivery_stage = DeliveryStage::Completed;
        self.progress_percent = 100.0;
        self.eta_seconds = None;
    }

    /// Mark the task failed with a reason.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.delivery_stage = DeliveryStage::Failed;
        self.failure_reason = Some(reason.into());
        self.eta_seconds = None;
    }

    /// Mark the task skipped (cancellation, gating) with a reason warning.
    pub fn skip(&mut self, reason: impl Into<String>) {
        self.status = TaskStatus::Skipped;
        self.completed_at = Some(Utc::now());
        self.warnings.push(reason.into());
    }

    /// Advance the delivery stage. Stages never move backwards while running.
    pub fn advance_stage(&mut self, stage: DeliveryStage) {
        if stage > self.delivery_stage {
            self.delivery_stage = stage;
        }
    }

    /// Record a parsed progress sample.
    pub fn record_progress(&mut self, percent: f64, eta_seconds: Option<f64>, fps: Option<f64>) {
        self.progress_percent = percent.clamp(0.0, 100.0);
        self.eta_seconds = eta_seconds;
        if fps.is_some() {
            self.encode_fps = fps;
        }
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> ClipTask {
        ClipTask::new(
            JobId::new(),
            PathBuf::from("/media/a.mov"),
            PathBuf::from("/out/a_proxy.mp4"),
        )
    }

    #[test]
    fn test_lifecycle_stamps() {
        let mut t = task();
        assert_eq!(t.status, TaskStatus::Queued);

        t.start();
        assert_eq!(t.status, TaskStatus::Running);
        assert!(t.started_at.is_some());
        assert_eq!(t.delivery_stage, DeliveryStage::Starting);

        t.complete();
        assert_eq!(t.status, TaskStatus::Completed);
        assert!(t.completed_at.is_some());
        assert_eq!(t.progress_percent, 100.0);
        assert!(t.status.is_terminal());
    }

    #[test]
    fn test_stage_is_monotone() {
        let mut t = task();
        t.start();
        t.advance_stage(DeliveryStage::Encoding);
        assert_eq!(t.delivery_stage, DeliveryStage::Encoding);

        // A late Starting notification must not regress the stage.
        t.advance_stage(DeliveryStage::Starting);
        assert_eq!(t.delivery_stage, DeliveryStage::Encoding);
    }

    #[test]
    fn test_failure_reason_only_on_failed() {
        let mut t = task();
        t.start();
        t.fail("ffmpeg exited with code 1");
        assert_eq!(t.status, TaskStatus::Failed);
        assert_eq!(t.delivery_stage, DeliveryStage::Failed);
        assert!(t.failure_reason.as_deref().unwrap().contains("code 1"));
    }

    #[test]
    fn test_progress_is_clamped() {
        let mut t = task();
        t.record_progress(140.0, Some(2.0), None);
        assert_eq!(t.progress_percent, 100.0);
        t.record_progress(-3.0, None, None);
        assert_eq!(t.progress_percent, 0.0);
    }
}
