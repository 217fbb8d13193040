//! Read-only query layer.
//!
//! Snapshot views of jobs, tasks, timeline and reports for the monitoring
//! surface. Reads never lock out writers and never mutate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use forge_models::{DeliveryStage, Job, JobId, JobStatus, TaskStatus};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::reports;
use crate::scheduler::Scheduler;

pub use crate::reports::ReportReference;

/// Timeline entries included in a job detail response.
const TIMELINE_SLICE: usize = 200;

/// Summary view of a job for list endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub total_tasks: usize,
    pub queued_count: usize,
    pub running_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub warning_count: usize,
}

impl JobSummary {
    fn from_job(job: &Job) -> Self {
        let counters = job.counters();
        Self {
            id: job.id.to_string(),
            status: job.status,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            total_tasks: counters.total,
            queued_count: counters.queued,
            running_count: counters.running,
            completed_count: counters.completed,
            failed_count: counters.failed,
            skipped_count: counters.skipped,
            warning_count: counters.warnings,
        }
    }
}

/// Detailed view of a single clip task.
#[derive(Debug, Clone, Serialize)]
pub struct ClipTaskDetail {
    pub id: String,
    pub source_path: String,
    pub status: TaskStatus,
    pub delivery_stage: DeliveryStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    pub progress_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encode_fps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_channels: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_space: Option<String>,
}

/// One timeline entry in a detail response.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub event_type: String,
    pub recorded_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Full job detail including tasks and a bounded timeline slice.
#[derive(Debug, Clone, Serialize)]
pub struct JobDetail {
    #[serde(flatten)]
    pub summary: JobSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_metadata: Option<forge_models::SkipMetadata>,
    pub settings_summary: SettingsSummary,
    pub tasks: Vec<ClipTaskDetail>,
    pub timeline: Vec<TimelineEntry>,
}

/// What this job will produce, for operator visibility.
#[derive(Debug, Clone, Serialize)]
pub struct SettingsSummary {
    pub codec: String,
    pub container: String,
    pub output_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
}

/// Read-only facade over the scheduler registry and the report directory.
#[derive(Clone)]
pub struct QueryLayer {
    scheduler: Scheduler,
    config: Arc<EngineConfig>,
}

impl QueryLayer {
    pub fn new(scheduler: Scheduler, config: Arc<EngineConfig>) -> Self {
        Self { scheduler, config }
    }

    /// Job summaries, newest first.
    pub fn list_jobs(&self) -> Vec<JobSummary> {
        let mut jobs = self.scheduler.snapshot_jobs();
        jobs.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        jobs.iter().map(JobSummary::from_job).collect()
    }

    /// Full detail for one job.
    pub fn get_job(&self, job_id: &JobId) -> EngineResult<JobDetail> {
        let job = self
            .scheduler
            .get_job(job_id)
            .ok_or_else(|| EngineError::JobNotFound(job_id.clone()))?;

        let settings = job.effective_settings();
        let tasks = job
            .tasks
            .iter()
            .map(|task| ClipTaskDetail {
                id: task.id.to_string(),
                source_path: task.source_path.to_string_lossy().to_string(),
                status: task.status,
                delivery_stage: task.delivery_stage,
                started_at: task.started_at,
                completed_at: task.completed_at,
                output_path: Some(task.output_path.to_string_lossy().to_string())
                    .filter(|p| !p.is_empty()),
                progress_percent: task.progress_percent,
                eta_seconds: task.eta_seconds,
                encode_fps: task.encode_fps,
                failure_reason: task.failure_reason.clone(),
                warnings: task.warnings.clone(),
                resolution: task.metadata.as_ref().and_then(|m| m.resolution.clone()),
                codec: task.metadata.as_ref().and_then(|m| m.codec.clone()),
                frame_rate: task.metadata.as_ref().and_then(|m| m.fps),
                duration_seconds: task.metadata.as_ref().and_then(|m| m.duration_seconds),
                audio_channels: task
                    .metadata
                    .as_ref()
                    .and_then(|m| m.audio_channels.clone()),
                color_space: task.metadata.as_ref().and_then(|m| m.color_space.clone()),
            })
            .collect();

        // Bounded slice: the most recent entries, in order.
        let start = job.timeline.len().saturating_sub(TIMELINE_SLICE);
        let timeline = job.timeline[start..]
            .iter()
            .map(|event| TimelineEntry {
                event_type: event.event_type.as_str().to_string(),
                recorded_at: event.recorded_at,
                clip_id: event.clip_id.as_ref().map(|c| c.to_string()),
                message: event.message.clone(),
            })
            .collect();

        Ok(JobDetail {
            summary: JobSummary::from_job(&job),
            failure_reason: job.failure_reason.clone(),
            skip_metadata: job.skip_metadata.clone(),
            settings_summary: SettingsSummary {
                codec: settings.video.codec.to_string(),
                container: settings.file.container.to_string(),
                output_dir: settings.output_dir.to_string_lossy().to_string(),
                engine: settings.engine.map(|e| e.to_string()),
            },
            tasks,
            timeline,
        })
    }

    /// References to report artifacts for a job, newest first.
    pub fn get_reports(&self, job_id: &JobId) -> EngineResult<Vec<ReportReference>> {
        if self.scheduler.get_job(job_id).is_none() {
            return Err(EngineError::JobNotFound(job_id.clone()));
        }
        Ok(reports::find_job_reports(job_id, &self.config.reports_dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::license::LicenseEnforcer;
    use forge_models::{
        AudioSettings, ClipTask, Container, DeliverSettings, FileSettings, FpsMode, License,
        LicenseTier, ResolutionPolicy, VideoCodec, VideoSettings,
    };
    use forge_store::Store;
    use std::path::{Path, PathBuf};

    fn scheduler(dir: &Path) -> Scheduler {
        Scheduler::new(
            Arc::new(Store::open(dir.join("forge.db")).unwrap()),
            EngineConfig::default(),
            Arc::new(LicenseEnforcer::new(License::for_tier(
                LicenseTier::Facility,
                None,
            ))),
            "test-host-main",
            vec![],
        )
    }

    fn job() -> Job {
        let mut job = Job::new(DeliverSettings {
            output_dir: PathBuf::from("/out"),
            video: VideoSettings {
                codec: VideoCodec::H264,
            },
            audio: AudioSettings::default(),
            file: FileSettings {
                container: Container::Mp4,
                naming_template: "{source_name}_proxy".to_string(),
                prefix: None,
                suffix: None,
                preserve_source_dirs: false,
                preserve_dir_levels: 0,
            },
            resolution: ResolutionPolicy::Half,
            fps: FpsMode::Source,
            engine: None,
        });
        job.tasks.push(ClipTask::new(
            job.id.clone(),
            PathBuf::from("/m/a.mov"),
            PathBuf::from("/out/a_proxy.mp4"),
        ));
        job
    }

    #[tokio::test]
    async fn test_list_jobs_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(dir.path());
        let query = QueryLayer::new(scheduler.clone(), Arc::new(EngineConfig::default()));

        let mut older = job();
        older.created_at = Utc::now() - chrono::Duration::seconds(60);
        let older_id = older.id.to_string();
        scheduler.attach_job(older);
        let newer = job();
        let newer_id = newer.id.to_string();
        scheduler.attach_job(newer);

        let summaries = query.list_jobs();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, newer_id);
        assert_eq!(summaries[1].id, older_id);
    }

    #[tokio::test]
    async fn test_detail_includes_tasks_and_timeline() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(dir.path());
        let query = QueryLayer::new(scheduler.clone(), Arc::new(EngineConfig::default()));

        let mut job = job();
        crate::recorder::record_event(
            &mut job,
            forge_models::EventType::JobCreated,
            None,
            None,
        );
        let job_id = job.id.clone();
        scheduler.attach_job(job);

        let detail = query.get_job(&job_id).unwrap();
        assert_eq!(detail.summary.total_tasks, 1);
        assert_eq!(detail.tasks.len(), 1);
        assert_eq!(detail.timeline.len(), 1);
        assert_eq!(detail.settings_summary.codec, "h264");
        assert_eq!(detail.tasks[0].progress_percent, 0.0);
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(dir.path());
        let query = QueryLayer::new(scheduler, Arc::new(EngineConfig::default()));

        assert!(matches!(
            query.get_job(&JobId::new()),
            Err(EngineError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_timeline_slice_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(dir.path());
        let query = QueryLayer::new(scheduler.clone(), Arc::new(EngineConfig::default()));

        let mut job = job();
        for _ in 0..(TIMELINE_SLICE + 50) {
            crate::recorder::record_event(
                &mut job,
                forge_models::EventType::ProgressUpdate,
                None,
                None,
            );
        }
        let job_id = job.id.clone();
        scheduler.attach_job(job);

        let detail = query.get_job(&job_id).unwrap();
        assert_eq!(detail.timeline.len(), TIMELINE_SLICE);
    }
}
