//! Startup recovery.
//!
//! Runs once after the store opens. Any job persisted as Running or Paused
//! belonged to a dead process: it is transitioned to Failed with reason
//! `interrupted_by_restart`, its non-terminal tasks fail the same way, and a
//! terminal event is appended. Nothing is ever resumed. All other states
//! are preserved verbatim.

use tracing::{info, warn};

use forge_models::{EventType, FailureTag, Job, JobStatus};
use forge_store::Store;

use crate::error::EngineResult;
use crate::recorder::record_event;

/// Load all persisted jobs, failing interrupted ones. Returns the full job
/// list (recovered and untouched alike) for the scheduler registry.
pub fn recover_interrupted_jobs(store: &Store) -> EngineResult<Vec<Job>> {
    let mut jobs = store.load_all_jobs()?;
    let mut recovered = 0usize;

    for job in &mut jobs {
        if !matches!(job.status, JobStatus::Running | JobStatus::Paused) {
            continue;
        }

        let reason = format!(
            "{}: process restarted while job was {}",
            FailureTag::InterruptedByRestart.as_str(),
            job.status
        );

        for task in &mut job.tasks {
            if !task.status.is_terminal() {
                task.fail(reason.clone());
            }
        }
        job.failure_reason = Some(reason.clone());
        job.finish(JobStatus::Failed);
        record_event(job, EventType::ExecutionFailed, None, Some(reason));

        if let Err(err) = store.save_job(job) {
            warn!(job_id = %job.id, "failed to persist recovery: {err}");
        }
        recovered += 1;
    }

    if recovered > 0 {
        info!("recovery: marked {recovered} interrupted job(s) as failed");
    }
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_models::{
        AudioSettings, ClipTask, Container, DeliverSettings, FileSettings, FpsMode,
        ResolutionPolicy, TaskStatus, VideoCodec, VideoSettings,
    };
    use std::path::PathBuf;
    use std::sync::Arc;

    fn settings() -> DeliverSettings {
        DeliverSettings {
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
        }
    }

    fn job_in(status: JobStatus, task_status: TaskStatus) -> Job {
        let mut job = Job::new(settings());
        let mut task = ClipTask::new(
            job.id.clone(),
            PathBuf::from("/m/a.mov"),
            PathBuf::from("/out/a_proxy.mp4"),
        );
        task.status = task_status;
        job.tasks.push(task);
        job.status = status;
        job
    }

    #[test]
    fn test_running_jobs_fail_on_restart() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("forge.db")).unwrap());

        let running = job_in(JobStatus::Running, TaskStatus::Running);
        let running_id = running.id.clone();
        store.save_job(&running).unwrap();

        let jobs = recover_interrupted_jobs(&store).unwrap();
        let recovered = jobs.iter().find(|j| j.id == running_id).unwrap();
        assert_eq!(recovered.status, JobStatus::Failed);
        assert_eq!(recovered.tasks[0].status, TaskStatus::Failed);
        assert!(recovered.tasks[0]
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("interrupted_by_restart"));
        assert!(recovered
            .timeline
            .iter()
            .any(|e| e.event_type == EventType::ExecutionFailed));

        // And the failure is durable.
        let reloaded = store.load_job(&running_id).unwrap().unwrap();
        assert_eq!(reloaded.status, JobStatus::Failed);
    }

    #[test]
    fn test_paused_jobs_also_fail() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("forge.db")).unwrap());
        let paused = job_in(JobStatus::Paused, TaskStatus::Queued);
        let paused_id = paused.id.clone();
        store.save_job(&paused).unwrap();

        recover_interrupted_jobs(&store).unwrap();
        let reloaded = store.load_job(&paused_id).unwrap().unwrap();
        assert_eq!(reloaded.status, JobStatus::Failed);
    }

    #[test]
    fn test_other_states_preserved_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("forge.db")).unwrap());

        for (status, task_status) in [
            (JobStatus::Pending, TaskStatus::Queued),
            (JobStatus::Completed, TaskStatus::Completed),
            (JobStatus::Cancelled, TaskStatus::Skipped),
            (JobStatus::Partial, TaskStatus::Failed),
        ] {
            let job = job_in(status, task_status);
            let id = job.id.clone();
            store.save_job(&job).unwrap();

            recover_interrupted_jobs(&store).unwrap();
            let reloaded = store.load_job(&id).unwrap().unwrap();
            assert_eq!(reloaded.status, status);
            assert_eq!(reloaded.tasks[0].status, task_status);
        }
    }

    #[test]
    fn test_no_job_remains_running_after_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("forge.db")).unwrap());
        store.save_job(&job_in(JobStatus::Running, TaskStatus::Running)).unwrap();
        store.save_job(&job_in(JobStatus::Paused, TaskStatus::Queued)).unwrap();
        store.save_job(&job_in(JobStatus::Pending, TaskStatus::Queued)).unwrap();

        let jobs = recover_interrupted_jobs(&store).unwrap();
        assert!(jobs
            .iter()
            .all(|j| !matches!(j.status, JobStatus::Running | JobStatus::Paused)));
    }
}
