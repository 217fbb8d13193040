//! FIFO scheduler: per-clip dispatch under concurrency and license limits,
//! with cooperative pause/resume/cancel.
//!
//! One job executes at a time; within a job, clips run strictly
//! sequentially (`EngineConfig::clips_in_flight_per_job` is the only place
//! that constant lives). Every state-altering operation commits before its
//! timeline event is recorded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use forge_media::{EncodeEngine, EncodePlan, ExecutionOutcome, ProgressFn, ProgressSample};
use forge_models::{
    DeliveryStage, Engine, EventType, FailureTag, Job, JobId, JobStatus, TaskStatus,
};
use forge_store::Store;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::license::LicenseEnforcer;
use crate::recorder::{persist_then_record, record_event};

struct ActiveJob {
    job_id: JobId,
    cancel_tx: watch::Sender<bool>,
    pause_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

struct Inner {
    store: Arc<Store>,
    config: EngineConfig,
    enforcer: Arc<LicenseEnforcer>,
    worker_id: String,
    engines: HashMap<Engine, Arc<dyn EncodeEngine>>,
    jobs: Mutex<HashMap<JobId, Job>>,
    active: Mutex<Option<ActiveJob>>,
}

/// Single-process scheduler servicing pending jobs in FIFO order of
/// creation.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(
        store: Arc<Store>,
        config: EngineConfig,
        enforcer: Arc<LicenseEnforcer>,
        worker_id: impl Into<String>,
        engines: Vec<Arc<dyn EncodeEngine>>,
    ) -> Self {
        let engines = engines
            .into_iter()
            .map(|adapter| (adapter.engine(), adapter))
            .collect();
        Self {
            inner: Arc::new(Inner {
                store,
                config,
                enforcer,
                worker_id: worker_id.into(),
                engines,
                jobs: Mutex::new(HashMap::new()),
                active: Mutex::new(None),
            }),
        }
    }

    /// Add a job to the in-memory registry (after ingestion or recovery).
    pub fn attach_job(&self, job: Job) {
        self.inner
            .jobs
            .lock()
            .expect("scheduler mutex poisoned")
            .insert(job.id.clone(), job);
    }

    /// Snapshot of every known job.
    pub fn snapshot_jobs(&self) -> Vec<Job> {
        self.inner
            .jobs
            .lock()
            .expect("scheduler mutex poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn get_job(&self, job_id: &JobId) -> Option<Job> {
        self.inner
            .jobs
            .lock()
            .expect("scheduler mutex poisoned")
            .get(job_id)
            .cloned()
    }

    /// Start the head-of-queue pending job.
    ///
    /// Fails when nothing is pending or when a job is already running or
    /// paused; there is no partial acceptance.
    pub fn start_execution(&self) -> EngineResult<JobId> {
        let head = {
            let jobs = self.inner.jobs.lock().expect("scheduler mutex poisoned");
            // FIFO by creation instant; identical instants break ties by id.
            jobs.values()
                .filter(|j| j.status == JobStatus::Pending)
                .min_by(|a, b| {
                    a.created_at
                        .cmp(&b.created_at)
                        .then_with(|| a.id.cmp(&b.id))
                })
                .map(|j| j.id.clone())
        };
        let head = head.ok_or(EngineError::NothingPending)?;
        self.start_job(&head)?;
        Ok(head)
    }

    /// Start a specific pending job.
    pub fn start_job(&self, job_id: &JobId) -> EngineResult<()> {
        if let Some(running) = self.running_job_id() {
            return Err(EngineError::JobAlreadyRunning(running));
        }

        let mut active = self.inner.active.lock().expect("scheduler mutex poisoned");
        if let Some(active_job) = &*active {
            return Err(EngineError::JobAlreadyRunning(active_job.job_id.clone()));
        }

        {
            let mut jobs = self.inner.jobs.lock().expect("scheduler mutex poisoned");
            let job = jobs
                .get_mut(job_id)
                .ok_or_else(|| EngineError::JobNotFound(job_id.clone()))?;
            match job.status {
                JobStatus::Pending => {}
                status if status.is_terminal() => {
                    return Err(EngineError::TerminalJob {
                        job_id: job_id.clone(),
                        status,
                    })
                }
                status => {
                    return Err(EngineError::NotPending {
                        job_id: job_id.clone(),
                        status,
                    })
                }
            }

            job.start();
            persist_then_record(
                &self.inner.store,
                job,
                EventType::ExecutionStarted,
                None,
                None,
            )?;
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (pause_tx, pause_rx) = watch::channel(false);

        let inner = Arc::clone(&self.inner);
        let run_id = job_id.clone();
        let handle = tokio::spawn(async move {
            run_job(inner, run_id, cancel_rx, pause_rx).await;
        });

        *active = Some(ActiveJob {
            job_id: job_id.clone(),
            cancel_tx,
            pause_tx,
            handle: Some(handle),
        });
        info!(job_id = %job_id, "execution started");
        Ok(())
    }

    fn running_job_id(&self) -> Option<JobId> {
        let jobs = self.inner.jobs.lock().expect("scheduler mutex poisoned");
        jobs.values()
            .find(|j| matches!(j.status, JobStatus::Running | JobStatus::Paused))
            .map(|j| j.id.clone())
    }

    /// Request a cooperative pause. The currently running clip runs to
    /// completion; no new clip starts until resume. Idempotent.
    pub fn pause_job(&self, job_id: &JobId) -> EngineResult<()> {
        let active = self.inner.active.lock().expect("scheduler mutex poisoned");
        match &*active {
            Some(active_job) if &active_job.job_id == job_id => {
                let _ = active_job.pause_tx.send(true);
                Ok(())
            }
            _ => {
                let status = self
                    .get_job(job_id)
                    .ok_or_else(|| EngineError::JobNotFound(job_id.clone()))?
                    .status;
                Err(EngineError::NotRunning {
                    job_id: job_id.clone(),
                    status,
                })
            }
        }
    }

    /// Clear the pause flag. Idempotent.
    pub fn resume_job(&self, job_id: &JobId) -> EngineResult<()> {
        let active = self.inner.active.lock().expect("scheduler mutex poisoned");
        match &*active {
            Some(active_job) if &active_job.job_id == job_id => {
                let _ = active_job.pause_tx.send(false);
                Ok(())
            }
            _ => {
                let status = self
                    .get_job(job_id)
                    .ok_or_else(|| EngineError::JobNotFound(job_id.clone()))?
                    .status;
                Err(EngineError::NotRunning {
                    job_id: job_id.clone(),
                    status,
                })
            }
        }
    }

    /// Cancel a job. Idempotent; never raises when the job is already
    /// terminal. Pending jobs cancel immediately; a running job's adapter is
    /// signalled and remaining queued tasks are skipped by the run loop.
    pub fn cancel_job(&self, job_id: &JobId, reason: &str) -> EngineResult<()> {
        {
            let active = self.inner.active.lock().expect("scheduler mutex poisoned");
            if let Some(active_job) = &*active {
                if &active_job.job_id == job_id {
                    let _ = active_job.cancel_tx.send(true);
                    // Cancellation also lifts any pause so the run loop can
                    // observe the flag.
                    let _ = active_job.pause_tx.send(false);
                    return Ok(());
                }
            }
        }

        let mut jobs = self.inner.jobs.lock().expect("scheduler mutex poisoned");
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| EngineError::JobNotFound(job_id.clone()))?;

        if job.status.is_terminal() {
            return Ok(());
        }

        for task in &mut job.tasks {
            if task.status == TaskStatus::Queued {
                task.skip(format!("{}: {reason}", FailureTag::Cancelled.as_str()));
            }
        }
        job.finish(JobStatus::Cancelled);
        persist_then_record(
            &self.inner.store,
            job,
            EventType::ExecutionCancelled,
            None,
            Some(reason.to_string()),
        )?;
        info!(job_id = %job_id, "pending job cancelled");
        Ok(())
    }

    /// Remove terminal jobs from registry and store. Running and pending
    /// jobs are never removed.
    pub fn clear_terminal_jobs(&self) -> EngineResult<usize> {
        let mut jobs = self.inner.jobs.lock().expect("scheduler mutex poisoned");
        let terminal: Vec<JobId> = jobs
            .values()
            .filter(|j| j.status.is_terminal())
            .map(|j| j.id.clone())
            .collect();
        for job_id in &terminal {
            self.inner.store.delete_job(job_id)?;
            jobs.remove(job_id);
        }
        Ok(terminal.len())
    }

    /// Await completion of the currently running job, if any.
    pub async fn wait_for_current_job(&self) {
        let handle = {
            let mut active = self.inner.active.lock().expect("scheduler mutex poisoned");
            active.as_mut().and_then(|a| a.handle.take())
        };
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!("job task panicked: {err}");
            }
        }
    }
}

/// Outcome of the between-clips gate.
enum Gate {
    Proceed,
    Cancelled,
}

async fn run_job(
    inner: Arc<Inner>,
    job_id: JobId,
    mut cancel_rx: watch::Receiver<bool>,
    mut pause_rx: watch::Receiver<bool>,
) {
    let task_count = match with_job(&inner, &job_id, |job| job.tasks.len()) {
        Some(count) => count,
        None => return,
    };

    // The per-job concurrency constant lives here and only here; a future
    // per-job cap replaces this sequential loop without redesign.
    let _clips_in_flight = inner.config.clips_in_flight_per_job;

    let mut cancelled = false;
    for index in 0..task_count {
        match pause_gate(&inner, &job_id, &mut pause_rx, &mut cancel_rx).await {
            Gate::Proceed => {}
            Gate::Cancelled => {
                cancelled = true;
                break;
            }
        }

        // The license enforcer is consulted before every dispatch; a
        // rejected worker must not start any task.
        if let Err(err) = inner.enforcer.require_admission(&inner.worker_id) {
            warn!(job_id = %job_id, "dispatch refused: {err}");
            fail_remaining_for_license(&inner, &job_id, &err);
            return;
        }

        let Some((plan, engine)) = prepare_task(&inner, &job_id, index) else {
            continue;
        };

        let Some(adapter) = inner.engines.get(&engine).cloned() else {
            apply_missing_engine(&inner, &job_id, index, engine);
            continue;
        };

        let progress = progress_fn(&inner, &job_id);
        let result = adapter.encode(plan, cancel_rx.clone(), progress).await;

        let was_cancelled = matches!(result.outcome, ExecutionOutcome::Cancelled);
        apply_result(&inner, &job_id, index, result);
        if was_cancelled {
            cancelled = true;
            break;
        }
    }

    finish_job(&inner, &job_id, cancelled);

    let mut active = inner.active.lock().expect("scheduler mutex poisoned");
    if active.as_ref().is_some_and(|a| a.job_id == job_id) {
        *active = None;
    }
}

/// Between-clips safe point: honour pause, watch for cancel.
async fn pause_gate(
    inner: &Arc<Inner>,
    job_id: &JobId,
    pause_rx: &mut watch::Receiver<bool>,
    cancel_rx: &mut watch::Receiver<bool>,
) -> Gate {
    if *cancel_rx.borrow() {
        return Gate::Cancelled;
    }
    if !*pause_rx.borrow() {
        return Gate::Proceed;
    }

    with_job(inner, job_id, |job| {
        job.status = JobStatus::Paused;
    });
    persist_event(inner, job_id, EventType::ExecutionPaused, None);
    info!(job_id = %job_id, "execution paused");

    loop {
        if *cancel_rx.borrow() {
            return Gate::Cancelled;
        }
        if !*pause_rx.borrow() {
            break;
        }
        tokio::select! {
            changed = pause_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = cancel_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    with_job(inner, job_id, |job| {
        job.status = JobStatus::Running;
    });
    persist_event(inner, job_id, EventType::ExecutionResumed, None);
    info!(job_id = %job_id, "execution resumed");
    Gate::Proceed
}

/// Mark the task running and build its encode plan.
fn prepare_task(
    inner: &Arc<Inner>,
    job_id: &JobId,
    index: usize,
) -> Option<(EncodePlan, Engine)> {
    let extra_args = profile_extra_args(inner, job_id);

    let mut jobs = inner.jobs.lock().expect("scheduler mutex poisoned");
    let job = jobs.get_mut(job_id)?;
    let engine = job.effective_settings().engine.unwrap_or(Engine::Ffmpeg);
    let settings = job.effective_settings().clone();

    let task = job.tasks.get_mut(index)?;
    if task.status != TaskStatus::Queued {
        return None;
    }
    task.start();

    let plan = EncodePlan {
        task_id: task.id.clone(),
        source: task.source_path.clone(),
        output: task.output_path.clone(),
        codec: settings.video.codec,
        container: settings.file.container,
        audio: settings.audio.codec,
        fps: settings.fps,
        scale_filter: settings.resolution.ffmpeg_scale_filter(),
        extra_args,
        duration_seconds: task.metadata.as_ref().and_then(|m| m.duration_seconds),
        resolve_preset: None,
    };
    let task_id = task.id.clone();

    if let Err(err) = inner.store.save_job(job) {
        error!(job_id = %job_id, "failed to persist task start: {err}");
    }
    record_event(
        job,
        EventType::ClipStarted,
        Some(task_id),
        Some(format!("clip {}/{}", index + 1, job.tasks.len())),
    );
    if let Err(err) = inner.store.save_job(job) {
        warn!(job_id = %job_id, "failed to persist clip-started event: {err}");
    }

    Some((plan, engine))
}

/// Apply an adapter result to the owning task and record the outcome.
fn apply_result(
    inner: &Arc<Inner>,
    job_id: &JobId,
    index: usize,
    result: forge_media::ExecutionResult,
) {
    let mut jobs = inner.jobs.lock().expect("scheduler mutex poisoned");
    let Some(job) = jobs.get_mut(job_id) else {
        return;
    };
    let Some(task) = job.tasks.get_mut(index) else {
        return;
    };
    let task_id = task.id.clone();

    let event = match result.outcome {
        ExecutionOutcome::Success => {
            // A completed task must have an existing non-empty output.
            let verified = std::fs::metadata(&task.output_path)
                .map(|m| m.len() > 0)
                .unwrap_or(false);
            if verified {
                task.complete();
                (EventType::ClipCompleted, None)
            } else {
                task.fail(format!(
                    "{}: output_missing at {}",
                    FailureTag::EngineFailure.as_str(),
                    task.output_path.display()
                ));
                (EventType::ClipFailed, task.failure_reason.clone())
            }
        }
        ExecutionOutcome::Failed { reason, tag } => {
            task.fail(format!("{}: {reason}", tag.as_str()));
            (EventType::ClipFailed, task.failure_reason.clone())
        }
        ExecutionOutcome::Cancelled => {
            task.skip(format!(
                "{}: cancelled while encoding",
                FailureTag::Cancelled.as_str()
            ));
            (EventType::ClipFailed, Some("cancelled".to_string()))
        }
    };

    if let Err(err) = inner.store.save_job(job) {
        error!(job_id = %job_id, "failed to persist task result: {err}");
    }
    record_event(job, event.0, Some(task_id), event.1);
    if let Err(err) = inner.store.save_job(job) {
        warn!(job_id = %job_id, "failed to persist clip event: {err}");
    }
}

/// No adapter registered for the engine this job needs.
fn apply_missing_engine(inner: &Arc<Inner>, job_id: &JobId, index: usize, engine: Engine) {
    let mut jobs = inner.jobs.lock().expect("scheduler mutex poisoned");
    let Some(job) = jobs.get_mut(job_id) else {
        return;
    };
    let Some(task) = job.tasks.get_mut(index) else {
        return;
    };
    let task_id = task.id.clone();
    task.fail(format!(
        "{}: engine '{engine}' is not available in this process",
        FailureTag::ResolveAvailability.as_str()
    ));
    let message = task.failure_reason.clone();
    if let Err(err) = inner.store.save_job(job) {
        error!(job_id = %job_id, "failed to persist task failure: {err}");
    }
    record_event(job, EventType::ClipFailed, Some(task_id), message);
    let _ = inner.store.save_job(job);
}

/// License refusal mid-job: skip what has not run and fail the job loudly.
fn fail_remaining_for_license(inner: &Arc<Inner>, job_id: &JobId, err: &EngineError) {
    {
        let mut jobs = inner.jobs.lock().expect("scheduler mutex poisoned");
        let Some(job) = jobs.get_mut(job_id) else {
            return;
        };
        for task in &mut job.tasks {
            if task.status == TaskStatus::Queued {
                task.skip(err.to_string());
            }
        }
        job.failure_reason = Some(err.to_string());
        job.finish(JobStatus::Failed);
        let _ = inner.store.save_job(job);
        record_event(job, EventType::ExecutionFailed, None, Some(err.to_string()));
        let _ = inner.store.save_job(job);
    }

    let mut active = inner.active.lock().expect("scheduler mutex poisoned");
    if active.as_ref().is_some_and(|a| &a.job_id == job_id) {
        *active = None;
    }
}

/// Compute and record the job's terminal state.
fn finish_job(inner: &Arc<Inner>, job_id: &JobId, cancelled: bool) {
    let mut jobs = inner.jobs.lock().expect("scheduler mutex poisoned");
    let Some(job) = jobs.get_mut(job_id) else {
        return;
    };
    if job.status.is_terminal() {
        return;
    }

    if cancelled {
        for task in &mut job.tasks {
            if task.status == TaskStatus::Queued {
                task.skip(format!(
                    "{}: job cancelled",
                    FailureTag::Cancelled.as_str()
                ));
            }
        }
        job.finish(JobStatus::Cancelled);
    } else {
        let status = job.terminal_status_from_tasks();
        job.finish(status);
    }

    let event = match job.status {
        JobStatus::Completed => EventType::ExecutionCompleted,
        JobStatus::Cancelled => EventType::ExecutionCancelled,
        _ => EventType::ExecutionFailed,
    };
    let message = Some(job.status.as_str().to_string());

    if let Err(err) = inner.store.save_job(job) {
        error!(job_id = %job_id, "failed to persist terminal state: {err}");
    }
    record_event(job, event, None, message);
    if let Err(err) = inner.store.save_job(job) {
        warn!(job_id = %job_id, "failed to persist terminal event: {err}");
    }
    info!(job_id = %job_id, status = %job.status, "job finished");
}

/// Adapter progress callback: update the owning task, record stage events.
fn progress_fn(inner: &Arc<Inner>, job_id: &JobId) -> ProgressFn {
    let inner = Arc::clone(inner);
    let job_id = job_id.clone();
    Arc::new(move |sample: ProgressSample| {
        let mut jobs = inner.jobs.lock().expect("scheduler mutex poisoned");
        let Some(job) = jobs.get_mut(&job_id) else {
            return;
        };
        let Some(task) = job.tasks.iter_mut().find(|t| t.id == sample.task_id) else {
            return;
        };

        task.advance_stage(sample.stage);
        if let Some(percent) = sample.percent {
            task.record_progress(percent, sample.eta_seconds, sample.encode_fps);
        }

        // The adapter already throttles to stage transitions and 5% steps,
        // so every callback is worth a timeline entry.
        let message = match sample.percent {
            Some(percent) => format!("{} {percent:.0}%", sample.stage),
            None => sample.stage.to_string(),
        };
        record_event(
            job,
            EventType::ProgressUpdate,
            Some(sample.task_id.clone()),
            Some(message),
        );
    })
}

fn profile_extra_args(inner: &Arc<Inner>, job_id: &JobId) -> Vec<String> {
    inner
        .store
        .load_preset_binding(job_id)
        .ok()
        .flatten()
        .and_then(|id| forge_media::find_profile(&id))
        .map(|profile| profile.extra_args.iter().map(|s| s.to_string()).collect())
        .unwrap_or_default()
}

fn with_job<R>(inner: &Arc<Inner>, job_id: &JobId, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
    let mut jobs = inner.jobs.lock().expect("scheduler mutex poisoned");
    jobs.get_mut(job_id).map(f)
}

fn persist_event(
    inner: &Arc<Inner>,
    job_id: &JobId,
    event_type: EventType,
    message: Option<String>,
) {
    let mut jobs = inner.jobs.lock().expect("scheduler mutex poisoned");
    if let Some(job) = jobs.get_mut(job_id) {
        if let Err(err) = persist_then_record(&inner.store, job, event_type, None, message) {
            error!(job_id = %job_id, "failed to persist state transition: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_media::{EncodeFuture, ExecutionResult};
    use forge_models::{
        AudioSettings, ClipTask, Container, DeliverSettings, FileSettings, FpsMode, License,
        LicenseTier, ResolutionPolicy, VideoCodec, VideoSettings,
    };
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};

    /// Test adapter: succeeds by writing the output file, fails for marked
    /// sources, and waits for cancellation on blocked sources.
    struct MockEngine {
        fail: HashSet<PathBuf>,
        block: HashSet<PathBuf>,
    }

    impl MockEngine {
        fn ok() -> Self {
            Self {
                fail: HashSet::new(),
                block: HashSet::new(),
            }
        }

        fn failing(paths: &[&Path]) -> Self {
            Self {
                fail: paths.iter().map(|p| p.to_path_buf()).collect(),
                block: HashSet::new(),
            }
        }

        fn blocking(paths: &[&Path]) -> Self {
            Self {
                fail: HashSet::new(),
                block: paths.iter().map(|p| p.to_path_buf()).collect(),
            }
        }
    }

    impl EncodeEngine for MockEngine {
        fn engine(&self) -> Engine {
            Engine::Ffmpeg
        }

        fn encode(
            &self,
            plan: EncodePlan,
            mut cancel: watch::Receiver<bool>,
            progress: ProgressFn,
        ) -> EncodeFuture<'_> {
            let fail = self.fail.contains(&plan.source);
            let block = self.block.contains(&plan.source);
            Box::pin(async move {
                let started_at = chrono::Utc::now();
                progress(ProgressSample {
                    task_id: plan.task_id.clone(),
                    stage: DeliveryStage::Starting,
                    percent: None,
                    eta_seconds: None,
                    encode_fps: None,
                });

                if block {
                    loop {
                        if *cancel.borrow() {
                            return ExecutionResult {
                                outcome: ExecutionOutcome::Cancelled,
                                output_path: None,
                                argv: vec![],
                                started_at,
                                completed_at: chrono::Utc::now(),
                                encoder: Some("mock".into()),
                            };
                        }
                        if cancel.changed().await.is_err() {
                            break;
                        }
                    }
                }

                if fail {
                    return ExecutionResult {
                        outcome: ExecutionOutcome::Failed {
                            reason: "mock exit code 1".into(),
                            tag: FailureTag::EngineFailure,
                        },
                        output_path: None,
                        argv: vec![],
                        started_at,
                        completed_at: chrono::Utc::now(),
                        encoder: Some("mock".into()),
                    };
                }

                progress(ProgressSample {
                    task_id: plan.task_id.clone(),
                    stage: DeliveryStage::Encoding,
                    percent: Some(50.0),
                    eta_seconds: Some(1.0),
                    encode_fps: Some(48.0),
                });

                std::fs::write(&plan.output, b"encoded media").unwrap();
                ExecutionResult {
                    outcome: ExecutionOutcome::Success,
                    output_path: Some(plan.output.clone()),
                    argv: vec!["ffmpeg".into()],
                    started_at,
                    completed_at: chrono::Utc::now(),
                    encoder: Some("mock".into()),
                }
            })
        }
    }

    fn settings(output_dir: PathBuf) -> DeliverSettings {
        DeliverSettings {
            output_dir,
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
            engine: Some(Engine::Ffmpeg),
        }
    }

    fn make_job(out_dir: &Path, sources: &[&str]) -> Job {
        let mut job = Job::new(settings(out_dir.to_path_buf()));
        for source in sources {
            let stem = Path::new(source).file_stem().unwrap().to_string_lossy();
            job.tasks.push(ClipTask::new(
                job.id.clone(),
                PathBuf::from(source),
                out_dir.join(format!("{stem}_proxy.mp4")),
            ));
        }
        job
    }

    fn scheduler_with(engine: MockEngine, dir: &Path) -> Scheduler {
        let store = Arc::new(Store::open(dir.join("forge.db")).unwrap());
        let enforcer = Arc::new(LicenseEnforcer::new(License::for_tier(
            LicenseTier::Facility,
            None,
        )));
        Scheduler::new(
            store,
            EngineConfig::default(),
            enforcer,
            "test-host-main",
            vec![Arc::new(engine)],
        )
    }

    #[tokio::test]
    async fn test_happy_path_completes_job() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler_with(MockEngine::ok(), dir.path());
        let job = make_job(dir.path(), &["/m/a.mov"]);
        let job_id = job.id.clone();
        scheduler.attach_job(job);

        let started = scheduler.start_execution().unwrap();
        assert_eq!(started, job_id);
        scheduler.wait_for_current_job().await;

        let job = scheduler.get_job(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.tasks[0].status, TaskStatus::Completed);
        assert!(job.tasks[0].output_path.exists());

        // Timeline: started, clip started, clip completed, terminal.
        let types: Vec<EventType> = job.timeline.iter().map(|e| e.event_type).collect();
        assert!(types.contains(&EventType::ExecutionStarted));
        assert!(types.contains(&EventType::ClipStarted));
        assert!(types.contains(&EventType::ClipCompleted));
        assert!(types.contains(&EventType::ExecutionCompleted));
    }

    #[tokio::test]
    async fn test_mixed_outcome_is_partial() {
        let dir = tempfile::tempdir().unwrap();
        let bad = Path::new("/m/b.mov");
        let scheduler = scheduler_with(MockEngine::failing(&[bad]), dir.path());
        let job = make_job(dir.path(), &["/m/a.mov", "/m/b.mov"]);
        let job_id = job.id.clone();
        scheduler.attach_job(job);

        scheduler.start_execution().unwrap();
        scheduler.wait_for_current_job().await;

        let job = scheduler.get_job(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Partial);
        assert_eq!(job.tasks[0].status, TaskStatus::Completed);
        assert_eq!(job.tasks[1].status, TaskStatus::Failed);
        assert!(job.tasks[1]
            .failure_reason
            .as_deref()
            .unwrap()
            .starts_with("execution.engine_failure"));
    }

    #[tokio::test]
    async fn test_all_failed_is_failed() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler_with(
            MockEngine::failing(&[Path::new("/m/a.mov")]),
            dir.path(),
        );
        let job = make_job(dir.path(), &["/m/a.mov"]);
        let job_id = job.id.clone();
        scheduler.attach_job(job);

        scheduler.start_execution().unwrap();
        scheduler.wait_for_current_job().await;

        assert_eq!(scheduler.get_job(&job_id).unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_start_execution_requires_pending() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler_with(MockEngine::ok(), dir.path());
        assert!(matches!(
            scheduler.start_execution(),
            Err(EngineError::NothingPending)
        ));
    }

    #[tokio::test]
    async fn test_fifo_order_with_id_tie_break() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler_with(MockEngine::ok(), dir.path());

        let mut first = make_job(dir.path(), &["/m/a.mov"]);
        let mut second = make_job(dir.path(), &["/m/b.mov"]);
        // Force identical creation instants so the id breaks the tie.
        let instant = chrono::Utc::now();
        first.created_at = instant;
        second.created_at = instant;
        let (lo, hi) = if first.id < second.id {
            (first.id.clone(), second.id.clone())
        } else {
            (second.id.clone(), first.id.clone())
        };
        scheduler.attach_job(first);
        scheduler.attach_job(second);

        let started = scheduler.start_execution().unwrap();
        assert_eq!(started, lo);
        scheduler.wait_for_current_job().await;
        let started = scheduler.start_execution().unwrap();
        assert_eq!(started, hi);
        scheduler.wait_for_current_job().await;
    }

    #[tokio::test]
    async fn test_second_start_rejected_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = Path::new("/m/a.mov");
        let scheduler = scheduler_with(MockEngine::blocking(&[blocker]), dir.path());
        let job = make_job(dir.path(), &["/m/a.mov"]);
        let job_id = job.id.clone();
        scheduler.attach_job(job);
        let other = make_job(dir.path(), &["/m/b.mov"]);
        scheduler.attach_job(other);

        scheduler.start_execution().unwrap();
        assert!(matches!(
            scheduler.start_execution(),
            Err(EngineError::JobAlreadyRunning(_))
        ));

        scheduler.cancel_job(&job_id, "test teardown").unwrap();
        scheduler.wait_for_current_job().await;
    }

    #[tokio::test]
    async fn test_cancel_running_job_skips_remaining() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = Path::new("/m/a.mov");
        let scheduler = scheduler_with(MockEngine::blocking(&[blocker]), dir.path());
        let job = make_job(dir.path(), &["/m/a.mov", "/m/b.mov"]);
        let job_id = job.id.clone();
        scheduler.attach_job(job);

        scheduler.start_execution().unwrap();
        scheduler.cancel_job(&job_id, "operator cancel").unwrap();
        // Idempotent while running and after terminal.
        scheduler.cancel_job(&job_id, "operator cancel").unwrap();
        scheduler.wait_for_current_job().await;
        scheduler.cancel_job(&job_id, "again").unwrap();

        let job = scheduler.get_job(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.tasks[0].status, TaskStatus::Skipped);
        assert_eq!(job.tasks[1].status, TaskStatus::Skipped);
        assert!(job
            .timeline
            .iter()
            .any(|e| e.event_type == EventType::ExecutionCancelled));
    }

    #[tokio::test]
    async fn test_cancel_pending_job_directly() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler_with(MockEngine::ok(), dir.path());
        let job = make_job(dir.path(), &["/m/a.mov"]);
        let job_id = job.id.clone();
        scheduler.attach_job(job);

        scheduler.cancel_job(&job_id, "not needed").unwrap();
        let job = scheduler.get_job(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.tasks[0].status, TaskStatus::Skipped);
    }

    #[tokio::test]
    async fn test_clear_terminal_keeps_pending() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler_with(MockEngine::ok(), dir.path());

        let done = make_job(dir.path(), &["/m/a.mov"]);
        let done_id = done.id.clone();
        scheduler.attach_job(done);
        scheduler.start_execution().unwrap();
        scheduler.wait_for_current_job().await;

        let pending = make_job(dir.path(), &["/m/b.mov"]);
        let pending_id = pending.id.clone();
        scheduler.attach_job(pending);

        let removed = scheduler.clear_terminal_jobs().unwrap();
        assert_eq!(removed, 1);
        assert!(scheduler.get_job(&done_id).is_none());
        assert!(scheduler.get_job(&pending_id).is_some());
    }

    #[tokio::test]
    async fn test_progress_written_only_from_samples() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler_with(MockEngine::ok(), dir.path());
        let job = make_job(dir.path(), &["/m/a.mov"]);
        let job_id = job.id.clone();
        scheduler.attach_job(job);

        scheduler.start_execution().unwrap();
        scheduler.wait_for_current_job().await;

        let job = scheduler.get_job(&job_id).unwrap();
        // The mock reported 50% once; completion then pins 100.
        assert_eq!(job.tasks[0].progress_percent, 100.0);
        assert!(job
            .timeline
            .iter()
            .any(|e| e.event_type == EventType::ProgressUpdate));
    }
}
