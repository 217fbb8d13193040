//! Ingestion service: the single authoritative entry for job creation.
//!
//! Contract: validate → snapshot settings → create job + tasks → persist
//! atomically. State on return is always Pending (or, for Resolve gating, a
//! terminal Failed/Skipped job); the ingestion service never starts
//! execution. On validation failure nothing is persisted.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use tracing::info;

use forge_media::{
    check_resolve_availability, edition_gate, find_profile, probe_media, resolve_output_path,
    validate_render_preset, MediaInfo,
};
use forge_models::{
    ClipTask, DeliverSettings, Engine, EventType, FailureTag, FileSettings, Job, JobStatus,
    ResolveEdition, TaskStatus, ValidationError,
};
use forge_store::Store;

use crate::error::{EngineError, EngineResult};
use crate::recorder::record_event;
use crate::validator;

/// A validated-or-rejected request to create one job.
#[derive(Debug, Clone, Default)]
pub struct CreateJobRequest {
    pub source_paths: Vec<PathBuf>,
    /// Inline deliver settings; mutually exclusive with `profile`.
    pub settings: Option<DeliverSettings>,
    /// Proxy-profile reference; mutually exclusive with `settings`.
    pub profile: Option<String>,
    /// Explicit engine override.
    pub engine: Option<Engine>,
    /// Output-directory override applied atop profile or settings.
    pub output_dir: Option<PathBuf>,
    pub resolve_preset: Option<String>,
    pub requires_resolve_edition: Option<ResolveEdition>,
}

/// Probes a source for routing and display metadata.
///
/// Abstracted so the lifecycle core is testable without ffprobe installed.
pub trait SourceProber: Send + Sync {
    fn probe<'a>(
        &'a self,
        path: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Option<MediaInfo>> + Send + 'a>>;
}

/// Production prober backed by ffprobe.
#[derive(Debug, Clone, Default)]
pub struct FfprobeProber;

impl SourceProber for FfprobeProber {
    fn probe<'a>(
        &'a self,
        path: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Option<MediaInfo>> + Send + 'a>> {
        Box::pin(async move { probe_media(path).await.ok() })
    }
}

/// Extension-driven prober for environments without ffprobe (tests, dry
/// runs). Maps well-known extensions to plausible stream codecs.
#[derive(Debug, Clone, Default)]
pub struct StaticProber;

impl StaticProber {
    fn codec_for(ext: &str) -> Option<&'static str> {
        match ext {
            "mov" => Some("prores"),
            "mp4" => Some("h264"),
            "mkv" => Some("h264"),
            "mxf" => Some("dnxhd"),
            "avi" => Some("mjpeg"),
            _ => None,
        }
    }
}

impl SourceProber for StaticProber {
    fn probe<'a>(
        &'a self,
        path: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Option<MediaInfo>> + Send + 'a>> {
        Box::pin(async move {
            let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
            let codec = Self::codec_for(&ext)?;
            Some(MediaInfo {
                duration: 10.0,
                width: 1920,
                height: 1080,
                fps: 25.0,
                codec: codec.to_string(),
                container: ext,
                audio_channels: Some("stereo".to_string()),
                color_space: None,
                size: 1,
            })
        })
    }
}

/// The single entry point from the control surface and the watch-folder
/// engine.
pub struct IngestionService {
    store: Arc<Store>,
    prober: Arc<dyn SourceProber>,
}

impl IngestionService {
    pub fn new(store: Arc<Store>, prober: Arc<dyn SourceProber>) -> Self {
        Self { store, prober }
    }

    /// Validate the request and persist a new job with one task per source.
    ///
    /// Resolve-specific gating is the one place a terminal job can be
    /// returned: an unavailable Resolve persists a Failed job with zero
    /// tasks; an edition mismatch persists a Skipped job.
    pub async fn create_job(&self, request: CreateJobRequest) -> EngineResult<Job> {
        validator::validate_sources(&request.source_paths)?;

        // Resolve the settings snapshot from profile or inline settings.
        let profile = match &request.profile {
            Some(id) => Some(validator::require_profile(id)?),
            None => None,
        };
        let mut settings = match (&request.settings, profile) {
            (Some(settings), _) => settings.clone(),
            (None, Some(profile)) => DeliverSettings {
                output_dir: request.output_dir.clone().ok_or_else(|| {
                    ValidationError::new(
                        FailureTag::SourceMissingOrNotFile,
                        "profile-based jobs need an output directory",
                    )
                })?,
                video: forge_models::VideoSettings {
                    codec: profile.codec,
                },
                audio: forge_models::AudioSettings::default(),
                file: FileSettings {
                    container: profile.container,
                    naming_template: "{source_name}_proxy".to_string(),
                    prefix: None,
                    suffix: None,
                    preserve_source_dirs: false,
                    preserve_dir_levels: 0,
                },
                resolution: profile.resolution,
                fps: forge_models::FpsMode::Source,
                engine: Some(profile.engine),
            },
            (None, None) => {
                return Err(ValidationError::new(
                    FailureTag::SourceMissingOrNotFile,
                    "request needs either a proxy profile or inline deliver settings",
                )
                .into())
            }
        };
        if let Some(output_dir) = &request.output_dir {
            settings.output_dir = output_dir.clone();
        }

        validator::validate_output_dir(&settings.output_dir)?;
        validator::validate_naming_template(
            &settings.file.naming_template,
            request.source_paths.len(),
        )?;

        // Route every source; all clips of one job ride the same engine.
        let mut probed: Vec<(PathBuf, Option<MediaInfo>)> = Vec::new();
        let mut job_engine: Option<Engine> = request.engine.or(settings.engine);
        for source in &request.source_paths {
            let info = self.prober.probe(source).await;
            let routed = validator::route_source(source, info.as_ref())?;

            if let Some(profile) = profile {
                validator::validate_profile_engine(profile, routed)?;
            }
            match job_engine {
                None => job_engine = Some(routed),
                Some(engine) if engine == routed => {}
                Some(engine) => {
                    return Err(ValidationError::new(
                        FailureTag::SourceUnsupported,
                        format!(
                            "engine '{engine}' requested but {} routes to '{routed}'",
                            source.display()
                        ),
                    )
                    .into())
                }
            }
            probed.push((source.clone(), info));
        }
        let engine = job_engine.expect("at least one source was routed");
        settings.engine = Some(engine);

        // Resolve gating happens before any task is built. The availability
        // check runs exactly once per job; there are no retries.
        let mut availability = None;
        if engine == Engine::Resolve {
            let checked = check_resolve_availability().await;
            if !checked.available {
                let reason = checked
                    .reason
                    .unwrap_or_else(|| "Resolve unavailable".to_string());
                let mut job = Job::new(settings);
                record_event(&mut job, EventType::JobCreated, None, Some("0 clips".into()));
                job.failure_reason = Some(format!(
                    "{}: {reason}",
                    FailureTag::ResolveAvailability.as_str()
                ));
                let failure_reason = job.failure_reason.clone();
                record_event(
                    &mut job,
                    EventType::ExecutionFailed,
                    None,
                    failure_reason,
                );
                job.finish(JobStatus::Failed);
                self.store.save_job(&job)?;
                info!(job_id = %job.id, "job failed at ingest: Resolve unavailable");
                return Ok(job);
            }
            if let Some(preset) = &request.resolve_preset {
                validate_render_preset(preset, &checked.render_presets)?;
            }
            availability = Some(checked);
        }

        // Build the job with one task per source, output paths resolved
        // deterministically with collision avoidance within the job.
        let mut job = Job::new(settings);
        let mut planned: HashSet<PathBuf> = HashSet::new();
        for (index, (source, info)) in probed.iter().enumerate() {
            let output = resolve_output_path(&job.settings, source, index, &planned);
            planned.insert(output.clone());
            let mut task = ClipTask::new(job.id.clone(), source.clone(), output);
            task.metadata = info.as_ref().map(MediaInfo::to_metadata);
            job.tasks.push(task);
        }

        let clip_count_msg = Some(format!("{} clip(s)", job.tasks.len()));
        record_event(
            &mut job,
            EventType::JobCreated,
            None,
            clip_count_msg,
        );
        record_event(
            &mut job,
            EventType::EngineSelected,
            None,
            Some(engine.as_str().to_string()),
        );

        // Edition gating: an intentionally unmet precondition is a skip,
        // never a failure, and no engine is invoked.
        if let (Some(required), Some(availability)) =
            (request.requires_resolve_edition, availability.as_ref())
        {
            if let Some(skip) = edition_gate(required, availability) {
                for task in &mut job.tasks {
                    task.skip(skip.reason.clone());
                }
                job.skip_metadata = Some(skip);
                job.finish(JobStatus::Skipped);
                self.store.save_job(&job)?;
                info!(job_id = %job.id, "job skipped: Resolve edition mismatch");
                return Ok(job);
            }
        }

        debug_assert_eq!(job.status, JobStatus::Pending);
        debug_assert!(job.tasks.iter().all(|t| t.status == TaskStatus::Queued));

        self.store.save_job(&job)?;
        if let Some(profile) = profile {
            self.store.save_preset_binding(&job.id, profile.id)?;
        }
        info!(
            job_id = %job.id,
            clips = job.tasks.len(),
            engine = %engine,
            "job created"
        );
        Ok(job)
    }
}

/// Re-check that a profile id is resolvable (used by auto-execution gating).
pub fn profile_is_resolvable(id: &str) -> bool {
    find_profile(id).is_some()
}
