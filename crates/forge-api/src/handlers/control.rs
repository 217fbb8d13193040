//! Control surface handlers.
//!
//! All request schemas are closed: unknown fields are rejected.

use std::path::PathBuf;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use forge_engine::CreateJobRequest;
use forge_models::{
    AudioCodec, AudioSettings, Container, DeliverSettings, Engine, FileSettings, FpsMode, JobId,
    ResolutionPolicy, VideoCodec, VideoSettings,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// ============================================================================
// Request/response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateJobBody {
    pub source_paths: Vec<PathBuf>,
    #[serde(default)]
    pub engine: Option<String>,
    pub deliver_settings: DeliverSettingsBody,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeliverSettingsBody {
    pub output_dir: PathBuf,
    pub video: VideoBody,
    pub audio: AudioBody,
    pub file: FileBody,
    #[serde(default)]
    pub resolution: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VideoBody {
    pub codec: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AudioBody {
    pub codec: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileBody {
    pub container: String,
    pub naming_template: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default)]
    pub preserve_source_dirs: Option<bool>,
    #[serde(default)]
    pub preserve_dir_levels: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub job_id: String,
}

#[derive(Debug, Serialize)]
pub struct StartExecutionResponse {
    pub job_id: String,
}

#[derive(Debug, Serialize)]
pub struct ClearAllResponse {
    pub removed: usize,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub ok: bool,
}

fn parse_settings(body: &DeliverSettingsBody) -> ApiResult<DeliverSettings> {
    let codec = VideoCodec::parse(&body.video.codec)
        .ok_or_else(|| ApiError::bad_request(format!("unknown codec '{}'", body.video.codec)))?;
    let audio = AudioCodec::parse(&body.audio.codec)
        .ok_or_else(|| ApiError::bad_request(format!("unknown audio codec '{}'", body.audio.codec)))?;
    let container = Container::parse(&body.file.container).ok_or_else(|| {
        ApiError::bad_request(format!("unknown container '{}'", body.file.container))
    })?;
    let resolution = match &body.resolution {
        None => ResolutionPolicy::Half,
        Some(raw) => ResolutionPolicy::parse(raw)
            .ok_or_else(|| ApiError::bad_request(format!("unknown resolution '{raw}'")))?,
    };

    Ok(DeliverSettings {
        output_dir: body.output_dir.clone(),
        video: VideoSettings { codec },
        audio: AudioSettings { codec: audio },
        file: FileSettings {
            container,
            naming_template: body.file.naming_template.clone(),
            prefix: body.file.prefix.clone(),
            suffix: body.file.suffix.clone(),
            preserve_source_dirs: body.file.preserve_source_dirs.unwrap_or(false),
            preserve_dir_levels: body.file.preserve_dir_levels.unwrap_or(0),
        },
        resolution,
        fps: FpsMode::Source,
        engine: None,
    })
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /control/jobs/create
pub async fn create_job(
    State(state): State<AppState>,
    Json(body): Json<CreateJobBody>,
) -> ApiResult<Json<CreateJobResponse>> {
    let engine = match body.engine.as_deref() {
        None => None,
        Some(raw) => Some(
            Engine::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown engine '{raw}'")))?,
        ),
    };

    if engine == Some(Engine::Resolve) && !state.config.resolve_enabled {
        return Err(ApiError::NotImplemented(
            "Resolve is not supported in this deployment profile".to_string(),
        ));
    }

    let settings = parse_settings(&body.deliver_settings)?;
    let job = state
        .ingestion
        .create_job(CreateJobRequest {
            source_paths: body.source_paths,
            settings: Some(settings),
            engine,
            ..Default::default()
        })
        .await?;

    info!(job_id = %job.id, "job created via control surface");
    let job_id = job.id.to_string();
    state.scheduler.attach_job(job);
    Ok(Json(CreateJobResponse { job_id }))
}

/// POST /control/jobs/start-execution — start the queue head.
pub async fn start_execution(
    State(state): State<AppState>,
) -> ApiResult<Json<StartExecutionResponse>> {
    let job_id = state.scheduler.start_execution()?;
    Ok(Json(StartExecutionResponse {
        job_id: job_id.to_string(),
    }))
}

/// POST /control/jobs/:id/start — start a specific pending job.
pub async fn start_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AckResponse>> {
    state.scheduler.start_job(&JobId::from_string(id))?;
    Ok(Json(AckResponse { ok: true }))
}

/// POST /control/jobs/:id/pause
pub async fn pause_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AckResponse>> {
    state.scheduler.pause_job(&JobId::from_string(id))?;
    Ok(Json(AckResponse { ok: true }))
}

/// POST /control/jobs/:id/resume
pub async fn resume_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AckResponse>> {
    state.scheduler.resume_job(&JobId::from_string(id))?;
    Ok(Json(AckResponse { ok: true }))
}

/// POST /control/jobs/:id/cancel
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AckResponse>> {
    state
        .scheduler
        .cancel_job(&JobId::from_string(id), "cancelled via control surface")?;
    Ok(Json(AckResponse { ok: true }))
}

/// POST /control/jobs/clear-all — removes terminal jobs only.
pub async fn clear_all(State(state): State<AppState>) -> ApiResult<Json<ClearAllResponse>> {
    let removed = state.scheduler.clear_terminal_jobs()?;
    Ok(Json(ClearAllResponse { removed }))
}
