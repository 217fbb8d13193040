//! Monitoring surface handlers. Strictly read-only.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use forge_engine::{JobDetail, JobSummary, ReportReference};
use forge_models::{JobId, WorkerStatus};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobSummary>,
    pub total_count: usize,
}

#[derive(Debug, Serialize)]
pub struct JobReportsResponse {
    pub job_id: String,
    pub reports: Vec<ReportReference>,
}

#[derive(Debug, Serialize)]
pub struct WorkerListResponse {
    pub workers: Vec<WorkerStatus>,
    pub count: usize,
}

/// GET /monitor/health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// GET /monitor/jobs — summaries, newest first.
pub async fn list_jobs(State(state): State<AppState>) -> Json<JobListResponse> {
    let jobs = state.query.list_jobs();
    let total_count = jobs.len();
    Json(JobListResponse { jobs, total_count })
}

/// GET /monitor/jobs/:id — full detail with tasks and timeline.
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobDetail>> {
    Ok(Json(state.query.get_job(&JobId::from_string(id))?))
}

/// GET /monitor/jobs/:id/reports — report artifacts, newest first.
pub async fn get_reports(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobReportsResponse>> {
    let job_id = JobId::from_string(id);
    let reports = state.query.get_reports(&job_id)?;
    Ok(Json(JobReportsResponse {
        job_id: job_id.to_string(),
        reports,
    }))
}

/// GET /monitor/workers — known workers with derived offline state.
pub async fn list_workers(State(state): State<AppState>) -> Json<WorkerListResponse> {
    let workers = state.workers.snapshot();
    let count = workers.len();
    Json(WorkerListResponse { workers, count })
}
