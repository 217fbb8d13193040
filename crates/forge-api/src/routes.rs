//! Route table.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{control, monitor};
use crate::state::AppState;

/// Create the HTTP router: mutating `/control` plus read-only `/monitor`.
pub fn create_router(state: AppState) -> Router {
    let control_routes = Router::new()
        .route("/jobs/create", post(control::create_job))
        .route("/jobs/start-execution", post(control::start_execution))
        .route("/jobs/clear-all", post(control::clear_all))
        .route("/jobs/:id/start", post(control::start_job))
        .route("/jobs/:id/pause", post(control::pause_job))
        .route("/jobs/:id/resume", post(control::resume_job))
        .route("/jobs/:id/cancel", post(control::cancel_job));

    let monitor_routes = Router::new()
        .route("/health", get(monitor::health))
        .route("/jobs", get(monitor::list_jobs))
        .route("/jobs/:id", get(monitor::get_job))
        .route("/jobs/:id/reports", get(monitor::get_reports))
        .route("/workers", get(monitor::list_workers))
        .layer(TimeoutLayer::new(state.config.request_timeout));

    Router::new()
        .nest("/control", control_routes)
        .nest("/monitor", monitor_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
