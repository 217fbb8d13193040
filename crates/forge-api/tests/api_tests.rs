//! In-process HTTP tests over the full router.

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::util::ServiceExt;

use forge_api::{create_router, ApiConfig, AppState};
use forge_engine::{
    EngineConfig, IngestionService, LicenseEnforcer, QueryLayer, Scheduler, StaticProber,
    WorkerRegistry,
};
use forge_models::{License, LicenseTier};
use forge_store::Store;

fn test_app(dir: &Path, api_config: ApiConfig) -> Router {
    let store = Arc::new(Store::open(dir.join("forge.db")).unwrap());
    let enforcer = Arc::new(LicenseEnforcer::new(License::for_tier(
        LicenseTier::Facility,
        None,
    )));
    let engine_config = EngineConfig {
        reports_dir: dir.to_path_buf(),
        ..EngineConfig::default()
    };
    let scheduler = Scheduler::new(
        Arc::clone(&store),
        engine_config.clone(),
        Arc::clone(&enforcer),
        "test-host-main",
        vec![],
    );
    let ingestion = Arc::new(IngestionService::new(
        Arc::clone(&store),
        Arc::new(StaticProber),
    ));
    let query = QueryLayer::new(scheduler.clone(), Arc::new(engine_config));
    let workers = Arc::new(WorkerRegistry::new(enforcer, 60));
    create_router(AppState::new(api_config, ingestion, scheduler, query, workers))
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn create_body(dir: &Path, sources: Vec<String>) -> serde_json::Value {
    serde_json::json!({
        "source_paths": sources,
        "engine": null,
        "deliver_settings": {
            "output_dir": dir.join("out").to_string_lossy(),
            "video": {"codec": "h264"},
            "audio": {"codec": "aac"},
            "file": {
                "container": "mp4",
                "naming_template": "{source_name}_proxy"
            }
        }
    })
}

#[tokio::test]
async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path(), ApiConfig::default());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/monitor/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_create_then_list() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("out")).unwrap();
    let source = dir.path().join("a.mp4");
    std::fs::write(&source, b"media").unwrap();

    let app = test_app(dir.path(), ApiConfig::default());

    let response = app
        .clone()
        .oneshot(post_json(
            "/control/jobs/create",
            create_body(dir.path(), vec![source.to_string_lossy().to_string()]),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    let job_id = created["job_id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/monitor/jobs")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listed = body_json(response).await;
    assert_eq!(listed["total_count"], 1);
    assert_eq!(listed["jobs"][0]["id"], job_id.as_str());
    assert_eq!(listed["jobs"][0]["status"], "pending");

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/monitor/jobs/{job_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let detail = body_json(response).await;
    assert_eq!(detail["tasks"].as_array().unwrap().len(), 1);
    assert_eq!(detail["settings_summary"]["codec"], "h264");
}

#[tokio::test]
async fn test_create_empty_sources_is_400_with_tag() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("out")).unwrap();
    let app = test_app(dir.path(), ApiConfig::default());

    let response = app
        .oneshot(post_json(
            "/control/jobs/create",
            create_body(dir.path(), vec![]),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "validation.source_missing_or_not_file");
}

#[tokio::test]
async fn test_create_unknown_field_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path(), ApiConfig::default());

    let mut body = create_body(dir.path(), vec![]);
    body["retry_policy"] = serde_json::json!("aggressive");

    let response = app
        .oneshot(post_json("/control/jobs/create", body))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_resolve_disabled_profile_is_501() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("out")).unwrap();
    let source = dir.path().join("a.r3d");
    std::fs::write(&source, b"raw").unwrap();

    let config = ApiConfig {
        resolve_enabled: false,
        ..ApiConfig::default()
    };
    let app = test_app(dir.path(), config);

    let mut body = create_body(dir.path(), vec![source.to_string_lossy().to_string()]);
    body["engine"] = serde_json::json!("resolve");

    let response = app
        .oneshot(post_json("/control/jobs/create", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn test_start_execution_empty_queue_is_400() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path(), ApiConfig::default());

    let response = app
        .oneshot(post_json(
            "/control/jobs/start-execution",
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_job_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path(), ApiConfig::default());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/monitor/jobs/no-such-job")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_pause_pending_job_is_400() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("out")).unwrap();
    let source = dir.path().join("a.mp4");
    std::fs::write(&source, b"media").unwrap();
    let app = test_app(dir.path(), ApiConfig::default());

    let response = app
        .clone()
        .oneshot(post_json(
            "/control/jobs/create",
            create_body(dir.path(), vec![source.to_string_lossy().to_string()]),
        ))
        .await
        .unwrap();
    let job_id = body_json(response).await["job_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .oneshot(post_json(
            &format!("/control/jobs/{job_id}/pause"),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_clear_all_spares_pending() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("out")).unwrap();
    let source = dir.path().join("a.mp4");
    std::fs::write(&source, b"media").unwrap();
    let app = test_app(dir.path(), ApiConfig::default());

    app.clone()
        .oneshot(post_json(
            "/control/jobs/create",
            create_body(dir.path(), vec![source.to_string_lossy().to_string()]),
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(post_json("/control/jobs/clear-all", serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["removed"], 0);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/monitor/jobs")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let listed = body_json(response).await;
    assert_eq!(listed["total_count"], 1);
}
