//! Forge server binary: lifecycle core plus HTTP surfaces.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use forge_api::{create_router, ApiConfig, AppState};
use forge_engine::heartbeat::{local_hostname, local_worker_id};
use forge_engine::{
    recover_interrupted_jobs, EngineConfig, FfprobeProber, IngestionService, LicenseEnforcer,
    QueryLayer, Scheduler, WatchFolderEngine, WorkerRegistry,
};
use forge_media::{check_resolve_availability, EncodeEngine, FfmpegAdapter, ResolveAdapter};
use forge_store::Store;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);
    let env_filter = EnvFilter::from_default_env().add_directive("forge=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting forge-server");

    let api_config = ApiConfig::from_env();
    let engine_config = EngineConfig::from_env();

    let store = match Store::open(&engine_config.db_path) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            error!("failed to open store at {}: {err}", engine_config.db_path.display());
            std::process::exit(1);
        }
    };

    // Recovery runs once, before anything can dispatch: interrupted jobs
    // fail, nothing resumes.
    let recovered_jobs = match recover_interrupted_jobs(&store) {
        Ok(jobs) => jobs,
        Err(err) => {
            error!("startup recovery failed: {err}");
            std::process::exit(1);
        }
    };

    let license = forge_engine::resolve_license().clone();
    info!("{license}");
    let enforcer = Arc::new(LicenseEnforcer::new(license));
    let workers = Arc::new(WorkerRegistry::new(
        Arc::clone(&enforcer),
        engine_config.worker_offline_threshold_secs,
    ));
    let worker_id = local_worker_id("main");

    // Engine adapters available to this process. Resolve is probed once at
    // startup; jobs needing it while it is absent fail explicitly.
    let mut engines: Vec<Arc<dyn EncodeEngine>> = vec![Arc::new(FfmpegAdapter::new())];
    if api_config.resolve_enabled {
        let availability = check_resolve_availability().await;
        match ResolveAdapter::new(&availability) {
            Some(adapter) => {
                info!("Resolve available (version {:?})", availability.version);
                engines.push(Arc::new(adapter));
            }
            None => warn!(
                "Resolve not available: {}",
                availability.reason.as_deref().unwrap_or("unknown")
            ),
        }
    }

    let scheduler = Scheduler::new(
        Arc::clone(&store),
        engine_config.clone(),
        Arc::clone(&enforcer),
        worker_id.clone(),
        engines,
    );
    for job in recovered_jobs {
        scheduler.attach_job(job);
    }

    let ingestion = Arc::new(IngestionService::new(
        Arc::clone(&store),
        Arc::new(FfprobeProber),
    ));
    let query = QueryLayer::new(scheduler.clone(), Arc::new(engine_config.clone()));

    // Heartbeat emitter for this process's worker, plus stale purge.
    {
        let workers = Arc::clone(&workers);
        let scheduler = scheduler.clone();
        let worker_id = worker_id.clone();
        let interval = engine_config.heartbeat_interval;
        tokio::spawn(async move {
            let hostname = local_hostname();
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let current = scheduler
                    .snapshot_jobs()
                    .iter()
                    .find(|j| j.status == forge_models::JobStatus::Running)
                    .map(|j| j.id.clone());
                workers.heartbeat(&worker_id, &hostname, current);
                workers.purge_stale();
            }
        });
    }

    // Watch-folder poll loop.
    {
        let watch = WatchFolderEngine::new(
            Arc::clone(&store),
            Arc::clone(&ingestion),
            scheduler.clone(),
            engine_config.clone(),
        );
        let interval = engine_config.watch_poll_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(err) = watch.poll_once().await {
                    warn!("watch folder poll failed: {err}");
                }
            }
        });
    }

    let state = AppState::new(
        api_config.clone(),
        ingestion,
        scheduler,
        query,
        Arc::clone(&workers),
    );
    let app = create_router(state);

    if api_config.is_lan_exposed() {
        warn!("LAN exposure is enabled: anyone on the network can view job data");
    }

    let addr: SocketAddr = format!("{}:{}", api_config.host, api_config.port)
        .parse()
        .expect("invalid bind address");
    info!("Listening on {addr}");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {addr}: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("server error: {err}");
    }

    workers.deregister(&worker_id);
    info!("Server shutdown complete");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C handler");
    info!("Received shutdown signal");
}
