//! Operator CLI: a thin dispatcher over the lifecycle core.
//!
//! No execution logic lives here. Errors surface verbatim; there are no
//! retries, no prompts, no hidden environment inference.
//!
//! Exit codes:
//!   0  success (job completed, or validation passed)
//!   1  validation error
//!   2  execution error
//!   3  partial completion
//!   4  system error (file not found, bad JSON, store failure)

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use forge_engine::heartbeat::local_worker_id;
use forge_engine::validator::settings_from_jobspec;
use forge_engine::{
    recover_interrupted_jobs, CreateJobRequest, EngineConfig, FfprobeProber, IngestionService,
    LicenseEnforcer, Scheduler, WatchFolderEngine,
};
use forge_media::{check_resolve_availability, EncodeEngine, FfmpegAdapter, ResolveAdapter};
use forge_models::{Job, JobSpec, JobStatus, WatchFolder};
use forge_store::Store;

const EXIT_OK: u8 = 0;
const EXIT_VALIDATION: u8 = 1;
const EXIT_EXECUTION: u8 = 2;
const EXIT_PARTIAL: u8 = 3;
const EXIT_SYSTEM: u8 = 4;

#[derive(Parser)]
#[command(name = "forge", about = "Deterministic media proxy generation", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a JobSpec JSON file without executing it.
    Validate {
        /// Path to the JobSpec JSON file.
        jobspec: PathBuf,
    },
    /// Execute a JobSpec JSON file.
    Run {
        /// Path to the JobSpec JSON file.
        jobspec: PathBuf,
    },
    /// Run watch-folder mode over a directory.
    Watch {
        /// Directory to watch.
        folder: PathBuf,
        /// Poll interval in seconds.
        #[arg(long)]
        poll_seconds: Option<u64>,
        /// Maximum concurrent jobs.
        #[arg(long, default_value_t = 1)]
        max_workers: usize,
        /// Process pending files once and exit.
        #[arg(long)]
        once: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Command::Validate { jobspec } => cmd_validate(&jobspec),
        Command::Run { jobspec } => cmd_run(&jobspec).await,
        Command::Watch {
            folder,
            poll_seconds,
            max_workers,
            once,
        } => cmd_watch(&folder, poll_seconds, max_workers, once).await,
    };
    ExitCode::from(code)
}

fn load_jobspec(path: &PathBuf) -> Result<JobSpec, u8> {
    if !path.exists() {
        eprintln!("ERROR: JobSpec file not found: {}", path.display());
        return Err(EXIT_SYSTEM);
    }
    let contents = std::fs::read_to_string(path).map_err(|err| {
        eprintln!("ERROR: cannot read {}: {err}", path.display());
        EXIT_SYSTEM
    })?;
    JobSpec::from_json(&contents).map_err(|err| {
        eprintln!("ERROR: invalid JobSpec in {}: {err}", path.display());
        EXIT_SYSTEM
    })
}

fn cmd_validate(path: &PathBuf) -> u8 {
    let spec = match load_jobspec(path) {
        Ok(spec) => spec,
        Err(code) => return code,
    };

    let settings = match settings_from_jobspec(&spec) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("JobSpec validation failed: {err}");
            return EXIT_VALIDATION;
        }
    };
    if let Err(err) = forge_engine::validator::validate_sources(&spec.sources) {
        eprintln!("JobSpec validation failed: {err}");
        return EXIT_VALIDATION;
    }
    if let Err(err) = forge_engine::validator::validate_output_dir(&settings.output_dir) {
        eprintln!("JobSpec validation failed: {err}");
        return EXIT_VALIDATION;
    }
    if let Err(err) = forge_engine::validator::validate_naming_template(
        &settings.file.naming_template,
        spec.sources.len(),
    ) {
        eprintln!("JobSpec validation failed: {err}");
        return EXIT_VALIDATION;
    }

    println!("JobSpec is valid: {}", path.display());
    println!("  sources: {}", spec.sources.len());
    println!("  output: {}", settings.output_dir.display());
    println!("  profile: {}", spec.proxy_profile);
    EXIT_OK
}

async fn cmd_run(path: &PathBuf) -> u8 {
    let spec = match load_jobspec(path) {
        Ok(spec) => spec,
        Err(code) => return code,
    };
    let settings = match settings_from_jobspec(&spec) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("JobSpec validation failed: {err}");
            return EXIT_VALIDATION;
        }
    };

    let config = EngineConfig::from_env();
    let store = match Store::open(&config.db_path) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            eprintln!("ERROR: cannot open store: {err}");
            return EXIT_SYSTEM;
        }
    };
    let recovered = match recover_interrupted_jobs(&store) {
        Ok(jobs) => jobs,
        Err(err) => {
            eprintln!("ERROR: startup recovery failed: {err}");
            return EXIT_SYSTEM;
        }
    };

    let license = forge_engine::resolve_license().clone();
    let enforcer = Arc::new(LicenseEnforcer::new(license));

    let mut engines: Vec<Arc<dyn EncodeEngine>> = vec![Arc::new(FfmpegAdapter::new())];
    let availability = check_resolve_availability().await;
    if let Some(adapter) = ResolveAdapter::new(&availability) {
        engines.push(Arc::new(adapter));
    }

    let scheduler = Scheduler::new(
        Arc::clone(&store),
        config,
        enforcer,
        local_worker_id("cli"),
        engines,
    );
    for job in recovered {
        scheduler.attach_job(job);
    }

    let ingestion = IngestionService::new(Arc::clone(&store), Arc::new(FfprobeProber));
    let request = CreateJobRequest {
        source_paths: spec.sources.clone(),
        settings: Some(settings),
        profile: Some(spec.proxy_profile.clone()),
        resolve_preset: spec.resolve_preset.clone(),
        requires_resolve_edition: spec.requires_resolve_edition,
        ..Default::default()
    };

    let job = match ingestion.create_job(request).await {
        Ok(job) => job,
        Err(err) => {
            eprintln!("Job creation failed: {err}");
            return match err {
                forge_engine::EngineError::Validation(_) => EXIT_VALIDATION,
                _ => EXIT_SYSTEM,
            };
        }
    };
    scheduler.attach_job(job.clone());

    // Resolve gating can finish a job at ingest (unavailable or edition
    // mismatch); report honestly without invoking any engine.
    let final_job = if job.status == JobStatus::Pending {
        if let Err(err) = scheduler.start_job(&job.id) {
            eprintln!("Execution refused: {err}");
            return EXIT_EXECUTION;
        }
        scheduler.wait_for_current_job().await;
        scheduler.get_job(&job.id).unwrap_or(job)
    } else {
        job
    };

    println!("{}", render_result(&final_job));

    match final_job.status {
        JobStatus::Completed => EXIT_OK,
        JobStatus::Partial => EXIT_PARTIAL,
        // A skip is a policy outcome, not a failure.
        JobStatus::Skipped => EXIT_OK,
        _ => EXIT_EXECUTION,
    }
}

fn render_result(job: &Job) -> String {
    let tasks: Vec<serde_json::Value> = job
        .tasks
        .iter()
        .map(|task| {
            serde_json::json!({
                "source": task.source_path,
                "output": task.output_path,
                "status": task.status.as_str(),
                "failure_reason": task.failure_reason,
                "warnings": task.warnings,
            })
        })
        .collect();
    serde_json::json!({
        "job_id": job.id.as_str(),
        "status": job.status.as_str(),
        "failure_reason": job.failure_reason,
        "skip_metadata": job.skip_metadata,
        "tasks": tasks,
    })
    .to_string()
}

async fn cmd_watch(
    folder: &PathBuf,
    poll_seconds: Option<u64>,
    max_workers: usize,
    once: bool,
) -> u8 {
    if !folder.is_dir() {
        eprintln!("ERROR: watch folder is not a directory: {}", folder.display());
        return EXIT_VALIDATION;
    }
    if let Some(poll) = poll_seconds {
        if poll == 0 {
            eprintln!("ERROR: --poll-seconds must be positive");
            return EXIT_VALIDATION;
        }
    }
    if max_workers == 0 {
        eprintln!("ERROR: --max-workers must be positive");
        return EXIT_VALIDATION;
    }

    let mut config = EngineConfig::from_env();
    config.max_concurrent_jobs = max_workers;
    if let Some(poll) = poll_seconds {
        config.watch_poll_interval = std::time::Duration::from_secs(poll);
    }

    let store = match Store::open(&config.db_path) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            eprintln!("ERROR: cannot open store: {err}");
            return EXIT_SYSTEM;
        }
    };
    if let Err(err) = recover_interrupted_jobs(&store) {
        eprintln!("ERROR: startup recovery failed: {err}");
        return EXIT_SYSTEM;
    }

    // Register (or refresh) the folder; watch mode enables it for this run.
    let existing = store
        .load_all_watch_folders()
        .ok()
        .and_then(|folders| folders.into_iter().find(|f| &f.path == folder));
    let watch_folder = existing.unwrap_or_else(|| {
        let mut wf = WatchFolder::new(folder.clone());
        wf.recursive = true;
        wf
    });
    if let Err(err) = store.save_watch_folder(&watch_folder) {
        eprintln!("ERROR: cannot register watch folder: {err}");
        return EXIT_SYSTEM;
    }

    let license = forge_engine::resolve_license().clone();
    let enforcer = Arc::new(LicenseEnforcer::new(license));
    let mut engines: Vec<Arc<dyn EncodeEngine>> = vec![Arc::new(FfmpegAdapter::new())];
    let availability = check_resolve_availability().await;
    if let Some(adapter) = ResolveAdapter::new(&availability) {
        engines.push(Arc::new(adapter));
    }
    let scheduler = Scheduler::new(
        Arc::clone(&store),
        config.clone(),
        enforcer,
        local_worker_id("watch"),
        engines,
    );
    let ingestion = Arc::new(IngestionService::new(
        Arc::clone(&store),
        Arc::new(FfprobeProber),
    ));
    let engine = WatchFolderEngine::new(
        Arc::clone(&store),
        ingestion,
        scheduler,
        config.clone(),
    );

    println!(
        "Watching {} (poll every {:?}{})",
        folder.display(),
        config.watch_poll_interval,
        if once { ", single pass" } else { "" }
    );

    loop {
        match engine.poll_once().await {
            Ok(created) if !created.is_empty() => {
                for job in &created {
                    println!("created job {} ({} clip)", job.id, job.tasks.len());
                }
            }
            Ok(_) => {}
            Err(err) => eprintln!("WARN: poll failed: {err}"),
        }

        if once {
            return EXIT_OK;
        }

        tokio::select! {
            _ = tokio::time::sleep(config.watch_poll_interval) => {}
            _ = tokio::signal::ctrl_c() => {
                println!("\nWatch mode stopped.");
                return EXIT_OK;
            }
        }
    }
}
