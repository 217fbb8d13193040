//! Auto-execution gating.
//!
//! Automation never guesses. A watch-folder job may only be auto-started
//! when auto-execution is explicitly enabled, a preset is bound and
//! resolvable, and the safety checks (free disk, concurrency) pass. Every
//! denial is logged with its reason.

use std::path::Path;

use tracing::warn;

use forge_models::{Job, JobStatus, WatchFolder};

use crate::config::EngineConfig;
use crate::ingest::profile_is_resolvable;
use crate::scheduler::Scheduler;

/// Why auto-execution was denied, for logs and operator visibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoExecDenial(pub String);

/// Check whether a freshly ingested watch-folder job may start
/// automatically. Side-effect free.
pub fn can_auto_execute(
    job: &Job,
    folder: &WatchFolder,
    scheduler: &Scheduler,
    config: &EngineConfig,
) -> Result<(), AutoExecDenial> {
    if !folder.auto_execute {
        return Err(AutoExecDenial("auto_execute is disabled".to_string()));
    }

    let Some(preset_id) = &folder.preset_id else {
        return Err(AutoExecDenial("no preset bound to watch folder".to_string()));
    };
    if !profile_is_resolvable(preset_id) {
        return Err(AutoExecDenial(format!(
            "preset '{preset_id}' is not resolvable"
        )));
    }

    if job.status != JobStatus::Pending {
        return Err(AutoExecDenial(format!(
            "job is not pending (current: {})",
            job.status
        )));
    }

    match free_disk_bytes(&job.settings.output_dir) {
        Ok(free) if free < config.min_free_disk_bytes => {
            return Err(AutoExecDenial(format!(
                "insufficient disk space: {:.1} GiB free (minimum: {:.1} GiB)",
                free as f64 / (1024.0 * 1024.0 * 1024.0),
                config.min_free_disk_bytes as f64 / (1024.0 * 1024.0 * 1024.0),
            )))
        }
        Ok(_) => {}
        Err(err) => {
            return Err(AutoExecDenial(format!("cannot check disk space: {err}")))
        }
    }

    let running = scheduler
        .snapshot_jobs()
        .iter()
        .filter(|j| matches!(j.status, JobStatus::Running | JobStatus::Paused))
        .count();
    if running >= config.max_concurrent_jobs {
        return Err(AutoExecDenial(format!(
            "concurrency limit reached: {running}/{} jobs running",
            config.max_concurrent_jobs
        )));
    }

    Ok(())
}

/// Attempt auto-execution; a denial is logged, never raised.
pub fn try_auto_execute(
    job: &Job,
    folder: &WatchFolder,
    scheduler: &Scheduler,
    config: &EngineConfig,
) -> bool {
    match can_auto_execute(job, folder, scheduler, config) {
        Ok(()) => match scheduler.start_job(&job.id) {
            Ok(()) => true,
            Err(err) => {
                warn!(job_id = %job.id, "auto-execution start refused: {err}");
                false
            }
        },
        Err(AutoExecDenial(reason)) => {
            warn!(job_id = %job.id, folder_id = %folder.id, "auto-execution denied: {reason}");
            false
        }
    }
}

fn free_disk_bytes(dir: &Path) -> std::io::Result<u64> {
    fs2::available_space(dir)
}
