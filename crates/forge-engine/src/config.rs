//! Engine configuration.
//!
//! Plain environment-variable driven config, read once at startup. The
//! automation minima (free disk, concurrent jobs) default to the historical
//! policy but are configuration, not constants scattered through the code.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the lifecycle core.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the single-file SQLite store.
    pub db_path: PathBuf,
    /// Directory scanned for report artifacts.
    pub reports_dir: PathBuf,
    /// Minimum free disk space required before auto-execution.
    pub min_free_disk_bytes: u64,
    /// Cross-job concurrency cap (1 for Proxy v1).
    pub max_concurrent_jobs: usize,
    /// Per-job clip concurrency (1 for Proxy v1; the dispatch loop is the
    /// only place that reads this).
    pub clips_in_flight_per_job: usize,
    /// Watch-folder poll interval.
    pub watch_poll_interval: Duration,
    /// Minimum file age before stability checking starts.
    pub stability_min_age: Duration,
    /// Consecutive unchanged size observations required.
    pub stability_required_checks: u32,
    /// Heartbeat interval for this process's worker.
    pub heartbeat_interval: Duration,
    /// Seconds without a heartbeat before a worker shows offline.
    pub worker_offline_threshold_secs: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("forge.db"),
            reports_dir: PathBuf::from("."),
            min_free_disk_bytes: 10 * 1024 * 1024 * 1024,
            max_concurrent_jobs: 1,
            clips_in_flight_per_job: 1,
            watch_poll_interval: Duration::from_secs(15),
            stability_min_age: Duration::from_secs(10),
            stability_required_checks: 3,
            heartbeat_interval: Duration::from_secs(10),
            worker_offline_threshold_secs: 60,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            db_path: env_path("FORGE_DB_PATH").unwrap_or(defaults.db_path),
            reports_dir: env_path("FORGE_REPORTS_DIR").unwrap_or(defaults.reports_dir),
            min_free_disk_bytes: env_parse("FORGE_MIN_FREE_DISK_BYTES")
                .unwrap_or(defaults.min_free_disk_bytes),
            max_concurrent_jobs: env_parse("FORGE_MAX_CONCURRENT_JOBS")
                .unwrap_or(defaults.max_concurrent_jobs),
            clips_in_flight_per_job: defaults.clips_in_flight_per_job,
            watch_poll_interval: env_parse("FORGE_WATCH_POLL_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.watch_poll_interval),
            stability_min_age: env_parse("FORGE_STABILITY_MIN_AGE_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.stability_min_age),
            stability_required_checks: env_parse("FORGE_STABILITY_CHECKS")
                .unwrap_or(defaults.stability_required_checks),
            heartbeat_interval: defaults.heartbeat_interval,
            worker_offline_threshold_secs: env_parse("FORGE_WORKER_OFFLINE_SECONDS")
                .unwrap_or(defaults.worker_offline_threshold_secs),
        }
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().map(PathBuf::from)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
