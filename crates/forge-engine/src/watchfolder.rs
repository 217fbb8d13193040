//! Watch-folder engine: periodic scan → stability → dedupe → ingest.
//!
//! Creates jobs in Pending state only; auto-execution is a separate,
//! explicitly gated concern. Warn-and-continue semantics apply across
//! folders and files: one bad folder or clip never blocks the rest.

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use forge_models::{Job, WatchFolder};
use forge_store::Store;

use crate::automation::try_auto_execute;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::ingest::{CreateJobRequest, IngestionService};
use crate::scanner::scan_folder;
use crate::scheduler::Scheduler;
use crate::stability::StabilityChecker;

/// Orchestrates unattended ingestion across all enabled watch folders.
pub struct WatchFolderEngine {
    store: Arc<Store>,
    ingestion: Arc<IngestionService>,
    scheduler: Scheduler,
    config: EngineConfig,
    stability: Mutex<StabilityChecker>,
}

impl WatchFolderEngine {
    pub fn new(
        store: Arc<Store>,
        ingestion: Arc<IngestionService>,
        scheduler: Scheduler,
        config: EngineConfig,
    ) -> Self {
        let stability = StabilityChecker::new(
            config.stability_min_age,
            config.stability_required_checks,
        );
        Self {
            store,
            ingestion,
            scheduler,
            config,
            stability: Mutex::new(stability),
        }
    }

    /// One poll pass over every enabled watch folder.
    ///
    /// Returns newly created jobs. Individual folder failures are logged and
    /// skipped.
    pub async fn poll_once(&self) -> EngineResult<Vec<Job>> {
        let folders = self.store.load_all_watch_folders()?;
        let mut created = Vec::new();

        for folder in folders.iter().filter(|f| f.enabled) {
            if !folder.path.is_dir() {
                warn!(folder_id = %folder.id, "watch folder path missing: {}", folder.path.display());
                continue;
            }
            match self.poll_folder(folder).await {
                Ok(jobs) => created.extend(jobs),
                Err(err) => {
                    warn!(folder_id = %folder.id, "watch folder scan failed: {err}");
                }
            }
        }

        Ok(created)
    }

    async fn poll_folder(&self, folder: &WatchFolder) -> EngineResult<Vec<Job>> {
        let candidates = scan_folder(folder);
        debug!(
            folder_id = %folder.id,
            candidates = candidates.len(),
            "watch folder scanned"
        );

        // Proxies land in a hidden subdirectory so the scanner never
        // re-ingests them (hidden entries are excluded from scans).
        let output_dir = folder.path.join(".proxies");
        if !output_dir.is_dir() {
            std::fs::create_dir_all(&output_dir).map_err(|err| {
                forge_store::StoreError::corrupt(format!(
                    "cannot create proxy output dir {}: {err}",
                    output_dir.display()
                ))
            })?;
        }

        let mut created = Vec::new();
        for path in candidates {
            // Dedupe first: a path already in the ledger is never re-checked.
            if self.store.is_file_processed(&path)? {
                continue;
            }

            let verdict = {
                let mut stability = self.stability.lock().expect("stability mutex poisoned");
                stability.check(&path)
            };
            if !verdict.is_stable {
                debug!(
                    "not yet stable: {} ({})",
                    path.display(),
                    verdict.reason.as_deref().unwrap_or("unknown")
                );
                continue;
            }

            // Folders without a bound preset ingest with the default
            // viewing-copy profile; binding a preset overrides it.
            let profile = folder
                .preset_id
                .clone()
                .unwrap_or_else(|| "proxy_h264_low".to_string());
            let request = CreateJobRequest {
                source_paths: vec![path.clone()],
                profile: Some(profile),
                settings: None,
                output_dir: Some(output_dir.clone()),
                ..Default::default()
            };

            match self.ingestion.create_job(request).await {
                Ok(job) => {
                    self.store.save_processed_file(&folder.id, &path)?;
                    self.stability
                        .lock()
                        .expect("stability mutex poisoned")
                        .reset(&path);
                    info!(
                        job_id = %job.id,
                        folder_id = %folder.id,
                        "created job for {}",
                        path.display()
                    );

                    self.scheduler.attach_job(job.clone());
                    // Never auto-runs unless the folder explicitly opts in
                    // and the safety gate passes.
                    try_auto_execute(&job, folder, &self.scheduler, &self.config);
                    created.push(job);
                }
                Err(err) => {
                    warn!("failed to create job for {}: {err}", path.display());
                    continue;
                }
            }
        }

        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::StaticProber;
    use crate::license::LicenseEnforcer;
    use forge_models::{JobStatus, License, LicenseTier};
    use std::path::Path;
    use std::time::Duration;

    fn engine(dir: &Path, folder: &WatchFolder) -> WatchFolderEngine {
        let store = Arc::new(Store::open(dir.join("forge.db")).unwrap());
        store.save_watch_folder(folder).unwrap();
        let ingestion = Arc::new(IngestionService::new(
            Arc::clone(&store),
            Arc::new(StaticProber),
        ));
        let scheduler = Scheduler::new(
            Arc::clone(&store),
            EngineConfig::default(),
            Arc::new(LicenseEnforcer::new(License::for_tier(
                LicenseTier::Facility,
                None,
            ))),
            "test-host-main",
            vec![],
        );
        let config = EngineConfig {
            stability_min_age: Duration::ZERO,
            stability_required_checks: 3,
            ..EngineConfig::default()
        };
        WatchFolderEngine::new(store, ingestion, scheduler, config)
    }

    #[tokio::test]
    async fn test_job_created_only_after_stability() {
        let dir = tempfile::tempdir().unwrap();
        let ingest_dir = dir.path().join("ingest");
        std::fs::create_dir(&ingest_dir).unwrap();
        let folder = WatchFolder::new(ingest_dir.clone());
        let engine = engine(dir.path(), &folder);

        std::fs::write(ingest_dir.join("a.mov"), vec![0u8; 2048]).unwrap();

        // Checks 1 and 2: not yet stable, no job.
        assert!(engine.poll_once().await.unwrap().is_empty());
        assert!(engine.poll_once().await.unwrap().is_empty());

        // Check 3: stable, exactly one pending job.
        let created = engine.poll_once().await.unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].status, JobStatus::Pending);

        // Repeated polls never re-ingest.
        assert!(engine.poll_once().await.unwrap().is_empty());
        assert!(engine.poll_once().await.unwrap().is_empty());
        assert_eq!(engine.store.load_processed_files(None).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_size_growth_defers_ingestion() {
        let dir = tempfile::tempdir().unwrap();
        let ingest_dir = dir.path().join("ingest");
        std::fs::create_dir(&ingest_dir).unwrap();
        let folder = WatchFolder::new(ingest_dir.clone());
        let engine = engine(dir.path(), &folder);

        let file = ingest_dir.join("copying.mov");
        std::fs::write(&file, vec![0u8; 1024]).unwrap();
        engine.poll_once().await.unwrap();
        engine.poll_once().await.unwrap();

        // Still copying: the counter resets.
        std::fs::write(&file, vec![0u8; 8192]).unwrap();
        assert!(engine.poll_once().await.unwrap().is_empty());
        assert!(engine.poll_once().await.unwrap().is_empty());

        let created = engine.poll_once().await.unwrap();
        assert_eq!(created.len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_folder_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let ingest_dir = dir.path().join("ingest");
        std::fs::create_dir(&ingest_dir).unwrap();
        let mut folder = WatchFolder::new(ingest_dir.clone());
        folder.enabled = false;
        let engine = engine(dir.path(), &folder);

        std::fs::write(ingest_dir.join("a.mov"), vec![0u8; 1024]).unwrap();
        for _ in 0..5 {
            assert!(engine.poll_once().await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_bad_file_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let ingest_dir = dir.path().join("ingest");
        std::fs::create_dir(&ingest_dir).unwrap();
        let folder = WatchFolder::new(ingest_dir.clone());
        let engine = engine(dir.path(), &folder);

        // .avi probes to mjpeg which the matrix refuses; .mov sails through.
        std::fs::write(ingest_dir.join("bad.avi"), vec![0u8; 1024]).unwrap();
        std::fs::write(ingest_dir.join("good.mov"), vec![0u8; 1024]).unwrap();

        engine.poll_once().await.unwrap();
        engine.poll_once().await.unwrap();
        let created = engine.poll_once().await.unwrap();

        assert_eq!(created.len(), 1);
        assert!(created[0].tasks[0].source_path.ends_with("good.mov"));
        // The refused file is retried next pass (not in the ledger), and
        // still does not block the good one.
        assert_eq!(engine.store.load_processed_files(None).unwrap().len(), 1);
    }
}
