//! The persistence store.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use forge_models::{
    ClipTask, DeliveryStage, EventType, ExecutionEvent, Job, JobId, JobStatus, ProcessedFile,
    TaskId, TaskStatus, WatchFolder, WatchFolderId,
};

use crate::error::{StoreError, StoreResult};
use crate::schema;

/// Durable state for jobs, tasks, bindings, watch folders, processed files
/// and execution events.
///
/// All mutating operations are single-transaction. One writer at a time is
/// sufficient: the scheduler is the only writer for job/task mutations and
/// serialises through the internal mutex; WAL mode keeps readers
/// non-blocking with respect to the writer.
pub struct Store {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl Store {
    /// Open (creating if needed) the store at `path` and migrate forward.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::ensure_schema(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Job persistence

    /// Save or update a job, its tasks and its timeline in one transaction.
    ///
    /// Tasks are replaced wholesale; timeline events are insert-only (an
    /// already-recorded event_id is never rewritten).
    pub fn save_job(&self, job: &Job) -> StoreResult<()> {
        let mut conn = self.conn.lock().expect("store mutex poisoned");
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO jobs (id, created_at, started_at, completed_at, status,
                               settings_json, failure_reason, skip_metadata_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                 started_at = excluded.started_at,
                 completed_at = excluded.completed_at,
                 status = excluded.status,
                 failure_reason = excluded.failure_reason,
                 skip_metadata_json = excluded.skip_metadata_json",
            params![
                job.id.as_str(),
                job.created_at.to_rfc3339(),
                job.started_at.map(|t| t.to_rfc3339()),
                job.completed_at.map(|t| t.to_rfc3339()),
                job.status.as_str(),
                serde_json::to_string(&job.settings)?,
                job.failure_reason,
                job.skip_metadata
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
            ],
        )?;

        tx.execute(
            "DELETE FROM clip_tasks WHERE job_id = ?1",
            params![job.id.as_str()],
        )?;

        for task in &job.tasks {
            tx.execute(
                "INSERT INTO clip_tasks (id, job_id, source_path, status,
                                         started_at, completed_at, failure_reason,
                                         warnings_json, retry_count, output_path)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    task.id.as_str(),
                    job.id.as_str(),
                    task.source_path.to_string_lossy(),
                    task.status.as_str(),
                    task.started_at.map(|t| t.to_rfc3339()),
                    task.completed_at.map(|t| t.to_rfc3339()),
                    task.failure_reason,
                    serde_json::to_string(&task.warnings)?,
                    task.retry_count,
                    task.output_path.to_string_lossy(),
                ],
            )?;
        }

        for event in &job.timeline {
            tx.execute(
                "INSERT OR IGNORE INTO execution_events
                     (event_id, job_id, event_type, recorded_at, seq, clip_id, message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    event.event_id,
                    job.id.as_str(),
                    event.event_type.as_str(),
                    event.recorded_at.to_rfc3339(),
                    event.seq,
                    event.clip_id.as_ref().map(|c| c.as_str()),
                    event.message,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Load one job with its tasks and timeline.
    pub fn load_job(&self, job_id: &JobId) -> StoreResult<Option<Job>> {
        let conn = self.conn.lock().expect("store mutex poisoned");

        let row = conn
            .query_row(
                "SELECT id, created_at, started_at, completed_at, status,
                        settings_json, failure_reason, skip_metadata_json
                 FROM jobs WHERE id = ?1",
                params![job_id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, Option<String>>(7)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, created, started, completed, status, settings, failure, skip)) = row else {
            return Ok(None);
        };

        let settings_json = settings.ok_or_else(|| {
            StoreError::corrupt(format!("job {id} has no settings snapshot"))
        })?;

        let mut job = Job {
            id: JobId::from_string(id.clone()),
            created_at: parse_ts(&created)?,
            started_at: parse_opt_ts(started.as_deref())?,
            completed_at: parse_opt_ts(completed.as_deref())?,
            status: JobStatus::parse(&status)
                .ok_or_else(|| StoreError::corrupt(format!("unknown job status '{status}'")))?,
            settings: serde_json::from_str(&settings_json)?,
            override_settings: None,
            tasks: Vec::new(),
            failure_reason: failure,
            skip_metadata: skip.as_deref().map(serde_json::from_str).transpose()?,
            timeline: Vec::new(),
        };

        let mut stmt = conn.prepare(
            "SELECT id, source_path, status, started_at, completed_at,
                    failure_reason, warnings_json, retry_count, output_path
             FROM clip_tasks WHERE job_id = ?1 ORDER BY rowid",
        )?;
        let task_rows = stmt.query_map(params![job_id.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, u32>(7)?,
                row.get::<_, Option<String>>(8)?,
            ))
        })?;

        for task_row in task_rows {
            let (tid, source, status, started, completed, failure, warnings, retries, output) =
                task_row?;
            let status = TaskStatus::parse(&status)
                .ok_or_else(|| StoreError::corrupt(format!("unknown task status '{status}'")))?;
            job.tasks.push(ClipTask {
                id: TaskId::from_string(tid),
                job_id: job.id.clone(),
                source_path: PathBuf::from(source),
                output_path: PathBuf::from(output.unwrap_or_default()),
                status,
                delivery_stage: stage_for_status(status),
                started_at: parse_opt_ts(started.as_deref())?,
                completed_at: parse_opt_ts(completed.as_deref())?,
                failure_reason: failure,
                warnings: warnings
                    .as_deref()
                    .map(serde_json::from_str)
                    .transpose()?
                    .unwrap_or_default(),
                retry_count: retries,
                progress_percent: if status == TaskStatus::Completed { 100.0 } else { 0.0 },
                eta_seconds: None,
                encode_fps: None,
                metadata: None,
            });
        }

        let mut stmt = conn.prepare(
            "SELECT event_id, event_type, recorded_at, seq, clip_id, message
             FROM execution_events WHERE job_id = ?1
             ORDER BY recorded_at, seq",
        )?;
        let event_rows = stmt.query_map(params![job_id.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u64>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        for event_row in event_rows {
            let (event_id, event_type, recorded, seq, clip_id, message) = event_row?;
            let event_type = EventType::parse(&event_type).ok_or_else(|| {
                StoreError::corrupt(format!("unknown event type '{event_type}'"))
            })?;
            job.timeline.push(ExecutionEvent {
                event_id,
                event_type,
                recorded_at: parse_ts(&recorded)?,
                seq,
                clip_id: clip_id.map(TaskId::from_string),
                message,
            });
        }

        Ok(Some(job))
    }

    /// Load every persisted job. Corrupt rows are skipped with a warning so
    /// one bad record cannot take down startup.
    pub fn load_all_jobs(&self) -> StoreResult<Vec<Job>> {
        let ids: Vec<JobId> = {
            let conn = self.conn.lock().expect("store mutex poisoned");
            let mut stmt = conn.prepare("SELECT id FROM jobs ORDER BY created_at, id")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .map(JobId::from_string)
                .collect()
        };

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            match self.load_job(&id) {
                Ok(Some(job)) => jobs.push(job),
                Ok(None) => {}
                Err(err) => warn!("skipping unloadable job {id}: {err}"),
            }
        }
        Ok(jobs)
    }

    /// Delete a job; tasks, bindings and events cascade.
    pub fn delete_job(&self, job_id: &JobId) -> StoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute("DELETE FROM jobs WHERE id = ?1", params![job_id.as_str()])?;
        Ok(())
    }

    // Preset bindings

    /// Record a job → preset binding. Bindings are written once at creation
    /// and never mutated afterwards.
    pub fn save_preset_binding(&self, job_id: &JobId, preset_id: &str) -> StoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT OR IGNORE INTO preset_bindings (job_id, preset_id, bound_at)
             VALUES (?1, ?2, ?3)",
            params![job_id.as_str(), preset_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn load_preset_binding(&self, job_id: &JobId) -> StoreResult<Option<String>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        Ok(conn
            .query_row(
                "SELECT preset_id FROM preset_bindings WHERE job_id = ?1",
                params![job_id.as_str()],
                |row| row.get(0),
            )
            .optional()?)
    }

    // Watch folders

    pub fn save_watch_folder(&self, folder: &WatchFolder) -> StoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT INTO watch_folders (id, path, enabled, recursive, preset_id, auto_execute, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                 path = excluded.path,
                 enabled = excluded.enabled,
                 recursive = excluded.recursive,
                 preset_id = excluded.preset_id,
                 auto_execute = excluded.auto_execute",
            params![
                folder.id.as_str(),
                folder.path.to_string_lossy(),
                folder.enabled as i64,
                folder.recursive as i64,
                folder.preset_id,
                folder.auto_execute as i64,
                folder.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn load_all_watch_folders(&self) -> StoreResult<Vec<WatchFolder>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, path, enabled, recursive, preset_id, auto_execute, created_at
             FROM watch_folders ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut folders = Vec::new();
        for row in rows {
            let (id, path, enabled, recursive, preset_id, auto_execute, created) = row?;
            folders.push(WatchFolder {
                id: WatchFolderId::from_string(id),
                path: PathBuf::from(path),
                enabled: enabled != 0,
                recursive: recursive != 0,
                preset_id,
                auto_execute: auto_execute != 0,
                created_at: parse_ts(&created)?,
            });
        }
        Ok(folders)
    }

    pub fn delete_watch_folder(&self, folder_id: &WatchFolderId) -> StoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "DELETE FROM watch_folders WHERE id = ?1",
            params![folder_id.as_str()],
        )?;
        Ok(())
    }

    // Processed-file ledger

    /// Mark a file processed. Idempotent: the path is the primary key, so a
    /// source path is recorded at most once per lifetime.
    pub fn save_processed_file(
        &self,
        folder_id: &WatchFolderId,
        file_path: &Path,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT INTO processed_files (file_path, watch_folder_id, processed_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(file_path) DO NOTHING",
            params![
                file_path.to_string_lossy(),
                folder_id.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Point lookup on the unique path index.
    pub fn is_file_processed(&self, file_path: &Path) -> StoreResult<bool> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        Ok(conn
            .query_row(
                "SELECT 1 FROM processed_files WHERE file_path = ?1",
                params![file_path.to_string_lossy()],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    pub fn load_processed_files(
        &self,
        folder_id: Option<&WatchFolderId>,
    ) -> StoreResult<Vec<ProcessedFile>> {
        let conn = self.conn.lock().expect("store mutex poisoned");

        let mut collect = |mut stmt: rusqlite::Statement<'_>,
                           params: &[&dyn rusqlite::ToSql]|
         -> StoreResult<Vec<ProcessedFile>> {
            let rows = stmt.query_map(params, |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            let mut files = Vec::new();
            for row in rows {
                let (path, folder, processed) = row?;
                files.push(ProcessedFile {
                    file_path: PathBuf::from(path),
                    watch_folder_id: WatchFolderId::from_string(folder),
                    processed_at: parse_ts(&processed)?,
                });
            }
            Ok(files)
        };

        match folder_id {
            Some(folder_id) => {
                let stmt = conn.prepare(
                    "SELECT file_path, watch_folder_id, processed_at
                     FROM processed_files WHERE watch_folder_id = ?1",
                )?;
                collect(stmt, &[&folder_id.as_str()])
            }
            None => {
                let stmt = conn.prepare(
                    "SELECT file_path, watch_folder_id, processed_at FROM processed_files",
                )?;
                collect(stmt, &[])
            }
        }
    }

    pub fn clear_processed_files(&self, folder_id: &WatchFolderId) -> StoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "DELETE FROM processed_files WHERE watch_folder_id = ?1",
            params![folder_id.as_str()],
        )?;
        Ok(())
    }
}

fn stage_for_status(status: TaskStatus) -> DeliveryStage {
    match status {
        TaskStatus::Completed => DeliveryStage::Completed,
        TaskStatus::Failed => DeliveryStage::Failed,
        _ => DeliveryStage::Queued,
    }
}

fn parse_ts(s: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| StoreError::corrupt(format!("bad timestamp '{s}': {err}")))
}

fn parse_opt_ts(s: Option<&str>) -> StoreResult<Option<DateTime<Utc>>> {
    s.map(parse_ts).transpose()
}
