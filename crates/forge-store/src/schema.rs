//! Versioned schema and forward migrations.
//!
//! On open the store compares the stored version to the code version and
//! applies forward migrations inside one transaction. Downgrade is refused.

use chrono::Utc;
use rusqlite::Connection;

use crate::error::{StoreError, StoreResult};

/// Current schema version understood by this build.
pub const SCHEMA_VERSION: u32 = 2;

/// Ensure the schema exists and is at the current version.
pub fn ensure_schema(conn: &mut Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
    )?;

    let stored: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if stored > SCHEMA_VERSION {
        return Err(StoreError::SchemaDowngrade {
            stored,
            supported: SCHEMA_VERSION,
        });
    }

    if stored < SCHEMA_VERSION {
        migrate(conn, stored)?;
    }

    Ok(())
}

fn migrate(conn: &mut Connection, from_version: u32) -> StoreResult<()> {
    let tx = conn.transaction()?;

    if from_version < 1 {
        tx.execute_batch(
            "CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                status TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS clip_tasks (
                id TEXT PRIMARY KEY,
                job_id TEXT NOT NULL,
                source_path TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                failure_reason TEXT,
                warnings_json TEXT,
                retry_count INTEGER DEFAULT 0,
                FOREIGN KEY (job_id) REFERENCES jobs (id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_clip_tasks_job_id
            ON clip_tasks (job_id);

            CREATE TABLE IF NOT EXISTS preset_bindings (
                job_id TEXT PRIMARY KEY,
                preset_id TEXT NOT NULL,
                bound_at TEXT NOT NULL,
                FOREIGN KEY (job_id) REFERENCES jobs (id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS watch_folders (
                id TEXT PRIMARY KEY,
                path TEXT NOT NULL UNIQUE,
                enabled INTEGER NOT NULL,
                recursive INTEGER NOT NULL,
                preset_id TEXT,
                auto_execute INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS processed_files (
                file_path TEXT PRIMARY KEY,
                watch_folder_id TEXT NOT NULL,
                processed_at TEXT NOT NULL,
                FOREIGN KEY (watch_folder_id) REFERENCES watch_folders (id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_processed_files_watch_folder
            ON processed_files (watch_folder_id);",
        )?;
        record_version(&tx, 1)?;
    }

    if from_version < 2 {
        // v2: settings snapshots and resolved output paths become durable,
        // and the per-job execution timeline survives restarts.
        tx.execute_batch(
            "ALTER TABLE jobs ADD COLUMN settings_json TEXT;
            ALTER TABLE jobs ADD COLUMN failure_reason TEXT;
            ALTER TABLE jobs ADD COLUMN skip_metadata_json TEXT;
            ALTER TABLE clip_tasks ADD COLUMN output_path TEXT;

            CREATE TABLE IF NOT EXISTS execution_events (
                event_id TEXT PRIMARY KEY,
                job_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                seq INTEGER NOT NULL,
                clip_id TEXT,
                message TEXT,
                FOREIGN KEY (job_id) REFERENCES jobs (id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_execution_events_job_id
            ON execution_events (job_id);",
        )?;
        record_version(&tx, 2)?;
    }

    tx.commit()?;
    Ok(())
}

fn record_version(tx: &rusqlite::Transaction<'_>, version: u32) -> StoreResult<()> {
    tx.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![version, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_schema_reaches_current_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        ensure_schema(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        ensure_schema(&mut conn).unwrap();
        ensure_schema(&mut conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, SCHEMA_VERSION);
    }

    #[test]
    fn test_downgrade_is_refused() {
        let mut conn = Connection::open_in_memory().unwrap();
        ensure_schema(&mut conn).unwrap();

        conn.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![SCHEMA_VERSION + 5, Utc::now().to_rfc3339()],
        )
        .unwrap();

        match ensure_schema(&mut conn) {
            Err(StoreError::SchemaDowngrade { stored, supported }) => {
                assert_eq!(stored, SCHEMA_VERSION + 5);
                assert_eq!(supported, SCHEMA_VERSION);
            }
            other => panic!("expected downgrade refusal, got {other:?}"),
        }
    }
}
