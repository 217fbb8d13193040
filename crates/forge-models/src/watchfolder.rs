//! Watch folder configuration and file stability checks.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::WatchFolderId;

/// A monitored ingest folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchFolder {
    pub id: WatchFolderId,
    pub path: PathBuf,
    pub enabled: bool,
    pub recursive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset_id: Option<String>,
    /// Advisory only; the core never starts a job automatically unless this
    /// is true AND a preset is bound AND all gating checks pass.
    #[serde(default)]
    pub auto_execute: bool,
    pub created_at: DateTime<Utc>,
}

impl WatchFolder {
    pub fn new(path: PathBuf) -> Self {
        Self {
            id: WatchFolderId::new(),
            path,
            enabled: true,
            recursive: false,
            preset_id: None,
            auto_execute: false,
            created_at: Utc::now(),
        }
    }
}

/// One processed-file ledger entry, keyed uniquely on absolute path.
///
/// Guarantees at most one job per source path per lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedFile {
    pub file_path: PathBuf,
    pub watch_folder_id: WatchFolderId,
    pub processed_at: DateTime<Utc>,
}

/// Outcome of one stability observation on a candidate file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStabilityCheck {
    pub path: PathBuf,
    pub is_stable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    pub check_count: u32,
    /// Why the file is not yet stable; None once stable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl FileStabilityCheck {
    pub fn stable(path: PathBuf, size_bytes: u64, check_count: u32) -> Self {
        Self {
            path,
            is_stable: true,
            size_bytes: Some(size_bytes),
            check_count,
            reason: None,
        }
    }

    pub fn unstable(
        path: PathBuf,
        size_bytes: Option<u64>,
        check_count: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            path,
            is_stable: false,
            size_bytes,
            check_count,
            reason: Some(reason.into()),
        }
    }
}
