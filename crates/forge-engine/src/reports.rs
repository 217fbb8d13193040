//! Report artifact discovery.
//!
//! Reports are written by external tooling with a fixed filename pattern;
//! the query layer only discovers them on disk, newest first.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use forge_models::JobId;

/// `proxy_job_{first8}_{YYYYMMDDTHHMMSS}.{csv|json|txt}`
fn report_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^proxy_job_([0-9a-fA-F-]{8})_(\d{8}T\d{6})\.(csv|json|txt)$")
            .expect("report pattern compiles")
    })
}

/// Reference to a report file on disk; content is never loaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportReference {
    pub filename: String,
    pub abs_path: String,
    pub size_bytes: u64,
    /// Seconds since the Unix epoch.
    pub mtime: f64,
}

/// Find all report artifacts for a job, sorted by mtime descending.
pub fn find_job_reports(job_id: &JobId, dir: &Path) -> Vec<ReportReference> {
    let prefix = job_id.short();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut reports: Vec<ReportReference> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            let captures = report_pattern().captures(&name)?;
            if captures.get(1)?.as_str() != prefix {
                return None;
            }
            let metadata = entry.metadata().ok()?;
            if !metadata.is_file() {
                return None;
            }
            let mtime = metadata
                .modified()
                .ok()?
                .duration_since(std::time::UNIX_EPOCH)
                .ok()?
                .as_secs_f64();
            Some(ReportReference {
                filename: name,
                abs_path: entry.path().to_string_lossy().to_string(),
                size_bytes: metadata.len(),
                mtime,
            })
        })
        .collect();

    reports.sort_by(|a, b| b.mtime.total_cmp(&a.mtime));
    reports
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matches_fixed_shape() {
        let pattern = report_pattern();
        assert!(pattern.is_match("proxy_job_abcd1234_20260801T120000.csv"));
        assert!(pattern.is_match("proxy_job_abcd1234_20260801T120000.json"));
        assert!(pattern.is_match("proxy_job_abcd1234_20260801T120000.txt"));

        assert!(!pattern.is_match("proxy_job_abcd1234_20260801T120000.pdf"));
        assert!(!pattern.is_match("proxy_job_abcd1234_2026-08-01.csv"));
        assert!(!pattern.is_match("job_abcd1234_20260801T120000.csv"));
    }

    #[test]
    fn test_discovery_filters_by_job_and_sorts_by_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let job_id = JobId::from_string("abcd1234-0000-0000-0000-000000000000");

        let older = dir.path().join("proxy_job_abcd1234_20260801T110000.csv");
        let newer = dir.path().join("proxy_job_abcd1234_20260801T120000.json");
        let foreign = dir.path().join("proxy_job_ffff9999_20260801T120000.csv");
        std::fs::write(&older, b"a,b\n").unwrap();
        std::fs::write(&newer, b"{}").unwrap();
        std::fs::write(&foreign, b"x\n").unwrap();

        // Make the mtime ordering unambiguous.
        let past = std::time::SystemTime::now() - std::time::Duration::from_secs(3600);
        let file = std::fs::File::options().append(true).open(&older).unwrap();
        file.set_modified(past).unwrap();

        let reports = find_job_reports(&job_id, dir.path());
        assert_eq!(reports.len(), 2);
        assert!(reports[0].filename.ends_with(".json"));
        assert!(reports[1].filename.ends_with(".csv"));
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let job_id = JobId::new();
        assert!(find_job_reports(&job_id, Path::new("/no/such/dir")).is_empty());
    }
}
