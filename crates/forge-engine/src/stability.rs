//! File stability detection.
//!
//! A file is considered stable when it is old enough and its size has not
//! changed across a required number of consecutive observations. Size
//! changes reset the counter. Every non-stable verdict carries a reason.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use forge_models::FileStabilityCheck;

/// Poll-based stability checker with per-path `(last_size, streak)` state.
pub struct StabilityChecker {
    min_age: Duration,
    required_checks: u32,
    state: HashMap<PathBuf, (u64, u32)>,
}

impl StabilityChecker {
    pub fn new(min_age: Duration, required_checks: u32) -> Self {
        Self {
            min_age,
            required_checks,
            state: HashMap::new(),
        }
    }

    /// Defaults: 10 s minimum age, 3 consecutive unchanged checks.
    pub fn with_defaults() -> Self {
        Self::new(Duration::from_secs(10), 3)
    }

    /// Observe a candidate once. Call on every poll tick.
    pub fn check(&mut self, path: &Path) -> FileStabilityCheck {
        let path_buf = path.to_path_buf();

        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(err) => {
                // Gone or unreadable; forget any tracking state.
                self.state.remove(&path_buf);
                return FileStabilityCheck::unstable(
                    path_buf,
                    None,
                    0,
                    format!("file not accessible: {err}"),
                );
            }
        };
        let current_size = metadata.len();

        let age = metadata
            .modified()
            .ok()
            .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
            .unwrap_or(Duration::ZERO);
        if age < self.min_age {
            return FileStabilityCheck::unstable(
                path_buf,
                Some(current_size),
                0,
                format!(
                    "file too recent (age: {:.1}s, required: {:.1}s)",
                    age.as_secs_f64(),
                    self.min_age.as_secs_f64()
                ),
            );
        }

        match self.state.get(&path_buf).copied() {
            None => {
                self.state.insert(path_buf.clone(), (current_size, 1));
                FileStabilityCheck::unstable(
                    path_buf,
                    Some(current_size),
                    1,
                    format!(
                        "first stability check (need {} consecutive stable checks)",
                        self.required_checks
                    ),
                )
            }
            Some((prev_size, streak)) if prev_size == current_size => {
                let streak = streak + 1;
                self.state.insert(path_buf.clone(), (current_size, streak));
                if streak >= self.required_checks {
                    FileStabilityCheck::stable(path_buf, current_size, streak)
                } else {
                    FileStabilityCheck::unstable(
                        path_buf,
                        Some(current_size),
                        streak,
                        format!("stable for {streak}/{} checks", self.required_checks),
                    )
                }
            }
            Some((prev_size, _)) => {
                self.state.insert(path_buf.clone(), (current_size, 1));
                FileStabilityCheck::unstable(
                    path_buf,
                    Some(current_size),
                    1,
                    format!("file size changed (prev: {prev_size}, current: {current_size})"),
                )
            }
        }
    }

    /// Forget a path after successful ingestion.
    pub fn reset(&mut self, path: &Path) {
        self.state.remove(path);
    }

    pub fn clear(&mut self) {
        self.state.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> StabilityChecker {
        // Zero min-age so tests need not manipulate mtimes.
        StabilityChecker::new(Duration::ZERO, 3)
    }

    #[test]
    fn test_requires_consecutive_unchanged_checks() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.mov");
        std::fs::write(&file, vec![0u8; 1024]).unwrap();

        let mut checker = checker();
        assert!(!checker.check(&file).is_stable); // 1
        assert!(!checker.check(&file).is_stable); // 2
        let third = checker.check(&file); // 3
        assert!(third.is_stable);
        assert_eq!(third.check_count, 3);
        assert!(third.reason.is_none());
    }

    #[test]
    fn test_size_change_resets_streak() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.mov");
        std::fs::write(&file, vec![0u8; 1024]).unwrap();

        let mut checker = checker();
        checker.check(&file);
        checker.check(&file);

        // Still being copied: the size grows.
        std::fs::write(&file, vec![0u8; 4096]).unwrap();
        let reset = checker.check(&file);
        assert!(!reset.is_stable);
        assert_eq!(reset.check_count, 1);
        assert!(reset.reason.as_deref().unwrap().contains("size changed"));

        checker.check(&file);
        assert!(checker.check(&file).is_stable);
    }

    #[test]
    fn test_min_age_gate() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.mov");
        std::fs::write(&file, b"fresh").unwrap();

        let mut checker = StabilityChecker::new(Duration::from_secs(3600), 3);
        let verdict = checker.check(&file);
        assert!(!verdict.is_stable);
        assert!(verdict.reason.as_deref().unwrap().contains("too recent"));
        assert_eq!(verdict.check_count, 0);
    }

    #[test]
    fn test_missing_file_clears_tracking() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.mov");
        std::fs::write(&file, b"data").unwrap();

        let mut checker = checker();
        checker.check(&file);
        std::fs::remove_file(&file).unwrap();

        let verdict = checker.check(&file);
        assert!(!verdict.is_stable);
        assert!(verdict.size_bytes.is_none());

        // Reappearing starts from scratch.
        std::fs::write(&file, b"data").unwrap();
        assert_eq!(checker.check(&file).check_count, 1);
    }
}
