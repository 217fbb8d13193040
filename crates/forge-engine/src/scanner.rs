//! Filesystem scanner for watch folders.
//!
//! Restricts candidates to a static media-extension allowlist, skips hidden
//! files and symlinks, and returns paths in deterministic (sorted) order.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use forge_models::WatchFolder;

/// Media extensions accepted for ingestion.
const MEDIA_EXTENSIONS: &[&str] = &["mov", "mxf", "mp4", "avi", "mkv"];

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

fn has_media_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_ascii_lowercase();
            MEDIA_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Scan a watch folder for candidate media files.
///
/// Honour the `recursive` flag; a missing or non-directory path yields an
/// empty list (the engine reports that separately).
pub fn scan_folder(folder: &WatchFolder) -> Vec<PathBuf> {
    if !folder.path.is_dir() {
        return Vec::new();
    }

    let max_depth = if folder.recursive { usize::MAX } else { 1 };
    let mut candidates: Vec<PathBuf> = WalkDir::new(&folder.path)
        .max_depth(max_depth)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.path()))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && !entry.path_is_symlink())
        .map(|entry| entry.path().to_path_buf())
        .filter(|path| has_media_extension(path))
        .collect();

    candidates.sort();
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(path: PathBuf, recursive: bool) -> WatchFolder {
        let mut folder = WatchFolder::new(path);
        folder.recursive = recursive;
        folder
    }

    fn touch(path: &Path) {
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_extension_allowlist() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.mov"));
        touch(&dir.path().join("b.MP4"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("c.r3d"));

        let found = scan_folder(&folder(dir.path().to_path_buf(), false));
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.mov", "b.MP4"]);
    }

    #[test]
    fn test_hidden_files_skipped() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join(".partial.mov"));
        touch(&dir.path().join("visible.mov"));

        let found = scan_folder(&folder(dir.path().to_path_buf(), false));
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("visible.mov"));
    }

    #[test]
    fn test_recursive_flag() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("card1");
        std::fs::create_dir(&sub).unwrap();
        touch(&dir.path().join("top.mov"));
        touch(&sub.join("nested.mov"));

        let shallow = scan_folder(&folder(dir.path().to_path_buf(), false));
        assert_eq!(shallow.len(), 1);

        let deep = scan_folder(&folder(dir.path().to_path_buf(), true));
        assert_eq!(deep.len(), 2);
    }

    #[test]
    fn test_missing_folder_is_empty() {
        let found = scan_folder(&folder(PathBuf::from("/no/such/folder"), true));
        assert!(found.is_empty());
    }

    #[test]
    fn test_deterministic_order() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.mov"));
        touch(&dir.path().join("a.mov"));
        touch(&dir.path().join("c.mov"));

        let found = scan_folder(&folder(dir.path().to_path_buf(), false));
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.mov", "b.mov", "c.mov"]);
    }
}
