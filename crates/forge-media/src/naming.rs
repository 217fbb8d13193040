//! Deterministic output naming.
//!
//! Output paths are a pure function of the naming template, the source path
//! and the resolved settings, with a numeric-suffix collision policy against
//! both planned and on-disk names.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use forge_models::{DeliverSettings, ResolutionPolicy};

/// Tokens that make multi-clip templates collision-free.
const UNIQUIFYING_TOKENS: &[&str] = &["{index}", "{source_name}"];

/// Whether the template contains a token that varies per clip.
///
/// Jobs with more than one clip must use at least one of `{index}` or
/// `{source_name}`; single-clip jobs are exempt.
pub fn has_uniquifying_token(template: &str) -> bool {
    UNIQUIFYING_TOKENS.iter().any(|t| template.contains(t))
}

fn resolution_label(policy: &ResolutionPolicy) -> String {
    match policy {
        ResolutionPolicy::Source => "full".to_string(),
        ResolutionPolicy::Half => "half".to_string(),
        ResolutionPolicy::Quarter => "quarter".to_string(),
        ResolutionPolicy::Fixed { width, height } => format!("{width}x{height}"),
    }
}

/// Expand the naming template for one clip.
fn expand_template(settings: &DeliverSettings, source: &Path, index: usize) -> String {
    let source_name = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| format!("clip{index}"));

    settings
        .file
        .naming_template
        .replace("{source_name}", &source_name)
        .replace("{index}", &format!("{:03}", index + 1))
        .replace("{codec}", settings.video.codec.as_str())
        .replace("{resolution}", &resolution_label(&settings.resolution))
}

/// Trailing source directory components mirrored under the output base.
fn preserved_dirs(settings: &DeliverSettings, source: &Path) -> PathBuf {
    if !settings.file.preserve_source_dirs || settings.file.preserve_dir_levels == 0 {
        return PathBuf::new();
    }

    let components: Vec<_> = source
        .parent()
        .map(|p| {
            p.components()
                .filter_map(|c| match c {
                    Component::Normal(part) => Some(PathBuf::from(part)),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let keep = settings.file.preserve_dir_levels as usize;
    let start = components.len().saturating_sub(keep);
    components[start..].iter().fold(PathBuf::new(), |mut acc, c| {
        acc.push(c);
        acc
    })
}

/// Resolve the absolute output path for one clip of a job.
///
/// `planned` holds paths already assigned to earlier clips of the same job;
/// collisions against it or against existing files get `_1`, `_2`, ...
/// suffixes so no clip ever overwrites another.
pub fn resolve_output_path(
    settings: &DeliverSettings,
    source: &Path,
    index: usize,
    planned: &HashSet<PathBuf>,
) -> PathBuf {
    let mut stem = expand_template(settings, source, index);
    if let Some(prefix) = &settings.file.prefix {
        stem = format!("{prefix}{stem}");
    }
    if let Some(suffix) = &settings.file.suffix {
        stem = format!("{stem}{suffix}");
    }

    let mut dir = settings.output_dir.clone();
    let mirrored = preserved_dirs(settings, source);
    if !mirrored.as_os_str().is_empty() {
        dir.push(mirrored);
    }

    let extension = settings.file.container.extension();
    let candidate = dir.join(format!("{stem}.{extension}"));
    if !planned.contains(&candidate) && !candidate.exists() {
        return candidate;
    }

    // Numeric suffixes until a free name is found.
    let mut n = 1u32;
    loop {
        let candidate = dir.join(format!("{stem}_{n}.{extension}"));
        if !planned.contains(&candidate) && !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_models::{
        AudioSettings, Container, FileSettings, FpsMode, VideoCodec, VideoSettings,
    };

    fn settings(template: &str) -> DeliverSettings {
        DeliverSettings {
            output_dir: PathBuf::from("/out"),
            video: VideoSettings {
                codec: VideoCodec::H264,
            },
            audio: AudioSettings::default(),
            file: FileSettings {
                container: Container::Mp4,
                naming_template: template.to_string(),
                prefix: None,
                suffix: None,
                preserve_source_dirs: false,
                preserve_dir_levels: 0,
            },
            resolution: ResolutionPolicy::Half,
            fps: FpsMode::Source,
            engine: None,
        }
    }

    #[test]
    fn test_uniquifying_tokens() {
        assert!(has_uniquifying_token("{source_name}_proxy"));
        assert!(has_uniquifying_token("shot_{index}"));
        assert!(!has_uniquifying_token("output"));
    }

    #[test]
    fn test_source_name_expansion() {
        let s = settings("{source_name}_proxy");
        let path = resolve_output_path(&s, Path::new("/m/a.mov"), 0, &HashSet::new());
        assert_eq!(path, PathBuf::from("/out/a_proxy.mp4"));
    }

    #[test]
    fn test_index_codec_resolution_tokens() {
        let s = settings("{index}_{codec}_{resolution}");
        let path = resolve_output_path(&s, Path::new("/m/a.mov"), 4, &HashSet::new());
        assert_eq!(path, PathBuf::from("/out/005_h264_half.mp4"));
    }

    #[test]
    fn test_prefix_and_suffix() {
        let mut s = settings("{source_name}");
        s.file.prefix = Some("px_".to_string());
        s.file.suffix = Some("_v1".to_string());
        let path = resolve_output_path(&s, Path::new("/m/a.mov"), 0, &HashSet::new());
        assert_eq!(path, PathBuf::from("/out/px_a_v1.mp4"));
    }

    #[test]
    fn test_collision_against_planned_names() {
        let s = settings("output");
        let mut planned = HashSet::new();
        let first = resolve_output_path(&s, Path::new("/m/a.mov"), 0, &planned);
        planned.insert(first.clone());
        let second = resolve_output_path(&s, Path::new("/m/b.mov"), 1, &planned);

        assert_eq!(first, PathBuf::from("/out/output.mp4"));
        assert_eq!(second, PathBuf::from("/out/output_1.mp4"));
    }

    #[test]
    fn test_collision_against_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings("{source_name}_proxy");
        s.output_dir = dir.path().to_path_buf();

        std::fs::write(dir.path().join("a_proxy.mp4"), b"existing").unwrap();
        let path = resolve_output_path(&s, Path::new("/m/a.mov"), 0, &HashSet::new());
        assert_eq!(path, dir.path().join("a_proxy_1.mp4"));
    }

    #[test]
    fn test_preserve_source_dirs() {
        let mut s = settings("{source_name}_proxy");
        s.file.preserve_source_dirs = true;
        s.file.preserve_dir_levels = 2;
        let path = resolve_output_path(
            &s,
            Path::new("/media/cardA/reel2/a.mov"),
            0,
            &HashSet::new(),
        );
        assert_eq!(path, PathBuf::from("/out/cardA/reel2/a_proxy.mp4"));
    }
}
