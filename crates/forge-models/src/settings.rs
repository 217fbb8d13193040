//! Deliver settings: the frozen encoding snapshot attached to each job.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// External encoder selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    Ffmpeg,
    Resolve,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Ffmpeg => "ffmpeg",
            Engine::Resolve => "resolve",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ffmpeg" => Some(Engine::Ffmpeg),
            "resolve" => Some(Engine::Resolve),
            _ => None,
        }
    }
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Target delivery video codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodec {
    H264,
    H265,
    Prores,
    Dnxhr,
    Dnxhd,
}

impl VideoCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "h264",
            VideoCodec::H265 => "h265",
            VideoCodec::Prores => "prores",
            VideoCodec::Dnxhr => "dnxhr",
            VideoCodec::Dnxhd => "dnxhd",
        }
    }

    /// Accepts the common aliases seen in operator input.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "h264" | "h.264" | "avc" => Some(VideoCodec::H264),
            "h265" | "h.265" | "hevc" => Some(VideoCodec::H265),
            "prores" | "prores_proxy" | "prores_lt" | "prores_422" => Some(VideoCodec::Prores),
            "dnxhr" | "dnxhr_lb" | "dnxhr_sq" => Some(VideoCodec::Dnxhr),
            "dnxhd" => Some(VideoCodec::Dnxhd),
            _ => None,
        }
    }

    /// FFmpeg encoder name for this codec.
    pub fn ffmpeg_encoder(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "libx264",
            VideoCodec::H265 => "libx265",
            VideoCodec::Prores => "prores_ks",
            // DNxHR is selected via the dnxhd encoder with a profile flag
            VideoCodec::Dnxhr => "dnxhd",
            VideoCodec::Dnxhd => "dnxhd",
        }
    }
}

impl std::fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Target delivery container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Container {
    Mp4,
    Mov,
    Mkv,
    Mxf,
}

impl Container {
    pub fn as_str(&self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Mov => "mov",
            Container::Mkv => "mkv",
            Container::Mxf => "mxf",
        }
    }

    /// File extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "mp4" => Some(Container::Mp4),
            "mov" | "qt" => Some(Container::Mov),
            "mkv" => Some(Container::Mkv),
            "mxf" => Some(Container::Mxf),
            _ => None,
        }
    }
}

impl std::fmt::Display for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audio handling policy for the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AudioCodec {
    /// Transcode to AAC (default for viewing copies).
    #[default]
    Aac,
    /// 16-bit PCM, for editorial containers.
    Pcm16,
    /// Stream-copy the source audio.
    Copy,
    /// Drop audio entirely.
    None,
}

impl AudioCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioCodec::Aac => "aac",
            AudioCodec::Pcm16 => "pcm_s16le",
            AudioCodec::Copy => "copy",
            AudioCodec::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aac" => Some(AudioCodec::Aac),
            "pcm" | "pcm_s16le" => Some(AudioCodec::Pcm16),
            "copy" => Some(AudioCodec::Copy),
            "none" => Some(AudioCodec::None),
            _ => None,
        }
    }
}

/// Output resolution policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// Keep the source dimensions.
    Source,
    /// Half width and height (default proxy behaviour).
    #[default]
    Half,
    /// Quarter width and height.
    Quarter,
    /// Explicit dimensions.
    Fixed { width: u32, height: u32 },
}

impl ResolutionPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "source" | "full" => Some(ResolutionPolicy::Source),
            "half" | "1/2" => Some(ResolutionPolicy::Half),
            "quarter" | "1/4" => Some(ResolutionPolicy::Quarter),
            other => {
                let (w, h) = other.split_once('x')?;
                Some(ResolutionPolicy::Fixed {
                    width: w.parse().ok()?,
                    height: h.parse().ok()?,
                })
            }
        }
    }

    /// FFmpeg scale filter for this policy, or None when the source size is kept.
    pub fn ffmpeg_scale_filter(&self) -> Option<String> {
        match self {
            ResolutionPolicy::Source => None,
            // -2 keeps the encoder-required even dimension
            ResolutionPolicy::Half => Some("scale=trunc(iw/4)*2:trunc(ih/4)*2".to_string()),
            ResolutionPolicy::Quarter => Some("scale=trunc(iw/8)*2:trunc(ih/8)*2".to_string()),
            ResolutionPolicy::Fixed { width, height } => Some(format!("scale={width}:{height}")),
        }
    }
}

/// Frame-rate handling for the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FpsMode {
    /// Preserve the source frame rate.
    #[default]
    Source,
    /// Force an explicit rate.
    Explicit { fps: f64 },
}

/// Resolve edition requirement declared on a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResolveEdition {
    Free,
    Studio,
    /// Either edition satisfies the job; never skipped.
    #[default]
    Either,
}

impl ResolveEdition {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolveEdition::Free => "free",
            ResolveEdition::Studio => "studio",
            ResolveEdition::Either => "either",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Some(ResolveEdition::Free),
            "studio" => Some(ResolveEdition::Studio),
            "either" => Some(ResolveEdition::Either),
            _ => None,
        }
    }

    /// Whether a detected edition satisfies this requirement.
    pub fn accepts(&self, detected: ResolveEdition) -> bool {
        matches!(self, ResolveEdition::Either) || *self == detected
    }
}

/// Video portion of the deliver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSettings {
    pub codec: VideoCodec,
}

/// Audio portion of the deliver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AudioSettings {
    #[serde(default)]
    pub codec: AudioCodec,
}

/// File naming and container portion of the deliver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSettings {
    pub container: Container,
    pub naming_template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    /// Mirror source directory structure under the output base.
    #[serde(default)]
    pub preserve_source_dirs: bool,
    /// Number of trailing source directory levels to mirror.
    #[serde(default)]
    pub preserve_dir_levels: u32,
}

/// The complete settings snapshot frozen onto a job at creation.
///
/// After a job is created this value never changes; per-job adjustments go
/// through the override layer (`Job::override_settings`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverSettings {
    pub output_dir: PathBuf,
    pub video: VideoSettings,
    #[serde(default)]
    pub audio: AudioSettings,
    pub file: FileSettings,
    #[serde(default)]
    pub resolution: ResolutionPolicy,
    #[serde(default)]
    pub fps: FpsMode,
    /// Explicit engine override; None lets the capability matrix decide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<Engine>,
}
