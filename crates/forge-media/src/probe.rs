//! FFprobe media information.

use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;

use forge_models::MediaMetadata;

use crate::error::{MediaError, MediaResult};

/// Probed media file information.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    /// Duration in seconds.
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: String,
    /// Container format name as reported by ffprobe.
    pub container: String,
    /// e.g. "stereo" or "5.1"
    pub audio_channels: Option<String>,
    /// e.g. "bt709"
    pub color_space: Option<String>,
    pub size: u64,
}

impl MediaInfo {
    /// Display metadata captured onto a clip task at ingest.
    pub fn to_metadata(&self) -> MediaMetadata {
        MediaMetadata {
            resolution: Some(format!("{}x{}", self.width, self.height)),
            codec: Some(self.codec.clone()),
            fps: Some(self.fps),
            duration_seconds: Some(self.duration),
            audio_channels: self.audio_channels.clone(),
            color_space: self.color_space.clone(),
        }
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    color_space: Option<String>,
    channels: Option<u32>,
    channel_layout: Option<String>,
}

/// Probe a media file.
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("ffprobe failed on {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::NoVideoStream(path.to_path_buf()))?;

    let audio = probe.streams.iter().find(|s| s.codec_type == "audio");

    let duration = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let size = probe
        .format
        .size
        .as_ref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let fps = video
        .avg_frame_rate
        .as_ref()
        .or(video.r_frame_rate.as_ref())
        .and_then(|r| parse_frame_rate(r))
        .unwrap_or(0.0);

    Ok(MediaInfo {
        duration,
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        fps,
        codec: video.codec_name.clone().unwrap_or_default(),
        container: probe
            .format
            .format_name
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        audio_channels: audio.map(audio_summary),
        color_space: video.color_space.clone(),
        size,
    })
}

fn audio_summary(stream: &FfprobeStream) -> String {
    if let Some(layout) = &stream.channel_layout {
        return layout.clone();
    }
    match stream.channels {
        Some(1) => "mono".to_string(),
        Some(2) => "stereo".to_string(),
        Some(n) => format!("{n}ch"),
        None => "unknown".to_string(),
    }
}

/// Parse frame rate string (e.g. "30000/1001" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("25").unwrap() - 25.0).abs() < 0.01);
        assert!(parse_frame_rate("30/0").is_none());
    }

    #[test]
    fn test_audio_summary() {
        let stream = FfprobeStream {
            codec_type: "audio".to_string(),
            codec_name: Some("pcm_s24le".to_string()),
            width: None,
            height: None,
            r_frame_rate: None,
            avg_frame_rate: None,
            color_space: None,
            channels: Some(2),
            channel_layout: None,
        };
        assert_eq!(audio_summary(&stream), "stereo");

        let surround = FfprobeStream {
            channel_layout: Some("5.1".to_string()),
            ..stream
        };
        assert_eq!(audio_summary(&surround), "5.1");
    }

    #[test]
    fn test_metadata_conversion() {
        let info = MediaInfo {
            duration: 12.5,
            width: 1920,
            height: 1080,
            fps: 23.976,
            codec: "prores".to_string(),
            container: "mov".to_string(),
            audio_channels: Some("stereo".to_string()),
            color_space: Some("bt709".to_string()),
            size: 1024,
        };
        let meta = info.to_metadata();
        assert_eq!(meta.resolution.as_deref(), Some("1920x1080"));
        assert_eq!(meta.duration_seconds, Some(12.5));
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let err = probe_media("/definitely/not/here.mov").await.unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
