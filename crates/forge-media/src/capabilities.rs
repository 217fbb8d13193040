//! FFmpeg hardware capability probe.
//!
//! Probed once per process and cached. ProRes is never advertised as
//! GPU-accelerated regardless of what the encoder list claims, since no GPU
//! ProRes encoder exists.

use std::process::Stdio;

use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Detected FFmpeg capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegCapabilities {
    pub hwaccels: Vec<String>,
    pub encoders: Vec<String>,
    /// Hard false: there is no GPU ProRes encoder.
    pub prores_gpu_supported: bool,
}

impl FfmpegCapabilities {
    pub fn has_encoder(&self, name: &str) -> bool {
        self.encoders.iter().any(|e| e == name)
    }
}

static CAPABILITIES: OnceCell<FfmpegCapabilities> = OnceCell::const_new();

/// Detect FFmpeg capabilities, probing the binary only on first call.
pub async fn detect_capabilities() -> MediaResult<&'static FfmpegCapabilities> {
    CAPABILITIES
        .get_or_try_init(|| async {
            which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

            let hwaccels = run_listing(&["-hide_banner", "-hwaccels"], parse_hwaccels).await?;
            let encoders = run_listing(&["-hide_banner", "-encoders"], parse_encoders).await?;
            debug!(
                hwaccels = hwaccels.len(),
                encoders = encoders.len(),
                "probed ffmpeg capabilities"
            );

            Ok(FfmpegCapabilities {
                hwaccels,
                encoders,
                prores_gpu_supported: false,
            })
        })
        .await
}

async fn run_listing(
    args: &[&str],
    parse: fn(&str) -> Vec<String>,
) -> MediaResult<Vec<String>> {
    let output = Command::new("ffmpeg")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await?;

    Ok(parse(&String::from_utf8_lossy(&output.stdout)))
}

fn parse_hwaccels(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(1) // "Hardware acceleration methods:" header
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

fn parse_encoders(stdout: &str) -> Vec<String> {
    // Encoder lines look like " V....D libx264    H.264 / AVC ..." after a
    // header block terminated by "------".
    let mut past_header = false;
    let mut encoders = Vec::new();
    for line in stdout.lines() {
        if !past_header {
            past_header = line.trim_start().starts_with("------");
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(_flags), Some(name)) = (fields.next(), fields.next()) else {
            continue;
        };
        encoders.push(name.to_string());
    }
    encoders
}
