//! FFmpeg progress stream parsing.
//!
//! FFmpeg is run with `-progress pipe:2`, which emits machine-readable
//! `key=value` lines on stderr (`out_time_ms`, `speed`, `fps`, terminated by
//! a `progress=continue|end` line per block). Percent and ETA are derived
//! only from these parsed values against a probed input duration; nothing is
//! interpolated.

use serde::{Deserialize, Serialize};

/// Progress information parsed from one FFmpeg report block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number.
    pub frame: u64,
    /// Current encode rate in frames per second.
    pub fps: f64,
    /// Output time in milliseconds.
    pub out_time_ms: i64,
    /// Encoding speed relative to realtime (e.g. 1.5 = 1.5x).
    pub speed: f64,
    /// Whether encoding is complete.
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Progress percentage against a known total duration.
    ///
    /// Returns None when the duration is unknown or no time has been parsed
    /// yet; progress must never be fabricated.
    pub fn percentage(&self, total_duration_ms: Option<i64>) -> Option<f64> {
        let total = total_duration_ms.filter(|t| *t > 0)?;
        if self.out_time_ms <= 0 {
            return None;
        }
        Some(((self.out_time_ms as f64 / total as f64) * 100.0).min(100.0))
    }

    /// Estimated seconds remaining; only when the encoder reported a usable
    /// speed.
    pub fn eta_seconds(&self, total_duration_ms: Option<i64>) -> Option<f64> {
        let total = total_duration_ms.filter(|t| *t > 0)?;
        if self.speed <= 0.0 || self.out_time_ms <= 0 {
            return None;
        }
        let remaining_ms = (total - self.out_time_ms).max(0);
        Some((remaining_ms as f64 / 1000.0) / self.speed)
    }
}

/// Parse one `-progress` line into the accumulating state.
///
/// Returns a snapshot at the end of each report block (the `progress=` line).
pub fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let line = line.trim();
    let (key, value) = line.split_once('=')?;

    match key {
        "out_time_ms" | "out_time_us" => {
            // Despite the name, ffmpeg reports out_time_ms in microseconds.
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        "frame" => {
            if let Ok(frame) = value.trim().parse() {
                current.frame = frame;
            }
        }
        "fps" => {
            if let Ok(fps) = value.trim().parse() {
                current.fps = fps;
            }
        }
        "speed" => {
            // Format: "1.5x" or "N/A"
            if value != "N/A" {
                if let Some(speed_str) = value.trim().strip_suffix('x') {
                    if let Ok(speed) = speed_str.parse() {
                        current.speed = speed;
                    }
                }
            }
        }
        "progress" => {
            if value == "end" {
                current.is_complete = true;
            }
            return Some(current.clone());
        }
        _ => {}
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_parsing() {
        let mut progress = FfmpegProgress::default();

        assert!(parse_progress_line("frame=120", &mut progress).is_none());
        assert!(parse_progress_line("fps=48.2", &mut progress).is_none());
        assert!(parse_progress_line("out_time_ms=5000000", &mut progress).is_none());
        assert!(parse_progress_line("speed=1.5x", &mut progress).is_none());

        let snapshot = parse_progress_line("progress=continue", &mut progress).unwrap();
        assert_eq!(snapshot.frame, 120);
        assert_eq!(snapshot.out_time_ms, 5000);
        assert!((snapshot.speed - 1.5).abs() < 0.01);
        assert!(!snapshot.is_complete);

        let done = parse_progress_line("progress=end", &mut progress).unwrap();
        assert!(done.is_complete);
    }

    #[test]
    fn test_speed_na_is_ignored() {
        let mut progress = FfmpegProgress::default();
        parse_progress_line("speed=N/A", &mut progress);
        assert_eq!(progress.speed, 0.0);
    }

    #[test]
    fn test_percentage_requires_duration_and_sample() {
        let progress = FfmpegProgress {
            out_time_ms: 5000,
            ..Default::default()
        };
        assert!((progress.percentage(Some(10_000)).unwrap() - 50.0).abs() < 0.01);
        assert!(progress.percentage(None).is_none());
        assert!(progress.percentage(Some(0)).is_none());

        let untouched = FfmpegProgress::default();
        assert!(untouched.percentage(Some(10_000)).is_none());
    }

    #[test]
    fn test_eta_requires_speed() {
        let progress = FfmpegProgress {
            out_time_ms: 5000,
            speed: 2.0,
            ..Default::default()
        };
        // 5 seconds remaining at 2x speed = 2.5 seconds ETA.
        let eta = progress.eta_seconds(Some(10_000)).unwrap();
        assert!((eta - 2.5).abs() < 0.01);

        let stalled = FfmpegProgress {
            out_time_ms: 5000,
            speed: 0.0,
            ..Default::default()
        };
        assert!(stalled.eta_seconds(Some(10_000)).is_none());
    }
}
