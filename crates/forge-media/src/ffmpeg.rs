//! FFmpeg command builder and encode adapter.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use forge_models::{AudioCodec, DeliveryStage, Engine, FailureTag, FpsMode, ValidationError};

use crate::engine::{
    EncodeEngine, EncodeFuture, EncodePlan, ExecutionOutcome, ExecutionResult, ProgressFn,
    ProgressSample,
};
use crate::error::MediaError;
use crate::progress::{parse_progress_line, FfmpegProgress};
use crate::routing::check_coherence;

/// How long to wait after the graceful quit before force-killing.
const GRACEFUL_QUIT_SECS: u64 = 3;

/// Stderr lines kept for failure reports.
const STDERR_TAIL_LINES: usize = 40;

/// Percent step between emitted progress events.
const PROGRESS_STEP_PERCENT: f64 = 5.0;

/// Builder for FFmpeg argument lists.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    input_args: Vec<String>,
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add an argument before `-i`.
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add an argument after `-i`.
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    pub fn frame_rate(self, fps: f64) -> Self {
        self.output_arg("-r").output_arg(format!("{fps}"))
    }

    /// Build the deterministic argv. The same plan always yields the same
    /// argument list, which is recorded in the execution result for audit.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Machine-readable progress on stderr.
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Build the FFmpeg command for a resolved clip plan.
///
/// Coherence is re-checked here at command-build time even though the
/// validator already enforced it.
pub fn build_plan_command(plan: &EncodePlan) -> Result<FfmpegCommand, ValidationError> {
    check_coherence(plan.codec, plan.container)?;

    let mut cmd = FfmpegCommand::new(&plan.source, &plan.output)
        .video_codec(plan.codec.ffmpeg_encoder());

    if let Some(filter) = &plan.scale_filter {
        cmd = cmd.video_filter(filter.clone());
    }

    if let FpsMode::Explicit { fps } = plan.fps {
        cmd = cmd.frame_rate(fps);
    }

    cmd = match plan.audio {
        AudioCodec::Aac => cmd.output_args(["-c:a", "aac", "-b:a", "192k"]),
        AudioCodec::Pcm16 => cmd.output_args(["-c:a", "pcm_s16le"]),
        AudioCodec::Copy => cmd.output_args(["-c:a", "copy"]),
        AudioCodec::None => cmd.output_arg("-an"),
    };

    cmd = cmd.output_args(plan.extra_args.iter().cloned());

    Ok(cmd)
}

/// FFmpeg encode adapter.
#[derive(Debug, Clone, Default)]
pub struct FfmpegAdapter;

impl FfmpegAdapter {
    pub fn new() -> Self {
        Self
    }

    async fn run(
        &self,
        plan: EncodePlan,
        mut cancel: watch::Receiver<bool>,
        progress: ProgressFn,
    ) -> ExecutionResult {
        let started_at = Utc::now();
        let encoder = plan.codec.ffmpeg_encoder().to_string();

        let fail = |reason: String, tag: FailureTag, argv: Vec<String>| ExecutionResult {
            outcome: ExecutionOutcome::Failed { reason, tag },
            output_path: None,
            argv,
            started_at,
            completed_at: Utc::now(),
            encoder: Some(encoder.clone()),
        };

        let cmd = match build_plan_command(&plan) {
            Ok(cmd) => cmd,
            Err(err) => return fail(err.message.clone(), err.tag, Vec::new()),
        };
        let argv = cmd.build_args();

        if which::which("ffmpeg").is_err() {
            return fail(
                MediaError::FfmpegNotFound.to_string(),
                FailureTag::EngineFailure,
                argv,
            );
        }

        debug!(task_id = %plan.task_id, "running ffmpeg {}", argv.join(" "));
        progress(sample(&plan, DeliveryStage::Starting, None, None, None));

        let mut child = match Command::new("ffmpeg")
            .args(&argv)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                return fail(
                    format!("failed to spawn ffmpeg: {err}"),
                    FailureTag::EngineFailure,
                    argv,
                )
            }
        };

        let stderr = child.stderr.take().expect("stderr is piped");
        let reader_plan = plan.clone();
        let reader_progress = Arc::clone(&progress);
        let reader = tokio::spawn(async move {
            read_stderr(stderr, &reader_plan, reader_progress).await
        });

        // Supervise the child, honouring the cancellation channel.
        let status = tokio::select! {
            status = child.wait() => status,
            _ = cancelled(&mut cancel) => {
                info!(task_id = %plan.task_id, "cancellation requested, stopping ffmpeg");
                shutdown_child(&mut child).await;
                let _ = reader.await;
                remove_partial_output(&plan.output);
                return ExecutionResult {
                    outcome: ExecutionOutcome::Cancelled,
                    output_path: None,
                    argv,
                    started_at,
                    completed_at: Utc::now(),
                    encoder: Some(encoder),
                };
            }
        };

        let stderr_tail = reader.await.unwrap_or_default();

        let status = match status {
            Ok(status) => status,
            Err(err) => {
                return fail(
                    format!("waiting on ffmpeg failed: {err}"),
                    FailureTag::EngineFailure,
                    argv,
                )
            }
        };

        if !status.success() {
            let reason = format!(
                "ffmpeg exited with code {}: {}",
                status.code().map_or_else(|| "?".to_string(), |c| c.to_string()),
                stderr_tail.join(" | ")
            );
            remove_partial_output(&plan.output);
            return fail(reason, FailureTag::EngineFailure, argv);
        }

        // Exit zero is not enough: the output must exist and be non-empty.
        match std::fs::metadata(&plan.output) {
            Ok(meta) if meta.len() > 0 => {}
            _ => {
                return fail(
                    format!("output_missing: {} absent or empty after encode", plan.output.display()),
                    FailureTag::EngineFailure,
                    argv,
                );
            }
        }

        progress(sample(&plan, DeliveryStage::Finalizing, Some(100.0), Some(0.0), None));

        ExecutionResult {
            outcome: ExecutionOutcome::Success,
            output_path: Some(plan.output.clone()),
            argv,
            started_at,
            completed_at: Utc::now(),
            encoder: Some(encoder),
        }
    }
}

impl EncodeEngine for FfmpegAdapter {
    fn engine(&self) -> Engine {
        Engine::Ffmpeg
    }

    fn encode(
        &self,
        plan: EncodePlan,
        cancel: watch::Receiver<bool>,
        progress: ProgressFn,
    ) -> EncodeFuture<'_> {
        Box::pin(self.run(plan, cancel, progress))
    }
}

fn sample(
    plan: &EncodePlan,
    stage: DeliveryStage,
    percent: Option<f64>,
    eta_seconds: Option<f64>,
    encode_fps: Option<f64>,
) -> ProgressSample {
    ProgressSample {
        task_id: plan.task_id.clone(),
        stage,
        percent,
        eta_seconds,
        encode_fps,
    }
}

/// Resolve once the cancellation flag flips to true; pend forever if the
/// sender is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Graceful quit ('q' on stdin), short deadline, then force-kill.
async fn shutdown_child(child: &mut Child) {
    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(b"q").await;
        let _ = stdin.flush().await;
    }

    let deadline = std::time::Duration::from_secs(GRACEFUL_QUIT_SECS);
    if tokio::time::timeout(deadline, child.wait()).await.is_err() {
        warn!("ffmpeg ignored graceful quit, killing");
        let _ = child.kill().await;
    }
}

fn remove_partial_output(output: &Path) {
    if output.exists() {
        if let Err(err) = std::fs::remove_file(output) {
            warn!("failed to remove partial output {}: {err}", output.display());
        }
    }
}

/// Consume stderr: feed progress blocks to the callback (stage transitions
/// and 5% crossings only) and keep a tail of diagnostic lines.
async fn read_stderr(
    stderr: tokio::process::ChildStderr,
    plan: &EncodePlan,
    progress: ProgressFn,
) -> Vec<String> {
    let duration_ms = plan.duration_seconds.map(|d| (d * 1000.0) as i64);
    let mut lines = BufReader::new(stderr).lines();
    let mut state = FfmpegProgress::default();
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut encoding_started = false;
    let mut last_bucket = -1i64;

    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(snapshot) = parse_progress_line(&line, &mut state) {
            if !encoding_started {
                encoding_started = true;
                progress(sample(plan, DeliveryStage::Encoding, None, None, None));
            }

            let percent = snapshot.percentage(duration_ms);
            if let Some(p) = percent {
                let bucket = (p / PROGRESS_STEP_PERCENT) as i64;
                if bucket > last_bucket {
                    last_bucket = bucket;
                    progress(sample(
                        plan,
                        DeliveryStage::Encoding,
                        Some(p),
                        snapshot.eta_seconds(duration_ms),
                        (snapshot.fps > 0.0).then_some(snapshot.fps),
                    ));
                }
            }

            if snapshot.is_complete {
                progress(sample(
                    plan,
                    DeliveryStage::Finalizing,
                    percent,
                    None,
                    None,
                ));
            }
            continue;
        }

        // Non-progress stderr: diagnostics worth keeping for failure reports.
        if line.contains('=') && !line.contains(' ') {
            continue; // stray progress key we do not track
        }
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    tail.into()
}
