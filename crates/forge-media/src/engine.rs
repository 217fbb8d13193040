//! The narrow contract shared by both encode adapters.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use forge_models::{
    AudioCodec, Container, DeliveryStage, Engine, FailureTag, FpsMode, TaskId, VideoCodec,
};

/// Everything an adapter needs to encode one clip. Fully resolved before
/// dispatch; adapters never consult job state.
#[derive(Debug, Clone)]
pub struct EncodePlan {
    pub task_id: TaskId,
    pub source: PathBuf,
    pub output: PathBuf,
    pub codec: VideoCodec,
    pub container: Container,
    pub audio: AudioCodec,
    pub fps: FpsMode,
    /// FFmpeg scale filter derived from the resolution policy.
    pub scale_filter: Option<String>,
    /// Profile-supplied encoder arguments.
    pub extra_args: Vec<String>,
    /// Source duration from the ingest probe; None leaves progress at zero.
    pub duration_seconds: Option<f64>,
    /// Resolve render preset, for the Resolve adapter.
    pub resolve_preset: Option<String>,
}

/// Terminal outcome of one clip encode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ExecutionOutcome {
    Success,
    Failed { reason: String, tag: FailureTag },
    Cancelled,
}

/// Result returned by an adapter, with structured timing for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub outcome: ExecutionOutcome,
    /// Populated output path on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// The exact argv used, recorded for audit (FFmpeg only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub argv: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Effective encoder identifier (e.g. "libx264", "resolve:18.6").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoder: Option<String>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ExecutionOutcome::Success)
    }
}

/// One honest progress observation from an adapter.
///
/// `percent` is None when the encoder gives no usable signal; consumers must
/// not invent a value in that case — the stage alone carries the semantic.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSample {
    pub task_id: TaskId,
    pub stage: DeliveryStage,
    pub percent: Option<f64>,
    pub eta_seconds: Option<f64>,
    pub encode_fps: Option<f64>,
}

/// Callback invoked by adapters on stage transitions and coarse percent
/// crossings.
pub type ProgressFn = Arc<dyn Fn(ProgressSample) + Send + Sync>;

/// Boxed future used for object-safe async dispatch.
pub type EncodeFuture<'a> = Pin<Box<dyn Future<Output = ExecutionResult> + Send + 'a>>;

/// The adapter contract: start the external process, stream progress,
/// honour the cancellation channel and produce a terminal result.
///
/// Adapters never retry and never fall back to another engine.
pub trait EncodeEngine: Send + Sync {
    /// Which engine this adapter drives.
    fn engine(&self) -> Engine;

    /// Encode one clip. Infrastructure failures surface as
    /// `ExecutionOutcome::Failed`, never as a panic.
    fn encode(
        &self,
        plan: EncodePlan,
        cancel: watch::Receiver<bool>,
        progress: ProgressFn,
    ) -> EncodeFuture<'_>;
}
