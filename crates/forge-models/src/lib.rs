//! Shared data models for the Forge backend.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, clip tasks and their status machines
//! - Frozen deliver-settings snapshots and override layers
//! - Execution timeline events
//! - Worker status and license tiers
//! - Watch folder configuration and file stability checks
//! - The operator-facing JobSpec JSON schema
//! - The validation/execution failure taxonomy

pub mod event;
pub mod ids;
pub mod job;
pub mod jobspec;
pub mod license;
pub mod settings;
pub mod task;
pub mod taxonomy;
pub mod watchfolder;
pub mod worker;

// Re-export common types
pub use event::{EventType, ExecutionEvent};
pub use ids::{JobId, TaskId, WatchFolderId};
pub use job::{Job, JobCounters, JobStatus, SkipMetadata};
pub use jobspec::{JobSpec, JOBSPEC_VERSION};
pub use license::{License, LicenseTier};
pub use settings::{
    AudioCodec, AudioSettings, Container, DeliverSettings, Engine, FileSettings, FpsMode,
    ResolutionPolicy, ResolveEdition, VideoCodec, VideoSettings,
};
pub use task::{ClipTask, DeliveryStage, MediaMetadata, TaskStatus};
pub use taxonomy::{FailureTag, ValidationError};
pub use watchfolder::{FileStabilityCheck, ProcessedFile, WatchFolder};
pub use worker::{WorkerState, WorkerStatus};
