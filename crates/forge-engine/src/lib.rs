//! Job lifecycle core.
//!
//! Takes a validated job request, persists it, routes each source clip to
//! the correct encoder, runs encodes under concurrency and license limits,
//! reports honest progress, records an immutable execution timeline, and
//! survives process restarts without duplicating work or silently resuming.

pub mod automation;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod ingest;
pub mod license;
pub mod query;
pub mod recorder;
pub mod recovery;
pub mod reports;
pub mod scanner;
pub mod scheduler;
pub mod stability;
pub mod validator;
pub mod watchfolder;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use heartbeat::WorkerRegistry;
pub use ingest::{CreateJobRequest, FfprobeProber, IngestionService, SourceProber, StaticProber};
pub use license::{resolve_license, LicenseEnforcer, RejectedWorker};
pub use query::{ClipTaskDetail, JobDetail, JobSummary, QueryLayer, ReportReference};
pub use recovery::recover_interrupted_jobs;
pub use scheduler::Scheduler;
pub use watchfolder::WatchFolderEngine;
