//! Engine error types.

use thiserror::Error;

use forge_models::{JobId, JobStatus, LicenseTier, ValidationError};

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Request rejected before any side effect; nothing was persisted.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] forge_store::StoreError),

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("job {job_id} is terminal ({status}); terminal jobs cannot be mutated")]
    TerminalJob { job_id: JobId, status: JobStatus },

    #[error("job {job_id} is not pending (current: {status})")]
    NotPending { job_id: JobId, status: JobStatus },

    #[error("job {job_id} is not running or paused (current: {status})")]
    NotRunning { job_id: JobId, status: JobStatus },

    #[error("no pending job in the queue")]
    NothingPending,

    #[error("job {0} is already running; one job executes at a time")]
    JobAlreadyRunning(JobId),

    #[error("license.worker_limit_exceeded: worker limit reached for license tier {tier} ({current}/{max})")]
    WorkerLimitExceeded {
        tier: LicenseTier,
        current: u32,
        max: u32,
    },
}

impl EngineError {
    /// Whether the caller sent a bad request (4xx-class) as opposed to the
    /// engine failing internally.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            EngineError::Validation(_)
                | EngineError::JobNotFound(_)
                | EngineError::TerminalJob { .. }
                | EngineError::NotPending { .. }
                | EngineError::NotRunning { .. }
                | EngineError::NothingPending
                | EngineError::JobAlreadyRunning(_)
                | EngineError::WorkerLimitExceeded { .. }
        )
    }
}
