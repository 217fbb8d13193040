//! Execution-event recording.
//!
//! Recording is a best-effort side observation: it must never raise under
//! any fault. Store errors are logged and swallowed; the in-memory timeline
//! append itself cannot fail.

use tracing::warn;

use forge_models::{EventType, ExecutionEvent, Job, TaskId};
use forge_store::Store;

/// Append an event to a job's in-memory timeline.
///
/// `seq` is the insertion index within the job, breaking instant ties.
pub fn record_event(
    job: &mut Job,
    event_type: EventType,
    clip_id: Option<TaskId>,
    message: Option<String>,
) {
    let seq = job.timeline.len() as u64;
    job.timeline
        .push(ExecutionEvent::new(event_type, seq, clip_id, message));
}

/// Persist a job after a state transition, then record and persist the
/// corresponding timeline event.
///
/// The state commit happens before the event commit, so a post-crash replay
/// of the timeline can never show progress beyond the persisted state.
/// Persistence failures of the *event* are swallowed (observation must not
/// destabilise execution); persistence failures of the *state* are returned.
pub fn persist_then_record(
    store: &Store,
    job: &mut Job,
    event_type: EventType,
    clip_id: Option<TaskId>,
    message: Option<String>,
) -> Result<(), forge_store::StoreError> {
    store.save_job(job)?;
    record_event(job, event_type, clip_id, message);
    if let Err(err) = store.save_job(job) {
        warn!(job_id = %job.id, "failed to persist timeline event: {err}");
    }
    Ok(())
}
