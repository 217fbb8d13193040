//! Execution timeline events.
//!
//! Events are immutable once recorded. They are append-only observations of
//! what occurred; they never drive execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::TaskId;

/// Types of observable execution events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    JobCreated,
    ExecutionStarted,
    ExecutionPaused,
    ExecutionResumed,
    ExecutionCancelled,
    ExecutionCompleted,
    ExecutionFailed,
    ClipQueued,
    ClipStarted,
    ClipCompleted,
    ClipFailed,
    EngineSelected,
    /// Recorded only on stage transitions and coarse percent crossings,
    /// not on every encoder tick.
    ProgressUpdate,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::JobCreated => "job_created",
            EventType::ExecutionStarted => "execution_started",
            EventType::ExecutionPaused => "execution_paused",
            EventType::ExecutionResumed => "execution_resumed",
            EventType::ExecutionCancelled => "execution_cancelled",
            EventType::ExecutionCompleted => "execution_completed",
            EventType::ExecutionFailed => "execution_failed",
            EventType::ClipQueued => "clip_queued",
            EventType::ClipStarted => "clip_started",
            EventType::ClipCompleted => "clip_completed",
            EventType::ClipFailed => "clip_failed",
            EventType::EngineSelected => "engine_selected",
            EventType::ProgressUpdate => "progress_update",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "job_created" => Some(EventType::JobCreated),
            "execution_started" => Some(EventType::ExecutionStarted),
            "execution_paused" => Some(EventType::ExecutionPaused),
            "execution_resumed" => Some(EventType::ExecutionResumed),
            "execution_cancelled" => Some(EventType::ExecutionCancelled),
            "execution_completed" => Some(EventType::ExecutionCompleted),
            "execution_failed" => Some(EventType::ExecutionFailed),
            "clip_queued" => Some(EventType::ClipQueued),
            "clip_started" => Some(EventType::ClipStarted),
            "clip_completed" => Some(EventType::ClipCompleted),
            "clip_failed" => Some(EventType::ClipFailed),
            "engine_selected" => Some(EventType::EngineSelected),
            "progress_update" => Some(EventType::ProgressUpdate),
            _ => None,
        }
    }

    /// Whether this event type closes a job's timeline.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventType::ExecutionCompleted
                | EventType::ExecutionFailed
                | EventType::ExecutionCancelled
        )
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One immutable timeline record.
///
/// Ordering within a job is by recorded instant; `seq` breaks ties by
/// insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub event_id: String,
    pub event_type: EventType,
    pub recorded_at: DateTime<Utc>,
    /// Insertion order within the owning job.
    pub seq: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip_id: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ExecutionEvent {
    pub fn new(
        event_type: EventType,
        seq: u64,
        clip_id: Option<TaskId>,
        message: Option<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event_type,
            recorded_at: Utc::now(),
            seq,
            clip_id,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_round_trip() {
        for et in [
            EventType::JobCreated,
            EventType::ExecutionStarted,
            EventType::ProgressUpdate,
            EventType::ClipFailed,
        ] {
            assert_eq!(EventType::parse(et.as_str()), Some(et));
        }
        assert_eq!(EventType::parse("job_resurrected"), None);
    }

    #[test]
    fn test_terminal_events() {
        assert!(EventType::ExecutionCompleted.is_terminal());
        assert!(EventType::ExecutionCancelled.is_terminal());
        assert!(!EventType::ExecutionPaused.is_terminal());
        assert!(!EventType::ClipFailed.is_terminal());
    }

    #[test]
    fn test_event_serde_round_trip() {
        let event = ExecutionEvent::new(
            EventType::ClipStarted,
            3,
            Some(TaskId::from_string("t-1")),
            Some("clip 1/2".to_string()),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: ExecutionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
