//! Session log events
//!
//! The append-only record of a run, as written to the session log sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::revision::RevisionState;
use crate::session::{SessionId, SessionStatus, WorkerExecutionRecord};

/// An entry in the session log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        session_id: SessionId,
        user_id: String,
        request: String,
        at: DateTime<Utc>,
    },
    PlanCreated {
        session_id: SessionId,
        worker_ids: Vec<String>,
    },
    WorkerStarted {
        session_id: SessionId,
        worker_id: String,
        instruction: String,
        at: DateTime<Utc>,
    },
    WorkerCompleted {
        session_id: SessionId,
        record: WorkerExecutionRecord,
    },
    ReviewCompleted {
        session_id: SessionId,
        validation_score: u8,
        alternate_model: String,
    },
    RevisionSettled {
        session_id: SessionId,
        state: RevisionState,
    },
    SessionClosed {
        session_id: SessionId,
        status: SessionStatus,
        at: DateTime<Utc>,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            SessionEvent::SessionStarted { session_id, .. }
            | SessionEvent::PlanCreated { session_id, .. }
            | SessionEvent::WorkerStarted { session_id, .. }
            | SessionEvent::WorkerCompleted { session_id, .. }
            | SessionEvent::ReviewCompleted { session_id, .. }
            | SessionEvent::RevisionSettled { session_id, .. }
            | SessionEvent::SessionClosed { session_id, .. } => *session_id,
        }
    }
}
