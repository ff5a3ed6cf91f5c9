//! Session management for a single orchestration run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channel::EventSink;
use crate::events::SessionEvent;

/// Unique id of an orchestration session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Failed,
}

/// How one worker invocation ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum WorkerOutcome {
    Success(String),
    Failure(String),
}

impl WorkerOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, WorkerOutcome::Success(_))
    }
}

/// One worker's participation in a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerExecutionRecord {
    pub worker_id: String,
    pub instruction_given: String,
    pub outcome: WorkerOutcome,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// A note written by the orchestrator itself (plan, review, revision)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorRecord {
    pub stage: String,
    pub summary: String,
    pub at: DateTime<Utc>,
}

/// Entry in a session's interaction log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Interaction {
    Worker(WorkerExecutionRecord),
    Orchestrator(OrchestratorRecord),
}

/// A single orchestration run's session
///
/// Owned by exactly one run; every append is mirrored to the event sink.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub user_id: String,
    pub request: String,
    pub started_at: DateTime<Utc>,
    pub deliverables: Vec<String>,
    interactions: Vec<Interaction>,
    completed_at: Option<DateTime<Utc>>,
    status: SessionStatus,
    sink: EventSink,
}

impl Session {
    /// Open a new session
    pub fn new(
        user_id: impl Into<String>,
        request: impl Into<String>,
        deliverables: Vec<String>,
        sink: EventSink,
    ) -> Self {
        let id = SessionId::new();
        let user_id = user_id.into();
        let request = request.into();
        let started_at = Utc::now();

        info!(session_id = %id, user_id = %user_id, "Opening session");

        sink.emit(SessionEvent::SessionStarted {
            session_id: id,
            user_id: user_id.clone(),
            request: request.clone(),
            at: started_at,
        });

        Self {
            id,
            user_id,
            request,
            started_at,
            deliverables,
            interactions: Vec::new(),
            completed_at: None,
            status: SessionStatus::Active,
            sink,
        }
    }

    /// Append a worker record
    pub fn record_worker(&mut self, record: WorkerExecutionRecord) {
        debug!(
            session_id = %self.id,
            worker_id = %record.worker_id,
            success = record.outcome.is_success(),
            "Recording worker interaction"
        );

        self.sink.emit(SessionEvent::WorkerCompleted {
            session_id: self.id,
            record: record.clone(),
        });
        self.interactions.push(Interaction::Worker(record));
    }

    /// Append an orchestrator-level note
    pub fn note(&mut self, stage: impl Into<String>, summary: impl Into<String>) {
        self.interactions.push(Interaction::Orchestrator(OrchestratorRecord {
            stage: stage.into(),
            summary: summary.into(),
            at: Utc::now(),
        }));
    }

    /// Forward an event to the session log
    pub fn emit(&self, event: SessionEvent) {
        self.sink.emit(event);
    }

    /// Close the session; closing twice keeps the first result
    pub fn close(&mut self, status: SessionStatus) {
        if self.completed_at.is_some() {
            warn!(session_id = %self.id, "Session already closed");
            return;
        }

        let at = Utc::now();
        self.completed_at = Some(at);
        self.status = status;

        self.sink.emit(SessionEvent::SessionClosed {
            session_id: self.id,
            status,
            at,
        });

        info!(session_id = %self.id, status = ?status, "Closed session");
    }

    pub fn interactions(&self) -> &[Interaction] {
        &self.interactions
    }

    /// Worker records in the order they were appended
    pub fn worker_records(&self) -> impl Iterator<Item = &WorkerExecutionRecord> {
        self.interactions.iter().filter_map(|i| match i {
            Interaction::Worker(record) => Some(record),
            Interaction::Orchestrator(_) => None,
        })
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_closed(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::event_channel;

    fn record(worker_id: &str, outcome: WorkerOutcome) -> WorkerExecutionRecord {
        let now = Utc::now();
        WorkerExecutionRecord {
            worker_id: worker_id.to_string(),
            instruction_given: "do the thing".to_string(),
            outcome,
            started_at: now,
            completed_at: now,
        }
    }

    #[test]
    fn test_session_creation() {
        let (sink, mut stream) = event_channel();
        let session = Session::new("user-1", "write a report", vec![], sink);

        assert_eq!(session.status(), SessionStatus::Active);
        assert!(session.interactions().is_empty());
        assert!(matches!(
            stream.try_recv(),
            Some(SessionEvent::SessionStarted { ref user_id, .. }) if user_id == "user-1"
        ));
    }

    #[test]
    fn test_records_are_appended_and_emitted() {
        let (sink, mut stream) = event_channel();
        let mut session = Session::new("u", "r", vec![], sink);
        stream.drain();

        session.record_worker(record("researcher", WorkerOutcome::Success("ok".into())));
        session.note("plan", "2 workers");
        session.record_worker(record("communications", WorkerOutcome::Failure("no".into())));

        assert_eq!(session.interactions().len(), 3);
        let ids: Vec<_> = session.worker_records().map(|r| r.worker_id.as_str()).collect();
        assert_eq!(ids, vec!["researcher", "communications"]);

        let events = stream.drain();
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|e| matches!(e, SessionEvent::WorkerCompleted { .. })));
    }

    #[test]
    fn test_close_once() {
        let (sink, mut stream) = event_channel();
        let mut session = Session::new("u", "r", vec![], sink);

        session.close(SessionStatus::Failed);
        session.close(SessionStatus::Completed);

        assert!(session.is_closed());
        assert_eq!(session.status(), SessionStatus::Failed);
        let closes = stream
            .drain()
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::SessionClosed { .. }))
            .count();
        assert_eq!(closes, 1);
    }
}
