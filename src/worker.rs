//! Worker boundary - a single specialized unit of work

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::WorkerError;

/// Task kind the orchestration core issues
pub const EXECUTE_TASK: &str = "execute-task";

/// Availability of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Active,
    Inactive,
}

/// Static description of a worker, fixed at registry load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerDescriptor {
    /// Unique, stable identifier
    pub id: String,
    pub display_name: String,
    /// One-line capability summary used in planning prompts
    pub capability_summary: String,
    pub status: WorkerStatus,
}

impl WorkerDescriptor {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        capability_summary: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            capability_summary: capability_summary.into(),
            status: WorkerStatus::Active,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.status = WorkerStatus::Inactive;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == WorkerStatus::Active
    }
}

/// Payload of a worker task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    /// The synthesized instruction
    pub user_request: String,
    /// Free-form context tag, e.g. `review-integration`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_deliverables: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

/// A task handed to a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerTask {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: TaskPayload,
}

impl WorkerTask {
    /// An `execute-task` carrying the given instruction
    pub fn execute(instruction: impl Into<String>) -> Self {
        Self {
            kind: EXECUTE_TASK.to_string(),
            payload: TaskPayload {
                user_request: instruction.into(),
                ..Default::default()
            },
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.payload.context = Some(context.into());
        self
    }

    pub fn with_deliverables(mut self, deliverables: Vec<String>) -> Self {
        self.payload.required_deliverables = deliverables;
        self
    }

    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.payload.priority = Some(priority.into());
        self
    }
}

/// What a worker reports back
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn ok(result: impl Into<String>) -> Self {
        Self {
            success: true,
            result: Some(result.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// A worker: accepts a task, returns text or fails.
///
/// Returning `Err` is the equivalent of the worker throwing; the core records
/// it the same way as an unsuccessful [`TaskOutcome`].
#[async_trait]
pub trait Worker: Send + Sync {
    async fn handle_task(&self, task: WorkerTask) -> anyhow::Result<TaskOutcome>;
}

/// Handle pairing a live worker with its descriptor
#[derive(Clone)]
pub struct WorkerHandle {
    descriptor: Arc<WorkerDescriptor>,
    inner: Arc<dyn Worker>,
}

impl WorkerHandle {
    pub fn new(descriptor: Arc<WorkerDescriptor>, worker: Arc<dyn Worker>) -> Self {
        Self {
            descriptor,
            inner: worker,
        }
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn descriptor(&self) -> &WorkerDescriptor {
        &self.descriptor
    }

    /// Run a task and collapse every failure shape into [`WorkerError::Execution`]
    ///
    /// A successful outcome with no (or blank) result counts as a failure.
    #[instrument(skip(self, task), fields(worker_id = %self.descriptor.id))]
    pub async fn run(&self, task: WorkerTask) -> Result<String, WorkerError> {
        debug!(kind = %task.kind, "Dispatching task to worker");

        let outcome = match self.inner.handle_task(task).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Worker raised an error");
                return Err(self.execution_error(format!("{e:#}")));
            }
        };

        if !outcome.success {
            let reason = outcome
                .error
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(self.execution_error(reason));
        }

        match outcome.result {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(self.execution_error("worker returned an empty result".to_string())),
        }
    }

    fn execution_error(&self, reason: String) -> WorkerError {
        WorkerError::Execution {
            id: self.descriptor.id.clone(),
            reason,
        }
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.descriptor.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingWorker, StaticWorker};

    fn handle(worker: Arc<dyn Worker>) -> WorkerHandle {
        let descriptor = Arc::new(WorkerDescriptor::new("researcher", "Researcher", "Research"));
        WorkerHandle::new(descriptor, worker)
    }

    #[test]
    fn test_task_serializes_type_field() {
        let task = WorkerTask::execute("do it").with_context("review-integration");
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["type"], "execute-task");
        assert_eq!(json["payload"]["user_request"], "do it");
        assert_eq!(json["payload"]["context"], "review-integration");
    }

    #[tokio::test]
    async fn test_run_success() {
        let h = handle(Arc::new(StaticWorker::new("findings")));
        let out = h.run(WorkerTask::execute("x")).await;
        assert_eq!(out.unwrap(), "findings");
    }

    #[tokio::test]
    async fn test_run_collapses_failures() {
        let h = handle(Arc::new(FailingWorker::reporting("quota exceeded")));
        let err = h.run(WorkerTask::execute("x")).await.unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));

        let h = handle(Arc::new(FailingWorker::raising("connection reset")));
        let err = h.run(WorkerTask::execute("x")).await.unwrap_err();
        assert!(err.to_string().contains("connection reset"));

        let h = handle(Arc::new(StaticWorker::new("   ")));
        let err = h.run(WorkerTask::execute("x")).await.unwrap_err();
        assert!(err.to_string().contains("empty result"));
    }
}
