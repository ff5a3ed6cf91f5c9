//! Test doubles for the gateway and workers
//!
//! Compiled for this crate's tests and, with the `test-utils` feature, for
//! downstream test suites.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::GatewayError;
use crate::gateway::{CompletionRequest, Gateway};
use crate::registry::WorkerRegistry;
use crate::worker::{TaskOutcome, Worker, WorkerDescriptor, WorkerTask};

/// Gateway replaying canned replies
///
/// Prompt rules are checked first (a rule fires when its needle appears in
/// the system prompt or the user message); otherwise queued replies are
/// consumed in order. An exhausted script fails the call.
#[derive(Default)]
pub struct ScriptedGateway {
    rules: Mutex<Vec<(String, Result<String, GatewayError>)>>,
    queue: Mutex<VecDeque<Result<String, GatewayError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, reply: impl Into<String>) {
        self.queue.lock().push_back(Ok(reply.into()));
    }

    pub fn push_err(&self, error: GatewayError) {
        self.queue.lock().push_back(Err(error));
    }

    /// Always answer prompts containing `needle` with `reply`
    pub fn on_prompt(&self, needle: impl Into<String>, reply: Result<String, GatewayError>) {
        self.rules.lock().push((needle.into(), reply));
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Gateway for ScriptedGateway {
    async fn generate(&self, request: CompletionRequest) -> Result<String, GatewayError> {
        let matched = self
            .rules
            .lock()
            .iter()
            .find(|(needle, _)| {
                request.system_prompt.contains(needle.as_str())
                    || request.messages.iter().any(|m| m.content.contains(needle.as_str()))
            })
            .map(|(_, reply)| reply.clone());

        self.requests.lock().push(request);

        match matched {
            Some(reply) => reply,
            None => self
                .queue
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(GatewayError::Request("script exhausted".into()))),
        }
    }
}

/// Worker that always succeeds with the same text and logs its tasks
#[derive(Default)]
pub struct StaticWorker {
    output: String,
    tasks: Mutex<Vec<WorkerTask>>,
}

impl StaticWorker {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Tasks received so far
    pub fn tasks(&self) -> Vec<WorkerTask> {
        self.tasks.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.tasks.lock().len()
    }
}

#[async_trait]
impl Worker for StaticWorker {
    async fn handle_task(&self, task: WorkerTask) -> anyhow::Result<TaskOutcome> {
        self.tasks.lock().push(task);
        Ok(TaskOutcome::ok(self.output.clone()))
    }
}

/// Worker that always fails
pub enum FailingWorker {
    /// Returns an unsuccessful outcome
    Reporting(String),
    /// Returns `Err`
    Raising(String),
}

impl FailingWorker {
    pub fn reporting(error: impl Into<String>) -> Self {
        FailingWorker::Reporting(error.into())
    }

    pub fn raising(error: impl Into<String>) -> Self {
        FailingWorker::Raising(error.into())
    }
}

#[async_trait]
impl Worker for FailingWorker {
    async fn handle_task(&self, _task: WorkerTask) -> anyhow::Result<TaskOutcome> {
        match self {
            FailingWorker::Reporting(error) => Ok(TaskOutcome::failed(error.clone())),
            FailingWorker::Raising(error) => Err(anyhow::anyhow!("{error}")),
        }
    }
}

/// Descriptors of the standard test team
pub fn team_descriptors() -> Vec<WorkerDescriptor> {
    vec![
        WorkerDescriptor::new("master-orchestrator", "Master Orchestrator", "Plans and coordinates"),
        WorkerDescriptor::new("researcher", "Researcher", "Information gathering and analysis"),
        WorkerDescriptor::new("communications", "Communications", "Documents and messaging"),
        WorkerDescriptor::new("data-scientist", "Data Scientist", "Statistics and data patterns"),
        WorkerDescriptor::new("project-coordinator", "Project Coordinator", "Timelines and deliverables"),
        WorkerDescriptor::new("reviewer", "Quality Reviewer", "Independent validation"),
    ]
}

/// Registry of the standard test team; every worker answers `"<id> output"`
pub fn team_registry() -> WorkerRegistry {
    let mut registry = WorkerRegistry::new();
    for descriptor in team_descriptors() {
        let output = format!("{} output", descriptor.id);
        registry.register_instance(descriptor, Arc::new(StaticWorker::new(output)));
    }
    registry
}
