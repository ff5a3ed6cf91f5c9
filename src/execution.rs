//! Plan execution with per-worker failure isolation

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::WorkerError;
use crate::events::SessionEvent;
use crate::plan::{ExecutionPlan, PlanRequest};
use crate::registry::WorkerRegistry;
use crate::session::{Session, WorkerExecutionRecord, WorkerOutcome};
use crate::worker::WorkerTask;

/// Worker-specific phrasing of the user's request
pub fn task_instruction(worker_id: &str, user_request: &str) -> String {
    let lead = if worker_id.contains("researcher") {
        "Research and gather comprehensive information about"
    } else if worker_id.contains("data-scientist") {
        "Analyze data patterns and provide statistical insights for"
    } else if worker_id.contains("communications") {
        "Synthesize information and create structured presentation for"
    } else if worker_id.contains("project-coordinator") {
        "Coordinate project timeline and manage deliverables for"
    } else if worker_id.contains("full-stack-developer") {
        "Implement complete technical solution for"
    } else if worker_id.contains("front-end-developer") {
        "Create user interface and front-end components for"
    } else if worker_id.contains("back-end-developer") {
        "Build server infrastructure and APIs for"
    } else if worker_id.contains("music") {
        "Provide music expertise and guidance for"
    } else if worker_id.contains("image") {
        "Generate or process images for"
    } else {
        "Complete specialized task for"
    };
    format!("{lead}: {user_request}")
}

/// Result of running a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub narrative: String,
    /// One record per planned worker, in plan order
    pub records: Vec<WorkerExecutionRecord>,
}

impl ExecutionOutcome {
    pub fn succeeded(&self) -> impl Iterator<Item = &WorkerExecutionRecord> {
        self.records.iter().filter(|r| r.outcome.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &WorkerExecutionRecord> {
        self.records.iter().filter(|r| !r.outcome.is_success())
    }

    pub fn any_succeeded(&self) -> bool {
        self.succeeded().next().is_some()
    }
}

/// Join worker outputs into one narrative
///
/// A lone successful worker with no failures contributes its raw output.
/// Otherwise each output gets a heading with the worker id, and every
/// failed worker gets a one-line note at the end.
pub fn compose_narrative(records: &[WorkerExecutionRecord]) -> String {
    let successes: Vec<(&str, &str)> = records
        .iter()
        .filter_map(|r| match &r.outcome {
            WorkerOutcome::Success(text) => Some((r.worker_id.as_str(), text.as_str())),
            WorkerOutcome::Failure(_) => None,
        })
        .collect();
    let failures: Vec<(&str, &str)> = records
        .iter()
        .filter_map(|r| match &r.outcome {
            WorkerOutcome::Failure(reason) => Some((r.worker_id.as_str(), reason.as_str())),
            WorkerOutcome::Success(_) => None,
        })
        .collect();

    if let ([(_, only)], []) = (successes.as_slice(), failures.as_slice()) {
        return only.to_string();
    }

    let mut sections: Vec<String> = successes
        .iter()
        .map(|(id, text)| format!("## {id}\n\n{text}"))
        .collect();

    if !failures.is_empty() {
        let notes = failures
            .iter()
            .map(|(id, reason)| format!("- {id} failed: {reason}"))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("**Workers that could not complete:**\n{notes}"));
    }

    sections.join("\n\n")
}

/// Runs plans against the registry, one worker at a time
pub struct ExecutionEngine {
    registry: Arc<WorkerRegistry>,
}

impl ExecutionEngine {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self { registry }
    }

    /// Execute every planned worker in order
    ///
    /// Never fails: a missing or failing worker becomes a `Failure` record
    /// and the next worker still runs.
    #[instrument(skip_all, fields(session_id = %session.id, workers = plan.worker_ids.len()))]
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        request: &PlanRequest,
        session: &mut Session,
    ) -> ExecutionOutcome {
        let mut records = Vec::with_capacity(plan.worker_ids.len());

        for worker_id in &plan.worker_ids {
            let instruction = task_instruction(worker_id, &request.user_request);
            let started_at = Utc::now();

            session.emit(SessionEvent::WorkerStarted {
                session_id: session.id,
                worker_id: worker_id.clone(),
                instruction: instruction.clone(),
                at: started_at,
            });

            let outcome = self.run_worker(worker_id, &instruction, request).await;

            let record = WorkerExecutionRecord {
                worker_id: worker_id.clone(),
                instruction_given: instruction,
                outcome,
                started_at,
                completed_at: Utc::now(),
            };
            session.record_worker(record.clone());
            records.push(record);
        }

        let narrative = compose_narrative(&records);
        let succeeded = records.iter().filter(|r| r.outcome.is_success()).count();

        session.note(
            "execution",
            format!(
                "Executed plan with {} workers ({} succeeded)",
                records.len(),
                succeeded
            ),
        );
        info!(succeeded, failed = records.len() - succeeded, "Plan executed");

        ExecutionOutcome { narrative, records }
    }

    async fn run_worker(
        &self,
        worker_id: &str,
        instruction: &str,
        request: &PlanRequest,
    ) -> WorkerOutcome {
        let handle = match self.registry.worker(worker_id) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(worker_id = %worker_id, error = %e, "Worker unavailable");
                return WorkerOutcome::Failure(e.to_string());
            }
        };

        let mut task =
            WorkerTask::execute(instruction).with_deliverables(request.deliverables.clone());
        if let Some(priority) = &request.priority {
            task = task.with_priority(priority.clone());
        }

        match handle.run(task).await {
            Ok(text) => WorkerOutcome::Success(text),
            Err(WorkerError::Execution { reason, .. }) => {
                warn!(worker_id = %worker_id, error = %reason, "Worker failed");
                WorkerOutcome::Failure(reason)
            }
            Err(e) => WorkerOutcome::Failure(e.to_string()),
        }
    }
}
