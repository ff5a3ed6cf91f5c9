//! Plan generation - planning prompt, gateway call, structured plan

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::PlanGenerationError;
use crate::extraction::WorkerIdExtractor;
use crate::gateway::{CompletionRequest, Gateway};
use crate::registry::WorkerRegistry;

static TIMELINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:timeline|duration|time):?\s*([^\n]+)").expect("static regex"));
static DEPENDENCIES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:dependencies|depends on):?\s*([^\n]+)").expect("static regex")
});
static STEP: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*\d+\.\s*(.+)$").expect("static regex"));
static RISKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:risks?|challenges?):?\s*([^\n]+)").expect("static regex"));

/// An opportunistically extracted plan detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Detail<T> {
    Specified(T),
    NotSpecified,
}

impl<T> Detail<T> {
    pub fn as_option(&self) -> Option<&T> {
        match self {
            Detail::Specified(v) => Some(v),
            Detail::NotSpecified => None,
        }
    }

    pub fn is_specified(&self) -> bool {
        matches!(self, Detail::Specified(_))
    }
}

impl<T> From<Option<T>> for Detail<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Detail::NotSpecified, Detail::Specified)
    }
}

/// What the orchestrator was asked to deliver
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub user_id: String,
    pub user_request: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deliverables: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

impl PlanRequest {
    pub fn new(user_id: impl Into<String>, user_request: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_request: user_request.into(),
            ..Default::default()
        }
    }

    pub fn with_deliverables(mut self, deliverables: Vec<String>) -> Self {
        self.deliverables = deliverables;
        self
    }

    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }
}

/// Validated plan; `worker_ids` is never empty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub raw_plan_text: String,
    pub worker_ids: Vec<String>,
    pub timeline: Detail<String>,
    pub dependencies: Detail<Vec<String>>,
    pub steps: Detail<Vec<String>>,
    pub risks: Detail<Vec<String>>,
}

impl ExecutionPlan {
    /// Build a plan from a planning reply
    pub fn parse(
        raw_plan_text: impl Into<String>,
        extractor: &WorkerIdExtractor,
    ) -> Result<Self, PlanGenerationError> {
        let raw_plan_text = raw_plan_text.into();
        let worker_ids = extractor.extract(&raw_plan_text)?;

        Ok(Self {
            timeline: timeline(&raw_plan_text),
            dependencies: comma_detail(&DEPENDENCIES, &raw_plan_text),
            steps: steps(&raw_plan_text),
            risks: comma_detail(&RISKS, &raw_plan_text),
            worker_ids,
            raw_plan_text,
        })
    }

    /// The worker that owns the result and performs revisions
    pub fn primary_worker(&self) -> Option<&str> {
        self.worker_ids.first().map(String::as_str)
    }
}

fn timeline(text: &str) -> Detail<String> {
    TIMELINE
        .captures(text)
        .map(|c| c[1].trim().to_string())
        .filter(|t| !t.is_empty())
        .into()
}

fn comma_detail(re: &Regex, text: &str) -> Detail<Vec<String>> {
    re.captures(text)
        .map(|c| {
            c[1].split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|v| !v.is_empty())
        .into()
}

fn steps(text: &str) -> Detail<Vec<String>> {
    let steps: Vec<String> = STEP
        .captures_iter(text)
        .map(|c| c[1].trim().to_string())
        .collect();
    if steps.is_empty() {
        Detail::NotSpecified
    } else {
        Detail::Specified(steps)
    }
}

/// Builds planning prompts and turns the replies into [`ExecutionPlan`]s
pub struct PlanGenerator {
    gateway: Arc<dyn Gateway>,
    registry: Arc<WorkerRegistry>,
    orchestrator_id: String,
}

impl PlanGenerator {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        registry: Arc<WorkerRegistry>,
        orchestrator_id: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            registry,
            orchestrator_id: orchestrator_id.into(),
        }
    }

    /// Ask the gateway for a plan and parse it
    ///
    /// Gateway failures propagate unchanged; a reply naming no valid worker
    /// is [`PlanGenerationError::ExtractionFailure`].
    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn generate_plan(
        &self,
        request: &PlanRequest,
    ) -> Result<ExecutionPlan, PlanGenerationError> {
        let system_prompt = self.system_prompt();
        let planning_prompt = self.planning_prompt(request);

        let reply = self
            .gateway
            .generate(CompletionRequest::new(system_prompt, planning_prompt))
            .await
            .map_err(|e| {
                warn!(error = %e, "Planning call failed");
                PlanGenerationError::Gateway(e)
            })?;

        debug!(reply_len = reply.len(), "Received planning reply");

        let extractor =
            WorkerIdExtractor::new(self.registry.list_active(), self.orchestrator_id.as_str());
        let plan = ExecutionPlan::parse(reply, &extractor)?;

        info!(workers = ?plan.worker_ids, "Execution plan created");
        Ok(plan)
    }

    /// Active workers other than the orchestrator, one per line
    fn team_listing(&self) -> String {
        self.registry
            .list_active()
            .into_iter()
            .filter(|d| d.id != self.orchestrator_id)
            .map(|d| format!("- {} ({}): {}", d.id, d.display_name, d.capability_summary))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn team_size(&self) -> usize {
        self.registry
            .list_active()
            .iter()
            .filter(|d| d.id != self.orchestrator_id)
            .count()
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are the orchestrator of a team of specialized workers. Analyze the task \
             and decide which workers are needed to fulfill it.\n\n\
             Your plan should cover:\n\
             1. Task analysis: which capabilities does the task require?\n\
             2. Worker selection: which workers have those capabilities?\n\
             3. Task decomposition and sequencing\n\
             4. Dependencies and prerequisites\n\
             5. Timeline estimate\n\
             6. Risks and mitigations\n\n\
             If the user asks what the team can do, select the workers themselves so \
             their real capabilities are collected. Never assume what a worker can do.\n\n\
             AVAILABLE WORKERS ({count}):\n{team}\n\n\
             REQUIRED FORMAT: your response MUST contain a section exactly like this:\n\
             **SELECTED AGENTS:**\n\
             - <worker-id>\n\
             - <worker-id>\n\n\
             Use the exact ids listed above. Never select {me}.",
            count = self.team_size(),
            team = self.team_listing(),
            me = self.orchestrator_id,
        )
    }

    fn planning_prompt(&self, request: &PlanRequest) -> String {
        let details = serde_json::to_string_pretty(request)
            .unwrap_or_else(|_| request.user_request.clone());

        format!(
            "# Task Orchestration Request\n\n\
             ## Task Details\n{details}\n\n\
             ## Available Workers ({count}, do NOT include {me})\n{team}\n\n\
             ## Required Output\n\
             List the workers you select under a **SELECTED AGENTS:** heading, one \
             `- <id>` per line, followed by the plan. Label the timeline, dependencies \
             and risks (`Timeline:`, `Dependencies:`, `Risks:`) and number the steps.",
            count = self.team_size(),
            me = self.orchestrator_id,
            team = self.team_listing(),
        )
    }
}
