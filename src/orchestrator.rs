//! Main orchestrator - coordinates plan, execution, review and revision

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::channel::{event_channel, EventSink, EventStream};
use crate::config::{ReviewPolicy, TroupeConfig};
use crate::error::Result;
use crate::events::SessionEvent;
use crate::execution::{ExecutionEngine, ExecutionOutcome};
use crate::gateway::Gateway;
use crate::intent::{
    route, ConversationTurn, IntentAnalysis, IntentClassifier, Route, CAPABILITY_DELIVERABLE,
};
use crate::plan::{ExecutionPlan, PlanGenerator, PlanRequest};
use crate::registry::WorkerRegistry;
use crate::review::{ReviewEngine, ReviewRequest, ReviewResult};
use crate::revision::{RevisionIntegrator, RevisionState};
use crate::session::{Session, SessionId, SessionStatus, WorkerExecutionRecord};
use crate::worker::WorkerTask;

/// Instruction sent to every worker during a capability survey
pub const ELEVATOR_PITCH: &str =
    "Provide a brief one-sentence elevator pitch of your primary capabilities and specializations";

/// Deliverable keywords that make `auto` review a run
const FILE_DELIVERABLES: [&str; 3] = ["file", "document", "report"];

/// Everything a finished run produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationReport {
    pub session_id: SessionId,
    /// Final narrative, annotated when a review ran
    pub narrative: String,
    pub records: Vec<WorkerExecutionRecord>,
    pub plan: ExecutionPlan,
    pub review: Option<ReviewResult>,
    pub revision_state: Option<RevisionState>,
}

/// Where a capability pitch came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PitchSource {
    /// The worker answered itself
    Worker,
    /// The worker failed; the registered summary stands in
    Descriptor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityPitch {
    pub worker_id: String,
    pub display_name: String,
    pub pitch: String,
    pub source: PitchSource,
}

/// Pitches collected from the whole team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySurvey {
    pub pitches: Vec<CapabilityPitch>,
}

impl CapabilitySurvey {
    /// Markdown rendering for the user
    pub fn render(&self) -> String {
        let mut out = String::from("# Team Capability Summary\n\n");
        for p in &self.pitches {
            out.push_str(&format!("**{}:**\n{}\n\n", p.display_name, p.pitch));
        }

        let answered = self
            .pitches
            .iter()
            .filter(|p| p.source == PitchSource::Worker)
            .count();
        out.push_str(&format!(
            "Collected {answered} of {} capability summaries directly from the workers.",
            self.pitches.len()
        ));
        out
    }
}

/// What `handle_message` decided and produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Answer directly; no workers involved
    Direct(IntentAnalysis),
    /// Ask the user for more detail first
    Clarify(IntentAnalysis),
    /// Capability query answered by the workers themselves
    Capabilities {
        analysis: IntentAnalysis,
        survey: CapabilitySurvey,
    },
    /// Full orchestration run
    Orchestrated {
        analysis: IntentAnalysis,
        report: OrchestrationReport,
    },
}

/// The orchestration engine
///
/// Holds the read-only registry and gateway; every run gets its own session.
pub struct Orchestrator {
    config: TroupeConfig,
    registry: Arc<WorkerRegistry>,
    classifier: IntentClassifier,
    planner: PlanGenerator,
    executor: ExecutionEngine,
    reviewer: ReviewEngine,
    integrator: RevisionIntegrator,
    events: EventSink,
}

impl Orchestrator {
    /// Create an orchestrator whose session log goes nowhere
    pub fn new(gateway: Arc<dyn Gateway>, registry: Arc<WorkerRegistry>, config: TroupeConfig) -> Self {
        Self {
            classifier: IntentClassifier::new(Arc::clone(&gateway)),
            planner: PlanGenerator::new(
                Arc::clone(&gateway),
                Arc::clone(&registry),
                config.orchestrator_id.clone(),
            ),
            executor: ExecutionEngine::new(Arc::clone(&registry)),
            reviewer: ReviewEngine::new(gateway, Arc::clone(&registry), &config),
            integrator: RevisionIntegrator::new(Arc::clone(&registry)),
            events: EventSink::disabled(),
            registry,
            config,
        }
    }

    /// Create an orchestrator and return the stream its session log is written to
    pub fn with_event_channel(
        gateway: Arc<dyn Gateway>,
        registry: Arc<WorkerRegistry>,
        config: TroupeConfig,
    ) -> (Self, EventStream) {
        let (sink, stream) = event_channel();
        (Self::new(gateway, registry, config).with_events(sink), stream)
    }

    /// Send the session log to `sink`
    pub fn with_events(mut self, sink: EventSink) -> Self {
        self.events = sink;
        self
    }

    pub fn config(&self) -> &TroupeConfig {
        &self.config
    }

    /// Classify a message and act on the route it takes
    #[instrument(skip(self, message, history), fields(user_id = %user_id))]
    pub async fn handle_message(
        &self,
        user_id: &str,
        message: &str,
        history: &[ConversationTurn],
    ) -> Result<Response> {
        let analysis = self.classifier.classify(message, history).await;

        match route(&analysis, message, history) {
            Route::Direct => {
                debug!("Routing to a direct response");
                Ok(Response::Direct(analysis))
            }
            Route::Clarify => {
                debug!("Routing to clarifying questions");
                Ok(Response::Clarify(analysis))
            }
            Route::Orchestrate
                if analysis
                    .deliverables
                    .iter()
                    .any(|d| d == CAPABILITY_DELIVERABLE) =>
            {
                let survey = self.survey_capabilities().await;
                Ok(Response::Capabilities { analysis, survey })
            }
            Route::Orchestrate => {
                let request = PlanRequest::new(user_id, message)
                    .with_deliverables(analysis.deliverables.clone())
                    .with_priority(analysis.priority.as_str());
                let report = self.run(&request).await?;
                Ok(Response::Orchestrated { analysis, report })
            }
        }
    }

    /// Plan, execute, and (per policy) review and revise one request
    ///
    /// The session is closed either way; a fatal error returns no partial
    /// narrative.
    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn run(&self, request: &PlanRequest) -> Result<OrchestrationReport> {
        let mut session = Session::new(
            request.user_id.clone(),
            request.user_request.clone(),
            request.deliverables.clone(),
            self.events.clone(),
        );

        match self.run_in_session(request, &mut session).await {
            Ok(report) => {
                session.close(SessionStatus::Completed);
                info!(session_id = %session.id, "Orchestration completed");
                Ok(report)
            }
            Err(e) => {
                error!(session_id = %session.id, stage = e.stage(), error = %e, "Orchestration failed");
                session.note(e.stage(), e.to_string());
                session.close(SessionStatus::Failed);
                Err(e)
            }
        }
    }

    async fn run_in_session(
        &self,
        request: &PlanRequest,
        session: &mut Session,
    ) -> Result<OrchestrationReport> {
        let plan = self.planner.generate_plan(request).await?;
        session.emit(SessionEvent::PlanCreated {
            session_id: session.id,
            worker_ids: plan.worker_ids.clone(),
        });
        session.note("plan", format!("Selected workers: {}", plan.worker_ids.join(", ")));

        let outcome = self.executor.execute(&plan, request, session).await;

        if !self.should_review(request, &plan, &outcome) {
            return Ok(OrchestrationReport {
                session_id: session.id,
                narrative: outcome.narrative,
                records: outcome.records,
                plan,
                review: None,
                revision_state: None,
            });
        }

        let review_request = ReviewRequest {
            mission: request.user_request.clone(),
            expected: if request.deliverables.is_empty() {
                "Task completion".to_string()
            } else {
                request.deliverables.join(", ")
            },
            delivered: outcome.narrative.clone(),
            source_worker: plan.primary_worker().unwrap_or("unknown").to_string(),
            model_used: self.config.primary_model.clone(),
        };

        let review = self.reviewer.review(&review_request).await?;
        session.emit(SessionEvent::ReviewCompleted {
            session_id: session.id,
            validation_score: review.validation_score,
            alternate_model: review.alternate_model_used.clone(),
        });
        session.note(
            "review",
            format!(
                "Validated with {} (score {}/100)",
                review.alternate_model_used, review.validation_score
            ),
        );

        let revision = self
            .integrator
            .integrate(&plan, &outcome.narrative, &review)
            .await?;
        session.emit(SessionEvent::RevisionSettled {
            session_id: session.id,
            state: revision.state,
        });

        Ok(OrchestrationReport {
            session_id: session.id,
            narrative: revision.narrative,
            records: outcome.records,
            plan,
            review: Some(review),
            revision_state: Some(revision.state),
        })
    }

    /// Apply the review policy to a finished execution
    ///
    /// A run where no worker succeeded has nothing to review.
    pub fn should_review(
        &self,
        request: &PlanRequest,
        plan: &ExecutionPlan,
        outcome: &ExecutionOutcome,
    ) -> bool {
        if !outcome.any_succeeded() {
            return false;
        }

        match self.config.review {
            ReviewPolicy::Always => true,
            ReviewPolicy::Never => false,
            ReviewPolicy::Auto => {
                let lower = request.user_request.to_lowercase();
                let triggered = self
                    .config
                    .review_triggers
                    .iter()
                    .any(|t| lower.contains(&t.to_lowercase()));
                let several_workers = plan.worker_ids.len() > 1;
                let file_deliverable = request
                    .deliverables
                    .iter()
                    .any(|d| FILE_DELIVERABLES.iter().any(|k| d.contains(k)));

                triggered || several_workers || file_deliverable
            }
        }
    }

    /// Ask every active worker for a one-sentence capability pitch
    ///
    /// A worker that cannot answer is represented by its registered summary.
    #[instrument(skip(self))]
    pub async fn survey_capabilities(&self) -> CapabilitySurvey {
        let mut pitches = Vec::new();

        for descriptor in self.registry.list_active() {
            if descriptor.id == self.config.orchestrator_id {
                continue;
            }

            let answer = match self.registry.worker(&descriptor.id) {
                Ok(worker) => worker.run(WorkerTask::execute(ELEVATOR_PITCH)).await,
                Err(e) => Err(e),
            };

            let (pitch, source) = match answer {
                Ok(text) => (text.trim().to_string(), PitchSource::Worker),
                Err(e) => {
                    warn!(worker_id = %descriptor.id, error = %e, "Capability pitch failed");
                    (descriptor.capability_summary.clone(), PitchSource::Descriptor)
                }
            };

            pitches.push(CapabilityPitch {
                worker_id: descriptor.id.clone(),
                display_name: descriptor.display_name.clone(),
                pitch,
                source,
            });
        }

        info!(workers = pitches.len(), "Capability survey completed");
        CapabilitySurvey { pitches }
    }

    /// List the active team without invoking anyone
    pub fn team_summary(&self) -> String {
        let team: Vec<String> = self
            .registry
            .list_active()
            .into_iter()
            .filter(|d| d.id != self.config.orchestrator_id)
            .map(|d| format!("- **{}**: {}", d.display_name, d.capability_summary))
            .collect();

        format!(
            "# Team Summary\n\n{} specialized workers are available:\n\n{}",
            team.len(),
            team.join("\n")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GatewayError, TroupeError};
    use crate::testing::{team_descriptors, team_registry, FailingWorker, ScriptedGateway, StaticWorker};
    use crate::worker::WorkerDescriptor;

    fn orchestrator(
        gateway: Arc<ScriptedGateway>,
        registry: WorkerRegistry,
        config: TroupeConfig,
    ) -> (Orchestrator, EventStream) {
        Orchestrator::with_event_channel(gateway, Arc::new(registry), config)
    }

    fn review_script(gateway: &ScriptedGateway, score: u32) {
        gateway.on_prompt("# Mission Alignment", Ok(format!("ALIGNMENT_SCORE: {score}")));
        gateway.on_prompt("# Quality Standards", Ok(format!("QUALITY_SCORE: {score}")));
        gateway.on_prompt("# Risk and Gap", Ok(format!("SAFETY_SCORE: {score}")));
        gateway.on_prompt(
            "# Review Feedback",
            Ok("OVERALL_ASSESSMENT: Solid\nIMPROVEMENT_AREAS: Add sources please".into()),
        );
    }

    #[tokio::test]
    async fn test_single_worker_high_score_is_not_revised() {
        let researcher = Arc::new(StaticWorker::new("Tea was first cultivated in China."));
        let mut registry = team_registry();
        registry.register_instance(
            WorkerDescriptor::new("researcher", "Researcher", "Information gathering"),
            researcher.clone(),
        );

        let gateway = Arc::new(ScriptedGateway::new());
        gateway.on_prompt("# Task Orchestration Request", Ok("**SELECTED AGENTS:**\n- researcher\n".into()));
        review_script(&gateway, 95);

        let (orchestrator, mut events) = orchestrator(gateway, registry, TroupeConfig::default());
        let report = orchestrator
            .run(&PlanRequest::new("u1", "Give me a detailed summary of tea history"))
            .await
            .unwrap();

        assert_eq!(
            report.narrative,
            "Tea was first cultivated in China.\n\n**Quality Review:** Validated with score 95/100"
        );
        assert_eq!(report.revision_state, Some(RevisionState::NoRevisionNeeded));
        assert_eq!(report.review.as_ref().map(|r| r.validation_score), Some(95));
        assert_eq!(researcher.call_count(), 1);

        let events = events.drain();
        assert!(matches!(events.first(), Some(SessionEvent::SessionStarted { .. })));
        assert!(matches!(
            events.last(),
            Some(SessionEvent::SessionClosed { status: SessionStatus::Completed, .. })
        ));
        assert!(events
            .iter()
            .all(|e| e.session_id() == report.session_id));
    }

    #[tokio::test]
    async fn test_low_score_revises_with_primary_worker() {
        let researcher = Arc::new(StaticWorker::new("revised findings"));
        let mut registry = team_registry();
        registry.register_instance(
            WorkerDescriptor::new("researcher", "Researcher", "Information gathering"),
            researcher.clone(),
        );

        let gateway = Arc::new(ScriptedGateway::new());
        gateway.on_prompt(
            "# Task Orchestration Request",
            Ok("**SELECTED AGENTS:**\n- researcher\n- communications\n".into()),
        );
        review_script(&gateway, 60);

        let (orchestrator, _events) = orchestrator(gateway, registry, TroupeConfig::default());
        let report = orchestrator
            .run(&PlanRequest::new("u1", "Tell me about tea"))
            .await
            .unwrap();

        assert_eq!(report.revision_state, Some(RevisionState::RevisionComplete));
        assert!(report.narrative.starts_with("revised findings"));
        assert!(report.narrative.ends_with("(Score: 60/100)"));
        assert_eq!(researcher.call_count(), 2);
        assert_eq!(report.records.len(), 2);
    }

    #[tokio::test]
    async fn test_plan_failure_closes_session_as_failed() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_ok("No idea who should do this.");

        let (orchestrator, mut events) =
            orchestrator(gateway, team_registry(), TroupeConfig::default());
        let err = orchestrator
            .run(&PlanRequest::new("u1", "Something vague"))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), "planning");
        assert!(matches!(
            events.drain().last(),
            Some(SessionEvent::SessionClosed { status: SessionStatus::Failed, .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_reviewer_is_fatal() {
        let mut registry = WorkerRegistry::new();
        for descriptor in team_descriptors()
            .into_iter()
            .filter(|d| d.id != "reviewer")
        {
            let output = format!("{} output", descriptor.id);
            registry.register_instance(descriptor, Arc::new(StaticWorker::new(output)));
        }

        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_ok("**SELECTED AGENTS:**\n- researcher\n- data-scientist\n");

        let (orchestrator, _events) = orchestrator(gateway, registry, TroupeConfig::default());
        let err = orchestrator
            .run(&PlanRequest::new("u1", "Crunch the churn numbers"))
            .await
            .unwrap_err();
        assert!(matches!(err, TroupeError::Review(_)));
    }

    #[tokio::test]
    async fn test_review_policy() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_ok("**SELECTED AGENTS:**\n- communications\n");

        let config = TroupeConfig {
            review: ReviewPolicy::Never,
            ..TroupeConfig::default()
        };
        let (orchestrator, _events) = orchestrator(gateway.clone(), team_registry(), config);
        let report = orchestrator
            .run(&PlanRequest::new("u1", "Write a detailed report"))
            .await
            .unwrap();

        assert!(report.review.is_none());
        assert_eq!(report.narrative, "communications output");
        assert_eq!(gateway.call_count(), 1);
    }

    #[test]
    fn test_auto_review_triggers() {
        let (orchestrator, _events) = orchestrator(
            Arc::new(ScriptedGateway::new()),
            team_registry(),
            TroupeConfig::default(),
        );
        let registry = team_registry();
        let extractor =
            crate::extraction::WorkerIdExtractor::new(registry.descriptors(), "master-orchestrator");
        let single = ExecutionPlan::parse("**SELECTED AGENTS:**\n- researcher\n", &extractor).unwrap();
        let double = ExecutionPlan::parse(
            "**SELECTED AGENTS:**\n- researcher\n- communications\n",
            &extractor,
        )
        .unwrap();

        let ok = |ids: &[&str]| ExecutionOutcome {
            narrative: "x".into(),
            records: ids
                .iter()
                .map(|id| WorkerExecutionRecord {
                    worker_id: id.to_string(),
                    instruction_given: "i".into(),
                    outcome: crate::session::WorkerOutcome::Success("x".into()),
                    started_at: chrono::Utc::now(),
                    completed_at: chrono::Utc::now(),
                })
                .collect(),
        };

        let plain = PlanRequest::new("u1", "hello there");
        assert!(!orchestrator.should_review(&plain, &single, &ok(&["researcher"])));
        assert!(orchestrator.should_review(
            &PlanRequest::new("u1", "A Comprehensive look"),
            &single,
            &ok(&["researcher"])
        ));
        assert!(orchestrator.should_review(&plain, &double, &ok(&["researcher"])));
        assert!(orchestrator.should_review(
            &plain.clone().with_deliverables(vec!["word-document".into()]),
            &single,
            &ok(&["researcher"])
        ));
        assert!(!orchestrator.should_review(
            &PlanRequest::new("u1", "A comprehensive look"),
            &single,
            &ok(&[])
        ));
    }

    #[tokio::test]
    async fn test_capability_query_surveys_the_team() {
        let mut registry = team_registry();
        registry.register_instance(
            WorkerDescriptor::new("data-scientist", "Data Scientist", "Statistics and data patterns"),
            Arc::new(FailingWorker::raising("model offline")),
        );

        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_ok("COMPLEXITY: low\nORCHESTRATION: no");

        let (orchestrator, _events) = orchestrator(gateway, registry, TroupeConfig::default());
        let response = orchestrator
            .handle_message("u1", "What agents are on the team?", &[])
            .await
            .unwrap();

        let Response::Capabilities { analysis, survey } = response else {
            panic!("expected a capability survey");
        };
        assert!(analysis.requires_orchestration);
        assert_eq!(survey.pitches.len(), 5);
        assert!(survey.pitches.iter().all(|p| p.worker_id != "master-orchestrator"));

        let scientist = survey
            .pitches
            .iter()
            .find(|p| p.worker_id == "data-scientist")
            .unwrap();
        assert_eq!(scientist.source, PitchSource::Descriptor);
        assert_eq!(scientist.pitch, "Statistics and data patterns");
        assert!(survey.render().contains("Collected 4 of 5"));
    }

    #[tokio::test]
    async fn test_simple_message_routes_direct() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.push_err(GatewayError::Request("offline".into()));

        let (orchestrator, _events) =
            orchestrator(gateway, team_registry(), TroupeConfig::default());
        let response = orchestrator.handle_message("u1", "hello", &[]).await.unwrap();
        assert!(matches!(response, Response::Direct(_)));
    }

    #[test]
    fn test_team_summary_excludes_orchestrator() {
        let (orchestrator, _events) = orchestrator(
            Arc::new(ScriptedGateway::new()),
            team_registry(),
            TroupeConfig::default(),
        );
        let summary = orchestrator.team_summary();
        assert!(summary.contains("5 specialized workers"));
        assert!(summary.contains("- **Researcher**: Information gathering and analysis"));
        assert!(!summary.contains("Master Orchestrator"));
    }
}
