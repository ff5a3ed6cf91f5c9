//! Single-pass revision driven by review feedback

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::{RevisionError, WorkerError};
use crate::plan::ExecutionPlan;
use crate::registry::WorkerRegistry;
use crate::review::ReviewResult;
use crate::worker::WorkerTask;

/// Scores below this are revised
pub const REVISION_THRESHOLD: u8 = 80;

/// Task context tag for revision tasks
pub const REVIEW_INTEGRATION: &str = "review-integration";

/// Where a reviewed result stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionState {
    Reviewed,
    NoRevisionNeeded,
    RevisionNeeded,
    RevisionComplete,
}

impl RevisionState {
    /// `Reviewed` moves on according to the score; other states are settled
    /// or waiting on the revision itself and stay put
    pub fn assess(self, validation_score: u8) -> Self {
        match self {
            RevisionState::Reviewed if needs_revision(validation_score) => {
                RevisionState::RevisionNeeded
            }
            RevisionState::Reviewed => RevisionState::NoRevisionNeeded,
            other => other,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            RevisionState::NoRevisionNeeded | RevisionState::RevisionComplete
        )
    }
}

pub fn needs_revision(validation_score: u8) -> bool {
    validation_score < REVISION_THRESHOLD
}

/// Narrative after the revision step, with its final state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub state: RevisionState,
    pub narrative: String,
}

/// Annotation for a result that passed review
pub fn validated_annotation(narrative: &str, score: u8) -> String {
    format!("{narrative}\n\n**Quality Review:** Validated with score {score}/100")
}

/// Annotation for a revised result
pub fn revised_annotation(revised: &str, score: u8) -> String {
    format!(
        "{revised}\n\n**Quality Review:** Enhanced based on independent validation (Score: {score}/100)"
    )
}

fn integration_prompt(narrative: &str, review: &ReviewResult) -> String {
    let feedback = &review.feedback;
    format!(
        "# Review Feedback Integration\n\n\
         ## Original Results\n{narrative}\n\n\
         ## Review Feedback\n\
         **Overall Assessment:** {assessment}\n\
         **Key Strengths:** {strengths}\n\
         **Improvement Areas:** {improvements}\n\
         **Recommendations:** {recommendations}\n\
         **Integration Strategy:** {strategy}\n\n\
         ## Integration Task\n\
         Revise the original results: keep every strength the review identified, address \
         the improvement areas, and apply the recommendations where appropriate.\n\n\
         This is a revision, not a rewrite. Keep the original structure and core content \
         and return only the revised version.",
        assessment = feedback.overall_assessment,
        strengths = feedback.key_strengths.join(", "),
        improvements = feedback.improvement_areas.join(", "),
        recommendations = feedback.actionable_recommendations.join(", "),
        strategy = feedback.integration_strategy,
    )
}

/// Applies review outcomes to a narrative
pub struct RevisionIntegrator {
    registry: Arc<WorkerRegistry>,
}

impl RevisionIntegrator {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self { registry }
    }

    /// Annotate the narrative, revising it first when the score is too low
    ///
    /// Exactly one revision attempt is made, always by the plan's primary
    /// worker; any failure there is fatal.
    #[instrument(skip_all, fields(score = review.validation_score))]
    pub async fn integrate(
        &self,
        plan: &ExecutionPlan,
        narrative: &str,
        review: &ReviewResult,
    ) -> Result<Revision, RevisionError> {
        let score = review.validation_score;

        match RevisionState::Reviewed.assess(score) {
            RevisionState::RevisionNeeded => {}
            state => {
                info!("Review passed, no revision needed");
                return Ok(Revision {
                    state,
                    narrative: validated_annotation(narrative, score),
                });
            }
        }

        let primary = plan.primary_worker().ok_or(RevisionError::NoPrimaryWorker)?;
        info!(worker_id = %primary, "Revising with review feedback");

        let worker = self
            .registry
            .worker(primary)
            .map_err(RevisionError::PrimaryUnavailable)?;

        let task = WorkerTask::execute(integration_prompt(narrative, review))
            .with_context(REVIEW_INTEGRATION);

        let revised = worker.run(task).await.map_err(|e| {
            warn!(worker_id = %primary, error = %e, "Revision failed");
            let reason = match e {
                WorkerError::Execution { reason, .. } => reason,
                other => other.to_string(),
            };
            RevisionError::WorkerFailed {
                id: primary.to_string(),
                reason,
            }
        })?;

        Ok(Revision {
            state: RevisionState::RevisionComplete,
            narrative: revised_annotation(&revised, score),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::WorkerIdExtractor;
    use crate::review::{QualityMetrics, ReviewFeedback};
    use crate::testing::{FailingWorker, StaticWorker};
    use crate::worker::WorkerDescriptor;

    fn review(score: u8) -> ReviewResult {
        ReviewResult {
            validation_score: score,
            feedback: ReviewFeedback::fallback(score, &["Cite primary sources".to_string()]),
            quality_metrics: QualityMetrics::default(),
            reviewer_confidence: 80,
            alternate_model_used: "gpt-4o".into(),
            recommended_actions: vec![],
            validations: vec![],
        }
    }

    fn setup(worker: Arc<dyn crate::worker::Worker>) -> (RevisionIntegrator, ExecutionPlan) {
        let mut registry = WorkerRegistry::new();
        registry.register_instance(
            WorkerDescriptor::new("researcher", "Researcher", "Research"),
            worker,
        );
        let extractor = WorkerIdExtractor::new(registry.descriptors(), "master-orchestrator");
        let plan = ExecutionPlan::parse("**SELECTED AGENTS:**\n- researcher\n", &extractor).unwrap();
        (RevisionIntegrator::new(Arc::new(registry)), plan)
    }

    #[test]
    fn test_threshold_boundary() {
        assert!(needs_revision(79));
        assert!(!needs_revision(80));
        assert_eq!(RevisionState::Reviewed.assess(79), RevisionState::RevisionNeeded);
        assert_eq!(RevisionState::Reviewed.assess(80), RevisionState::NoRevisionNeeded);
        assert_eq!(
            RevisionState::RevisionComplete.assess(10),
            RevisionState::RevisionComplete
        );
    }

    #[tokio::test]
    async fn test_score_80_is_annotated_without_revision() {
        let worker = Arc::new(StaticWorker::new("revised text"));
        let (integrator, plan) = setup(worker.clone());

        let revision = integrator.integrate(&plan, "draft", &review(80)).await.unwrap();

        assert_eq!(revision.state, RevisionState::NoRevisionNeeded);
        assert_eq!(
            revision.narrative,
            "draft\n\n**Quality Review:** Validated with score 80/100"
        );
        assert_eq!(worker.call_count(), 0);
    }

    #[tokio::test]
    async fn test_score_79_revises_with_primary_worker() {
        let worker = Arc::new(StaticWorker::new("revised text"));
        let (integrator, plan) = setup(worker.clone());

        let revision = integrator.integrate(&plan, "draft", &review(79)).await.unwrap();

        assert_eq!(revision.state, RevisionState::RevisionComplete);
        assert_eq!(
            revision.narrative,
            "revised text\n\n**Quality Review:** Enhanced based on independent validation (Score: 79/100)"
        );

        let tasks = worker.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].payload.context.as_deref(), Some(REVIEW_INTEGRATION));
        assert!(tasks[0].payload.user_request.contains("## Original Results\ndraft"));
        assert!(tasks[0].payload.user_request.contains("Cite primary sources"));
    }

    #[tokio::test]
    async fn test_failed_revision_is_fatal() {
        let (integrator, plan) = setup(Arc::new(FailingWorker::reporting("cannot revise")));
        let err = integrator.integrate(&plan, "draft", &review(40)).await.unwrap_err();
        assert!(matches!(
            err,
            RevisionError::WorkerFailed { ref id, ref reason } if id == "researcher" && reason == "cannot revise"
        ));
    }

    #[tokio::test]
    async fn test_unavailable_primary_is_fatal() {
        let (_, plan) = setup(Arc::new(StaticWorker::new("x")));
        let integrator = RevisionIntegrator::new(Arc::new(WorkerRegistry::new()));
        let err = integrator.integrate(&plan, "draft", &review(40)).await.unwrap_err();
        assert!(matches!(err, RevisionError::PrimaryUnavailable(_)));
    }
}
