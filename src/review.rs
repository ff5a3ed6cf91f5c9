//! Independent review of an execution result
//!
//! The reviewer re-validates the delivered narrative with an alternate model
//! across three structured prompts, averages their scores and asks for one
//! consolidated feedback object.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::TroupeConfig;
use crate::error::ReviewError;
use crate::gateway::{CompletionRequest, Gateway};
use crate::labels;
use crate::registry::WorkerRegistry;

/// Score used when no validation reply carries a number
pub const DEFAULT_SCORE: u8 = 75;

const MAX_RECOMMENDATIONS: usize = 5;

static SCORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:SCORE|LEVEL)[*_]*[ \t]*:[*_ \t\[]*(\d+)").expect("static regex"));
static METRIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\w+)[*_]*[ \t]*:[*_ \t\[]*(\d+)").expect("static regex"));
static RECOMMENDATIONS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i:RECOMMENDATIONS?|SUGGESTIONS?|IMPROVEMENTS?):[ \t]*([^\n]*(?:\n[^A-Z\n][^\n]*)*)")
        .expect("static regex")
});

/// What the reviewer is asked to check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub mission: String,
    pub expected: String,
    pub delivered: String,
    pub source_worker: String,
    pub model_used: String,
}

/// The three independent validation passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationKind {
    MissionAlignment,
    QualityStandards,
    RiskAnalysis,
}

impl ValidationKind {
    pub const ALL: [ValidationKind; 3] = [
        ValidationKind::MissionAlignment,
        ValidationKind::QualityStandards,
        ValidationKind::RiskAnalysis,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ValidationKind::MissionAlignment => "mission-alignment",
            ValidationKind::QualityStandards => "quality-standards",
            ValidationKind::RiskAnalysis => "risk-analysis",
        }
    }

    fn prompt(&self, request: &ReviewRequest) -> String {
        match self {
            ValidationKind::MissionAlignment => format!(
                "# Mission Alignment Validation\n\n\
                 ## Original Mission\n{mission}\n\n\
                 ## Expected Results\n{expected}\n\n\
                 ## Actual Deliverables\n{delivered}\n\n\
                 ## Source Worker\n{source}\n\n\
                 ## Validation Task\n\
                 As an independent reviewer, assess how well the deliverables align with the \
                 mission and the expected results: completeness, accuracy, relevance, quality \
                 and usability.\n\n\
                 **Output Format:**\n\
                 ALIGNMENT_SCORE: [0-100]\n\
                 COMPLETENESS_ANALYSIS: [assessment]\n\
                 ACCURACY_VERIFICATION: [fact-checking results]\n\
                 RELEVANCE_EVALUATION: [mission alignment]\n\
                 USABILITY_REVIEW: [practical applicability]\n\
                 IMPROVEMENT_RECOMMENDATIONS: [specific recommendations]",
                mission = request.mission,
                expected = request.expected,
                delivered = request.delivered,
                source = request.source_worker,
            ),
            ValidationKind::QualityStandards => format!(
                "# Quality Standards Validation\n\n\
                 ## Deliverable\n{delivered}\n\n\
                 ## Validation Task\n\
                 Evaluate the deliverable against professional standards: structure, depth, \
                 presentation, practical value, and factual or logical errors.\n\n\
                 **Output Format:**\n\
                 QUALITY_SCORE: [0-100]\n\
                 STRUCTURAL_ANALYSIS: [organization and flow]\n\
                 CONTENT_EVALUATION: [depth and coverage]\n\
                 PRESENTATION_REVIEW: [professional standards]\n\
                 ERROR_DETECTION: [issues found]\n\
                 ENHANCEMENT_SUGGESTIONS: [specific improvements]",
                delivered = request.delivered,
            ),
            ValidationKind::RiskAnalysis => format!(
                "# Risk and Gap Analysis\n\n\
                 ## Mission Context\n{mission}\n\n\
                 ## Delivered Output\n{delivered}\n\n\
                 ## Assessment Task\n\
                 Identify missing elements, unverified claims, usability barriers and scope \
                 mismatches, with mitigations.\n\n\
                 **Output Format:**\n\
                 RISK_LEVEL: [low|medium|high]\n\
                 SAFETY_SCORE: [0-100, higher means fewer risks]\n\
                 COMPLETENESS_GAPS: [missing elements]\n\
                 ACCURACY_CONCERNS: [factual or methodological issues]\n\
                 MITIGATION_SUGGESTIONS: [risk reduction steps]\n\
                 NEXT_STEPS: [follow-up actions]",
                mission = request.mission,
                delivered = request.delivered,
            ),
        }
    }
}

/// Raw text of one validation pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub kind: ValidationKind,
    /// The reply, or `Validation error: ...` when the call failed
    pub text: String,
    pub succeeded: bool,
}

impl ValidationReport {
    fn score(&self) -> Option<u32> {
        if !self.succeeded {
            return None;
        }
        SCORE
            .captures(&self.text)
            .and_then(|c| c[1].parse::<u32>().ok())
    }

    /// Long enough to count as a real analysis
    fn is_substantive(&self) -> bool {
        self.text.len() > 100 && !self.text.contains("error")
    }
}

/// Consolidated reviewer feedback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewFeedback {
    pub overall_assessment: String,
    pub key_strengths: Vec<String>,
    pub improvement_areas: Vec<String>,
    pub actionable_recommendations: Vec<String>,
    pub integration_strategy: String,
}

impl ReviewFeedback {
    /// Feedback built without the synthesis call
    pub fn fallback(score: u8, recommendations: &[String]) -> Self {
        Self {
            overall_assessment: format!("Validation completed with score: {score}/100"),
            key_strengths: vec!["Output was delivered as requested".to_string()],
            improvement_areas: recommendations.to_vec(),
            actionable_recommendations: vec![
                "Review validation details for specific improvement opportunities".to_string(),
            ],
            integration_strategy:
                "Consider incorporating validation feedback through targeted revisions".to_string(),
        }
    }

    /// Parse a synthesis reply; every missing field keeps its fallback value
    pub fn parse(reply: &str, score: u8, recommendations: &[String]) -> Self {
        let mut feedback = Self::fallback(score, recommendations);

        if let Some(v) = labels::section(reply, "OVERALL_ASSESSMENT") {
            feedback.overall_assessment = v;
        }
        if let Some(v) = list_section(reply, "KEY_STRENGTHS") {
            feedback.key_strengths = v;
        }
        if let Some(v) = list_section(reply, "IMPROVEMENT_AREAS") {
            feedback.improvement_areas = v;
        }
        if let Some(v) = list_section(reply, "ACTIONABLE_RECOMMENDATIONS") {
            feedback.actionable_recommendations = v;
        }
        if let Some(v) = labels::section(reply, "INTEGRATION_STRATEGY") {
            feedback.integration_strategy = v;
        }

        feedback
    }
}

fn list_section(reply: &str, label: &str) -> Option<Vec<String>> {
    labels::section(reply, label)
        .map(|v| labels::items(&v))
        .filter(|items| !items.is_empty())
}

/// Per-dimension scores, 0-100 each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub completeness: u8,
    pub accuracy: u8,
    pub usability: u8,
    pub professionalism: u8,
    pub alignment: u8,
}

impl Default for QualityMetrics {
    fn default() -> Self {
        Self {
            completeness: DEFAULT_SCORE,
            accuracy: DEFAULT_SCORE,
            usability: DEFAULT_SCORE,
            professionalism: DEFAULT_SCORE,
            alignment: DEFAULT_SCORE,
        }
    }
}

impl QualityMetrics {
    /// Read `<NAME>[_SCORE]: <n>` lines; later reports override earlier ones
    pub fn from_reports(reports: &[ValidationReport]) -> Self {
        let mut metrics = Self::default();

        for report in reports.iter().filter(|r| r.succeeded) {
            for caps in METRIC.captures_iter(&report.text) {
                let Ok(value) = caps[2].parse::<u32>() else {
                    continue;
                };
                let value = clamp_score(value);
                let name = caps[1].to_lowercase();

                if name.contains("complete") {
                    metrics.completeness = value;
                }
                if name.contains("accura") {
                    metrics.accuracy = value;
                }
                if name.contains("usab") {
                    metrics.usability = value;
                }
                if name.contains("quality") || name.contains("professional") {
                    metrics.professionalism = value;
                }
                if name.contains("align") {
                    metrics.alignment = value;
                }
            }
        }

        metrics
    }
}

/// Outcome of a review cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub validation_score: u8,
    pub feedback: ReviewFeedback,
    pub quality_metrics: QualityMetrics,
    pub reviewer_confidence: u8,
    pub alternate_model_used: String,
    pub recommended_actions: Vec<String>,
    pub validations: Vec<ValidationReport>,
}

fn clamp_score(value: u32) -> u8 {
    value.min(100) as u8
}

/// Rounded mean of the parsed scores, [`DEFAULT_SCORE`] if none parsed
pub fn average_score(reports: &[ValidationReport]) -> u8 {
    let scores: Vec<u32> = reports.iter().filter_map(ValidationReport::score).collect();
    if scores.is_empty() {
        return DEFAULT_SCORE;
    }
    let mean = scores.iter().map(|s| f64::from(*s)).sum::<f64>() / scores.len() as f64;
    clamp_score(mean.round() as u32)
}

/// `50 + 50 * substantive / total`, within 50-100
pub fn reviewer_confidence(reports: &[ValidationReport]) -> u8 {
    if reports.is_empty() {
        return 50;
    }
    let substantive = reports.iter().filter(|r| r.is_substantive()).count();
    let ratio = substantive as f64 / reports.len() as f64;
    (50.0 + ratio * 50.0).round().clamp(50.0, 100.0) as u8
}

/// Up to five unique recommendations across all reports
pub fn extract_recommendations(reports: &[ValidationReport]) -> Vec<String> {
    let mut seen = HashSet::new();
    reports
        .iter()
        .filter(|r| r.succeeded)
        .flat_map(|r| {
            RECOMMENDATIONS
                .captures(&r.text)
                .map(|c| labels::items(&c[1]))
                .unwrap_or_default()
        })
        .filter(|rec| seen.insert(rec.clone()))
        .take(MAX_RECOMMENDATIONS)
        .collect()
}

/// Runs review cycles with an alternate model
pub struct ReviewEngine {
    gateway: Arc<dyn Gateway>,
    registry: Arc<WorkerRegistry>,
    reviewer_id: String,
    alternates: HashMap<String, String>,
    fallback_model: String,
}

impl ReviewEngine {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        registry: Arc<WorkerRegistry>,
        config: &TroupeConfig,
    ) -> Self {
        Self {
            gateway,
            registry,
            reviewer_id: config.reviewer_id.clone(),
            alternates: config.alternate_models(),
            fallback_model: config.fallback_review_model.clone(),
        }
    }

    /// Pick a review model distinct from `model_used`
    ///
    /// The pair table wins; otherwise the configured fallback, then any
    /// other known model. Fails only when no distinct model is known at all.
    pub fn select_alternate_model(&self, model_used: &str) -> Result<String, ReviewError> {
        if let Some(alternate) = self.alternates.get(model_used) {
            return Ok(alternate.clone());
        }

        let mut known: Vec<&String> = self.alternates.keys().collect();
        known.sort();

        std::iter::once(&self.fallback_model)
            .chain(known)
            .find(|m| m.as_str() != model_used)
            .cloned()
            .ok_or_else(|| {
                ReviewError::ReviewSystemFailure(format!(
                    "no review model distinct from '{model_used}' is configured"
                ))
            })
    }

    /// Run the three validations and synthesize feedback
    #[instrument(skip(self, request), fields(source_worker = %request.source_worker))]
    pub async fn review(&self, request: &ReviewRequest) -> Result<ReviewResult, ReviewError> {
        let reviewer = self.registry.worker(&self.reviewer_id).map_err(|e| {
            warn!(error = %e, "Reviewer could not be obtained");
            ReviewError::ReviewerUnavailable(self.reviewer_id.clone())
        })?;
        let reviewer_name = reviewer.descriptor().display_name.clone();

        let model = self.select_alternate_model(&request.model_used)?;
        info!(
            alternate_model = %model,
            model_used = %request.model_used,
            "Starting independent validation"
        );

        let mut validations = Vec::with_capacity(ValidationKind::ALL.len());
        for kind in ValidationKind::ALL {
            validations.push(self.validate(kind, request, &model, &reviewer_name).await);
        }

        if validations.iter().all(|v| !v.succeeded) {
            let reasons = validations
                .iter()
                .map(|v| format!("{}: {}", v.kind.name(), v.text))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ReviewError::ReviewSystemFailure(format!(
                "every validation prompt failed ({reasons})"
            )));
        }

        let validation_score = average_score(&validations);
        let recommended_actions = extract_recommendations(&validations);
        let quality_metrics = QualityMetrics::from_reports(&validations);
        let reviewer_confidence = reviewer_confidence(&validations);

        let feedback = self
            .synthesize_feedback(request, &validations, validation_score, &recommended_actions)
            .await;

        info!(
            validation_score,
            reviewer_confidence, "Review completed"
        );

        Ok(ReviewResult {
            validation_score,
            feedback,
            quality_metrics,
            reviewer_confidence,
            alternate_model_used: model,
            recommended_actions,
            validations,
        })
    }

    async fn validate(
        &self,
        kind: ValidationKind,
        request: &ReviewRequest,
        model: &str,
        reviewer_name: &str,
    ) -> ValidationReport {
        let system_prompt = format!(
            "You are {reviewer_name}, an independent quality reviewer with expertise in {} \
             evaluation. Give an objective, constructive assessment with specific, actionable \
             recommendations. Stay independent from the original worker's perspective and \
             follow the requested output format exactly.",
            kind.name()
        );

        let call = CompletionRequest::new(system_prompt, kind.prompt(request)).with_model(model);

        match self.gateway.generate(call).await {
            Ok(text) => {
                debug!(kind = kind.name(), reply_len = text.len(), "Validation completed");
                ValidationReport {
                    kind,
                    text,
                    succeeded: true,
                }
            }
            Err(e) => {
                warn!(kind = kind.name(), error = %e, "Validation prompt failed");
                ValidationReport {
                    kind,
                    text: format!("Validation error: {e}"),
                    succeeded: false,
                }
            }
        }
    }

    async fn synthesize_feedback(
        &self,
        request: &ReviewRequest,
        validations: &[ValidationReport],
        score: u8,
        recommendations: &[String],
    ) -> ReviewFeedback {
        let details: BTreeMap<&str, &str> = validations
            .iter()
            .map(|v| (v.kind.name(), v.text.as_str()))
            .collect();
        let details = serde_json::to_string_pretty(&details).unwrap_or_default();

        let prompt = format!(
            "# Review Feedback Generation\n\n\
             ## Validation Results\n{details}\n\n\
             ## Original Request Context\n\
             - Source Worker: {source}\n\
             - Mission: {mission}\n\
             - Expected: {expected}\n\n\
             ## Task\n\
             Synthesize the validation results into constructive, actionable feedback for \
             the source worker.\n\n\
             **Output Format:**\n\
             OVERALL_ASSESSMENT: [summary of quality and alignment]\n\
             KEY_STRENGTHS: [what worked well]\n\
             IMPROVEMENT_AREAS: [specific areas needing attention]\n\
             ACTIONABLE_RECOMMENDATIONS: [concrete steps]\n\
             INTEGRATION_STRATEGY: [how to incorporate the feedback]",
            source = request.source_worker,
            mission = request.mission,
            expected = request.expected,
        );

        let system_prompt = "You turn validation results into constructive, solution-oriented \
                             feedback with specific, implementable suggestions.";

        match self
            .gateway
            .generate(CompletionRequest::new(system_prompt, prompt))
            .await
        {
            Ok(reply) => ReviewFeedback::parse(&reply, score, recommendations),
            Err(e) => {
                warn!(error = %e, "Feedback synthesis failed, using fallback feedback");
                ReviewFeedback::fallback(score, recommendations)
            }
        }
    }
}
