//! Troupe error types

use thiserror::Error;

/// Result type for troupe operations
pub type Result<T> = std::result::Result<T, TroupeError>;

/// Failure reported by the language model gateway
///
/// The core treats gateway failures as opaque; the message is carried as-is.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The completion request failed
    #[error("Gateway request failed: {0}")]
    Request(String),

    /// The requested model is not served by this gateway
    #[error("Model not available: {0}")]
    ModelUnavailable(String),
}

/// Worker-level failures
///
/// These are isolated: the execution engine records them against the worker
/// and moves on to the next one.
#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    /// Registry miss or instantiation failure
    #[error("Worker unavailable: {id} ({reason})")]
    Unavailable { id: String, reason: String },

    /// The worker returned a failure or raised an error
    #[error("Worker {id} failed: {reason}")]
    Execution { id: String, reason: String },
}

impl WorkerError {
    /// Identifier of the worker this error belongs to
    pub fn worker_id(&self) -> &str {
        match self {
            WorkerError::Unavailable { id, .. } | WorkerError::Execution { id, .. } => id,
        }
    }
}

/// Plan generation failures (fatal for the run)
#[derive(Debug, Error)]
pub enum PlanGenerationError {
    /// The planning call to the gateway failed
    #[error("Plan creation failed: could not generate execution plan: {0}")]
    Gateway(#[source] GatewayError),

    /// No valid worker could be extracted from the planning response
    #[error(
        "Worker extraction failed: no valid workers in a {response_len}-character planning \
         response (available: {available})"
    )]
    ExtractionFailure {
        response_len: usize,
        available: String,
    },
}

/// Review failures (fatal for the run)
#[derive(Debug, Error)]
pub enum ReviewError {
    /// The registry cannot supply the configured reviewer
    #[error("Reviewer unavailable: review cannot proceed without worker '{0}'")]
    ReviewerUnavailable(String),

    /// Every validation prompt failed
    #[error("Review system failure: {0}")]
    ReviewSystemFailure(String),
}

/// Revision failures (fatal for the run)
#[derive(Debug, Error)]
pub enum RevisionError {
    /// The plan carries no primary worker to revise with
    #[error("Revision failed: plan has no primary worker")]
    NoPrimaryWorker,

    /// The primary worker could not be obtained from the registry
    #[error("Revision failed: primary worker unavailable: {0}")]
    PrimaryUnavailable(#[source] WorkerError),

    /// The primary worker failed while revising
    #[error("Revision failed: worker {id} could not integrate review feedback: {reason}")]
    WorkerFailed { id: String, reason: String },
}

/// Configuration loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the config file failed
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    /// The file is not valid TOML for this schema
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is present but unusable
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors that can end an orchestration run
#[derive(Debug, Error)]
pub enum TroupeError {
    /// Plan generation error
    #[error(transparent)]
    Plan(#[from] PlanGenerationError),

    /// Review error
    #[error(transparent)]
    Review(#[from] ReviewError),

    /// Revision error
    #[error(transparent)]
    Revision(#[from] RevisionError),

    /// Worker error surfaced outside of plan execution
    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// Gateway error surfaced outside of planning
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl TroupeError {
    /// Name of the pipeline stage that produced this error
    pub fn stage(&self) -> &'static str {
        match self {
            TroupeError::Plan(_) => "planning",
            TroupeError::Review(_) => "review",
            TroupeError::Revision(_) => "revision",
            TroupeError::Worker(_) => "execution",
            TroupeError::Gateway(_) => "gateway",
            TroupeError::Config(_) => "configuration",
        }
    }
}
