//! # Troupe
//!
//! Multi-worker orchestration: one request is planned, handed to a team of
//! specialized workers, independently reviewed and, when the review falls
//! short, revised.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                            ORCHESTRATOR                              │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐               │
//! │  │   Intent     │  │    Plan      │  │   Review /   │               │
//! │  │  Classifier  │  │  Generator   │  │   Revision   │               │
//! │  └──────────────┘  └──────────────┘  └──────────────┘               │
//! └────────────────────────────┬────────────────────────────────────────┘
//!                              │  ExecutionEngine (sequential, isolated)
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//!   ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//!   │  Worker A   │     │  Worker B   │     │  Worker C   │
//!   └─────────────┘     └─────────────┘     └─────────────┘
//!
//!   request ─► plan ─► execute ─► review? ─► score < 80 ? revise : annotate
//! ```
//!
//! ## Key Concepts
//!
//! - **Gateway**: the text-generation backend every prompt goes through
//! - **Worker**: a specialized unit that turns one task into text
//! - **Plan**: the ordered workers chosen for a request
//! - **Session**: the record of one run, streamed to the session log

pub mod channel;
pub mod config;
pub mod error;
pub mod events;
pub mod execution;
pub mod extraction;
pub mod gateway;
pub mod intent;
pub mod labels;
pub mod logging;
pub mod orchestrator;
pub mod plan;
pub mod registry;
pub mod review;
pub mod revision;
pub mod session;
pub mod worker;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use channel::{event_channel, EventSink, EventStream};
pub use config::{ReviewPolicy, TroupeConfig};
pub use error::{Result, TroupeError};
pub use events::SessionEvent;
pub use gateway::{ChatMessage, CompletionRequest, Gateway, Role};
pub use intent::{IntentAnalysis, IntentClassifier, Route};
pub use orchestrator::{CapabilitySurvey, OrchestrationReport, Orchestrator, Response};
pub use plan::{ExecutionPlan, PlanGenerator, PlanRequest};
pub use registry::WorkerRegistry;
pub use review::{ReviewEngine, ReviewResult};
pub use revision::{RevisionIntegrator, RevisionState};
pub use session::{Session, SessionId, SessionStatus, WorkerExecutionRecord};
pub use worker::{TaskOutcome, Worker, WorkerDescriptor, WorkerHandle, WorkerTask};
