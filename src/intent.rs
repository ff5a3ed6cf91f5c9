//! Intent classification - direct answer, clarify, or orchestrate

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::gateway::{ChatMessage, CompletionRequest, Gateway, Role};
use crate::labels;

/// A prior turn of the conversation
pub type ConversationTurn = ChatMessage;

/// Deliverable forced onto capability queries
pub const CAPABILITY_DELIVERABLE: &str = "agent-capabilities-list";
/// Deliverable of a plain conversational answer
pub const DIRECT_RESPONSE: &str = "direct-response";

/// Conversations longer than this go straight to orchestration
const PATIENCE_TURNS: usize = 6;

const CAPABILITY_PHRASES: &[&str] = &[
    "what agents",
    "which agents",
    "agent capabilities",
    "what can the team",
    "team capabilities",
    "who can help",
    "available agents",
    "what agents can",
    "each one of your agents",
    "reach out to each",
    "elevator pitch",
    "compile their responses",
    "agents and compile",
    "one sentence",
    "capabilities of",
    "capabilities?",
    "what can each",
];

const FRUSTRATION_PHRASES: &[&str] = &[
    "don't want to answer",
    "no more questions",
    "just write",
    "stop asking",
    "enough questions",
    "move on",
    "proceed",
    "go ahead",
    "write the",
    "don't know",
    "given you enough",
    "enough information",
    "just do it",
    "make it",
    "create it",
    "write it",
    "build it",
    "i'm done",
    "already said",
];

static DIRECT_COMMAND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(write|create|make|build|generate|research)\s+(the\s+)?(paper|document|report|essay|analysis|summary|comprehensive|detailed)",
    )
    .expect("static regex")
});

static COMPREHENSIVE_REQUEST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(comprehensive|detailed|complete|thorough)\s+(summary|analysis|report|document|research|learning)",
    )
    .expect("static regex")
});

/// How much coordination a request needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    High,
}

impl Complexity {
    fn from_label(word: &str) -> Self {
        match word {
            "high" => Complexity::High,
            "medium" | "moderate" => Complexity::Moderate,
            _ => Complexity::Simple,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    fn from_label(word: &str) -> Self {
        match word {
            "low" => Priority::Low,
            "high" => Priority::High,
            _ => Priority::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

/// Classification of one incoming message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentAnalysis {
    pub complexity: Complexity,
    pub requires_orchestration: bool,
    pub candidate_workers: Vec<String>,
    pub deliverables: Vec<String>,
    pub priority: Priority,
}

impl IntentAnalysis {
    /// What is assumed when classification cannot run
    pub fn conservative() -> Self {
        Self {
            complexity: Complexity::Simple,
            requires_orchestration: false,
            candidate_workers: Vec::new(),
            deliverables: vec![DIRECT_RESPONSE.to_string()],
            priority: Priority::Medium,
        }
    }

    /// Parse a classifier reply; each field defaults on its own
    pub fn parse(reply: &str) -> Self {
        let complexity = labels::word(reply, "COMPLEXITY")
            .map(|w| Complexity::from_label(&w))
            .unwrap_or(Complexity::Simple);

        let requires_orchestration =
            labels::word(reply, "ORCHESTRATION").is_some_and(|w| w == "yes");

        let candidate_workers = labels::field(reply, "AGENTS")
            .map(|v| labels::comma_list(&v))
            .unwrap_or_default();

        let deliverables = labels::field(reply, "DELIVERABLES")
            .map(|v| labels::comma_list(&v))
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| vec![DIRECT_RESPONSE.to_string()]);

        let priority = labels::word(reply, "PRIORITY")
            .map(|w| Priority::from_label(&w))
            .unwrap_or_default();

        Self {
            complexity,
            requires_orchestration,
            candidate_workers,
            deliverables,
            priority,
        }
    }

    /// Force orchestration for a capability query
    fn with_capability_override(mut self) -> Self {
        self.complexity = Complexity::Moderate;
        self.requires_orchestration = true;
        self.deliverables = vec![CAPABILITY_DELIVERABLE.to_string()];
        self
    }
}

/// Does the message ask what the team can do?
pub fn is_capability_query(message: &str) -> bool {
    let lower = message.to_lowercase();
    CAPABILITY_PHRASES.iter().any(|p| lower.contains(p))
}

fn is_frustrated(message: &str) -> bool {
    let lower = message.to_lowercase().replace('\u{2019}', "'");
    FRUSTRATION_PHRASES.iter().any(|p| lower.contains(p))
}

/// What to do with a classified message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    /// Answer directly without workers
    Direct,
    /// Ask clarifying questions before orchestrating
    Clarify,
    /// Run the full orchestration pipeline
    Orchestrate,
}

/// Decide the route for a classified message
pub fn route(analysis: &IntentAnalysis, message: &str, history: &[ConversationTurn]) -> Route {
    if !analysis.requires_orchestration {
        return Route::Direct;
    }

    let ready = is_capability_query(message)
        || is_frustrated(message)
        || DIRECT_COMMAND.is_match(message.trim())
        || COMPREHENSIVE_REQUEST.is_match(message)
        || history.len() > PATIENCE_TURNS;

    if ready {
        Route::Orchestrate
    } else {
        Route::Clarify
    }
}

const SYSTEM_PROMPT: &str = "You are an intent analysis system for a team of specialized workers. \
Decide how complex the user's message is and whether it needs several workers.

COMPLEXITY:
- low: greetings, simple questions, casual conversation
- medium: specific knowledge requests, single-task help
- high: multi-step projects, research + analysis + report creation

ALWAYS require orchestration for:
- questions about the team's capabilities (what agents, which agents, team capabilities)
- multi-step projects or workflows needing coordination
- research + analysis + report creation
- comprehensive summaries, detailed analysis, documentation requests
- file creation (documents, PDFs) that needs specialized formatting

DO NOT require orchestration for:
- greetings (\"Hello\", \"How are you?\")
- questions about the assistant itself
- single-fact questions or single-domain requests without file creation

RESPONSE FORMAT:
COMPLEXITY: [low|medium|high]
ORCHESTRATION: [yes|no]
AGENTS: [comma-separated worker ids, only if orchestration is yes]
DELIVERABLES: [comma-separated expected outputs]
PRIORITY: [low|medium|high]
REASONING: [one sentence]";

/// Classifies messages with one gateway call each
pub struct IntentClassifier {
    gateway: Arc<dyn Gateway>,
}

impl IntentClassifier {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// Classify a message; never fails
    #[instrument(skip(self, message, history), fields(history_len = history.len()))]
    pub async fn classify(&self, message: &str, history: &[ConversationTurn]) -> IntentAnalysis {
        let prompt = analysis_prompt(message, history);

        let analysis = match self
            .gateway
            .generate(CompletionRequest::new(SYSTEM_PROMPT, prompt))
            .await
        {
            Ok(reply) => {
                debug!(reply_len = reply.len(), "Received intent analysis");
                IntentAnalysis::parse(&reply)
            }
            Err(e) => {
                warn!(error = %e, "Intent analysis failed, using conservative default");
                IntentAnalysis::conservative()
            }
        };

        if is_capability_query(message) {
            info!("Capability query detected, forcing orchestration");
            return analysis.with_capability_override();
        }

        analysis
    }
}

fn analysis_prompt(message: &str, history: &[ConversationTurn]) -> String {
    let mut prompt = format!("# User Intent Analysis\n\n## User Message\n\"{message}\"\n");

    if !history.is_empty() {
        prompt.push_str("\n## Conversation Context\n");
        for turn in history {
            let who = match turn.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            prompt.push_str(&format!("{who}: {}\n", turn.content));
        }
    }

    prompt.push_str("\nClassify the message using the required response format.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::testing::ScriptedGateway;

    fn classifier(reply: Result<&str, GatewayError>) -> IntentClassifier {
        let gateway = ScriptedGateway::new();
        match reply {
            Ok(text) => gateway.push_ok(text),
            Err(e) => gateway.push_err(e),
        }
        IntentClassifier::new(Arc::new(gateway))
    }

    #[test]
    fn test_parse_full_reply() {
        let analysis = IntentAnalysis::parse(
            "COMPLEXITY: high\nORCHESTRATION: yes\nAGENTS: researcher, communications\n\
             DELIVERABLES: report, slide deck\nPRIORITY: high\nREASONING: multi-step",
        );
        assert_eq!(analysis.complexity, Complexity::High);
        assert!(analysis.requires_orchestration);
        assert_eq!(analysis.candidate_workers, vec!["researcher", "communications"]);
        assert_eq!(analysis.deliverables, vec!["report", "slide deck"]);
        assert_eq!(analysis.priority, Priority::High);
    }

    #[test]
    fn test_parse_fields_default_independently() {
        let analysis = IntentAnalysis::parse("COMPLEXITY: medium\nsomething else entirely");
        assert_eq!(analysis.complexity, Complexity::Moderate);
        assert!(!analysis.requires_orchestration);
        assert!(analysis.candidate_workers.is_empty());
        assert_eq!(analysis.deliverables, vec![DIRECT_RESPONSE]);
        assert_eq!(analysis.priority, Priority::Medium);
    }

    #[tokio::test]
    async fn test_gateway_failure_is_conservative() {
        let analysis = classifier(Err(GatewayError::Request("offline".into())))
            .classify("Draft a full market study", &[])
            .await;
        assert_eq!(analysis, IntentAnalysis::conservative());
    }

    #[tokio::test]
    async fn test_capability_query_overrides_model() {
        let analysis = classifier(Ok("COMPLEXITY: low\nORCHESTRATION: no\nPRIORITY: low"))
            .classify("What agents are on the team?", &[])
            .await;

        assert!(analysis.requires_orchestration);
        assert_eq!(analysis.complexity, Complexity::Moderate);
        assert_eq!(analysis.deliverables, vec![CAPABILITY_DELIVERABLE]);
    }

    #[tokio::test]
    async fn test_capability_query_overrides_gateway_failure() {
        let analysis = classifier(Err(GatewayError::Request("offline".into())))
            .classify("Which agents can help me?", &[])
            .await;
        assert!(analysis.requires_orchestration);
    }

    #[test]
    fn test_route() {
        let mut analysis = IntentAnalysis::conservative();
        assert_eq!(route(&analysis, "hello", &[]), Route::Direct);

        analysis.requires_orchestration = true;
        assert_eq!(route(&analysis, "I'd like help with a project", &[]), Route::Clarify);
        assert_eq!(
            route(&analysis, "Write the paper on river ecology", &[]),
            Route::Orchestrate
        );
        assert_eq!(
            route(&analysis, "I need a thorough analysis of churn", &[]),
            Route::Orchestrate
        );
        assert_eq!(route(&analysis, "ok, go ahead", &[]), Route::Orchestrate);

        let history = vec![ConversationTurn::user("more detail"); 7];
        assert_eq!(route(&analysis, "here you are", &history), Route::Orchestrate);
    }
}
