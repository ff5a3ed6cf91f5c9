//! Language model gateway boundary
//!
//! The gateway is an external collaborator: role-tagged messages and a system
//! prompt go in, free text comes out. The core never streams, never retries
//! and never sets timeouts; those belong to the implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single role-tagged message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A completion request as issued by the core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model override; `None` lets the gateway pick its default
    pub model: Option<String>,
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
}

impl CompletionRequest {
    /// One system prompt plus one user message, the only shape the core sends
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            model: None,
            system_prompt: system_prompt.into(),
            messages: vec![ChatMessage::user(user_prompt)],
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Opaque text-in/text-out completion service
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn generate(&self, request: CompletionRequest) -> Result<String, GatewayError>;
}
