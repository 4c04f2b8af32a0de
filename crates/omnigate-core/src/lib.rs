//! Core types and error definitions for the omnigate workspace.
//!
//! This crate provides the foundational types shared across all omnigate crates,
//! including the orchestration error taxonomy and the chat message shape passed
//! to AI collaborators.
//!
//! # Main types
//!
//! - [`OmnigateError`]: Unified error enum for all omnigate subsystems.
//! - [`OmnigateResult`]: Convenience alias for `Result<T, OmnigateError>`.
//! - [`Role`]: Chat message role (user, assistant, system, tool).
//! - [`ChatMessage`]: A single message in a chat-style completion request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Error types ---

/// Top-level error type for the omnigate workspace.
///
/// The first four variants form the orchestration taxonomy: graph errors and
/// validation errors are fatal, task execution errors are retried up to the
/// task's budget, and collaborator outages are logged and swallowed.
#[derive(Debug, thiserror::Error)]
pub enum OmnigateError {
    /// Cyclic or dangling dependency reference in a task graph.
    #[error("Graph error: {0}")]
    Graph(String),

    /// A collaborator call failed or timed out while executing a task.
    #[error("Task execution error: {0}")]
    TaskExecution(String),

    /// A persistence, metrics or health collaborator could not be reached.
    #[error("Collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    /// A malformed request, rejected before anything is scheduled.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A task or workflow id that does not resolve.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The workflow was cancelled before it could finish.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`OmnigateError`].
pub type OmnigateResult<T> = Result<T, OmnigateError>;

// --- Message types ---

/// The role of the participant that authored a [`ChatMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A human end-user.
    User,
    /// The AI assistant.
    Assistant,
    /// A system-level instruction or prompt.
    System,
    /// Output produced by a tool invocation.
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A single message of a chat-style completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message author.
    pub role: Role,
    /// The textual content of the message.
    pub content: String,
    /// UTC timestamp of when the message was created, when the caller sent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    /// Creates a new message with the given role and content.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Some(Utc::now()),
        }
    }

    /// Creates a new message with [`Role::User`].
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates a new message with [`Role::Assistant`].
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Creates a new message with [`Role::System`].
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_display() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Tool.to_string(), "tool");
    }
}
