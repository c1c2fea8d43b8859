//! Conversation turn, tool call, and outbound request types for Parley.
//!
//! These types model a conversation as the engine sees it: an ordered
//! history of turns, the tool invocations attached to assistant turns, and
//! the transcript shape sent to the chat backend.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Author of a turn in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("invalid role: '{other}'")),
        }
    }
}

/// Lifecycle status of a tool invocation.
///
/// Only ever moves forward: `Calling` -> `Completed` or `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    Calling,
    Completed,
    Error,
}

impl ToolCallStatus {
    /// Whether no further lifecycle event may change this status.
    pub fn is_terminal(self) -> bool {
        !matches!(self, ToolCallStatus::Calling)
    }
}

impl fmt::Display for ToolCallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolCallStatus::Calling => write!(f, "calling"),
            ToolCallStatus::Completed => write!(f, "completed"),
            ToolCallStatus::Error => write!(f, "error"),
        }
    }
}

/// A tool invocation made by the assistant during one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Stable identity within the turn. Falls back to the tool name when
    /// the backend omits an explicit id.
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
    pub status: ToolCallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: None,
        }
    }
}

/// A file attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachedFile {
    pub name: String,
    /// File content as sent to the backend (text or base64).
    pub content: String,
    /// Original size in bytes, checked against the per-file ceiling.
    #[serde(skip)]
    pub size_bytes: u64,
}

impl AttachedFile {
    /// Build an attachment whose size is the length of its content.
    pub fn from_text(name: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            name: name.into(),
            size_bytes: content.len() as u64,
            content,
        }
    }
}

/// A transcript entry sent to the backend: role and text only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub role: Role,
    pub content: String,
}

/// Request body for the streaming chat endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequestBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<AttachedFile>,
    pub messages: Vec<OutboundMessage>,
}

/// Build the backend transcript from a history.
///
/// Keeps only user and assistant turns and drops tool-call bookkeeping,
/// which is client-side state the backend never sees.
pub fn outbound_transcript(history: &[ChatTurn]) -> Vec<OutboundMessage> {
    history
        .iter()
        .filter(|turn| matches!(turn.role, Role::User | Role::Assistant))
        .map(|turn| OutboundMessage {
            role: turn.role,
            content: turn.content.clone(),
        })
        .collect()
}

/// Live, presentation-visible state of the active conversation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    pub history: Vec<ChatTurn>,
    /// Pending input text; restored when a send is rolled back.
    pub input: String,
    pub is_loading: bool,
    /// Last error surfaced to the user, cleared on the next send.
    pub error: Option<String>,
}
