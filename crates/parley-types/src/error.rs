use thiserror::Error;

/// Errors surfaced to callers of the conversation engine.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("files exceed the {limit_bytes} byte limit: {}", .files.join(", "))]
    PayloadTooLarge { files: Vec<String>, limit_bytes: u64 },

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The backend sent an `error` event mid-stream.
    #[error("{0}")]
    Server(String),

    #[error("no user message to regenerate a response for")]
    NoUserMessage,

    #[error("a response is already streaming")]
    AlreadyStreaming,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ChatError {
    /// Message shown to the user for this error.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Transport(TransportError::Http {
                detail: Some(detail),
                ..
            }) => detail.clone(),
            other => other.to_string(),
        }
    }
}

/// Errors from opening or reading the chat stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request was aborted by the user or the engine. Never reported.
    #[error("request cancelled")]
    Cancelled,

    #[error("HTTP {status}{}", .detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    Http { status: u16, detail: Option<String> },

    #[error("network error: {0}")]
    Network(String),

    #[error("response decode error: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }
}

/// A malformed line in the event stream. Recovered by skipping the line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed event payload: {0}")]
    Malformed(String),

    #[error("unknown event type")]
    UnknownType,
}

/// A tool-call lifecycle event referenced an id not started in this turn.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no tool call with id '{id}' in the current turn")]
pub struct ToolCallReferenceError {
    pub id: String,
}

/// Errors from the session storage port.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(String),

    #[error("storage serialization error: {0}")]
    Serialization(String),

    #[error("session not found: {0}")]
    NotFound(String),
}
