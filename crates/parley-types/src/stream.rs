//! Typed events decoded from the chat backend's streaming protocol.

/// Events emitted while an assistant turn streams in.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// An incremental fragment of assistant text.
    Chunk { content: String },

    /// The turn has completed.
    Done {
        /// Backend-assigned session id to adopt, if the backend issued one.
        session_id: Option<String>,
        /// Follow-up prompts offered by the backend.
        suggestions: Option<Vec<String>>,
    },

    /// The backend reported a failure mid-stream.
    Error { message: String },

    /// The assistant started invoking a tool.
    ToolCallStart {
        tool: String,
        tool_call_id: Option<String>,
        input: serde_json::Value,
    },

    /// A tool invocation finished successfully.
    ToolCallEnd {
        tool: String,
        tool_call_id: Option<String>,
        result: Option<serde_json::Value>,
    },

    /// A tool invocation failed.
    ToolCallError {
        tool: String,
        tool_call_id: Option<String>,
        error: Option<String>,
    },
}

impl StreamEvent {
    /// A `done` event with no payload, as produced by the `[DONE]` sentinel.
    pub fn done() -> Self {
        StreamEvent::Done {
            session_id: None,
            suggestions: None,
        }
    }

    /// Tool-call identity for lifecycle events.
    ///
    /// Uses the explicit id when present, otherwise the tool name. Two
    /// concurrent id-less calls to the same tool therefore share one entry.
    pub fn tool_call_key(&self) -> Option<&str> {
        match self {
            StreamEvent::ToolCallStart {
                tool, tool_call_id, ..
            }
            | StreamEvent::ToolCallEnd {
                tool, tool_call_id, ..
            }
            | StreamEvent::ToolCallError {
                tool, tool_call_id, ..
            } => Some(tool_call_id.as_deref().unwrap_or(tool)),
            _ => None,
        }
    }
}
