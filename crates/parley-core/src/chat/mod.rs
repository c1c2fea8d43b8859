//! Conversation engine for Parley.
//!
//! The chat module turns a decoded event stream into conversation state:
//! - `ToolCallTracker`: lifecycle of the tool calls in one assistant turn
//! - `TurnAccumulator`: merges chunks and tool calls into the assistant turn
//! - `TitleGuard`: single-flight title generation for new sessions
//! - `ChatOrchestrator`: send, stop, and regenerate against a live session

pub mod accumulator;
pub mod orchestrator;
pub mod title;
pub mod tool_calls;
