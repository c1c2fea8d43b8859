//! Tool-call lifecycle tracking for the assistant turn being streamed.
//!
//! `ToolCallTracker` owns the tool invocations of exactly one turn. A fresh
//! tracker is created for every orchestration call and never read across
//! calls.

use parley_types::chat::{ToolCall, ToolCallStatus};
use parley_types::error::ToolCallReferenceError;
use parley_types::stream::StreamEvent;

/// Tracks tool calls for one assistant turn, in insertion order.
#[derive(Debug, Default)]
pub struct ToolCallTracker {
    calls: Vec<ToolCall>,
}

impl ToolCallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracked calls in the order they started.
    pub fn calls(&self) -> &[ToolCall] {
        &self.calls
    }

    /// Apply a `tool_call_*` event.
    ///
    /// Returns `Ok(true)` when tracked state changed and `Ok(false)` for
    /// no-ops: a duplicate start, a lifecycle event for a call that is
    /// already terminal, or a non-tool event. End and error events for an
    /// id that never started yield `ToolCallReferenceError`.
    pub fn apply(&mut self, event: &StreamEvent) -> Result<bool, ToolCallReferenceError> {
        let Some(id) = event.tool_call_key() else {
            return Ok(false);
        };

        match event {
            StreamEvent::ToolCallStart { tool, input, .. } => {
                if self.position(id).is_some() {
                    tracing::debug!(tool_call_id = %id, "duplicate tool_call_start ignored");
                    return Ok(false);
                }
                self.calls.push(ToolCall {
                    id: id.to_string(),
                    name: tool.clone(),
                    arguments: input.clone(),
                    status: ToolCallStatus::Calling,
                    result: None,
                    error: None,
                });
                Ok(true)
            }
            StreamEvent::ToolCallEnd { result, .. } => {
                let call = self.get_open_mut(id)?;
                let Some(call) = call else { return Ok(false) };
                call.status = ToolCallStatus::Completed;
                call.result = result.clone();
                Ok(true)
            }
            StreamEvent::ToolCallError { error, .. } => {
                let call = self.get_open_mut(id)?;
                let Some(call) = call else { return Ok(false) };
                call.status = ToolCallStatus::Error;
                call.error = error.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.calls.iter().position(|call| call.id == id)
    }

    /// Look up a call that may still change status.
    ///
    /// `Ok(None)` means the call exists but is already terminal.
    fn get_open_mut(&mut self, id: &str) -> Result<Option<&mut ToolCall>, ToolCallReferenceError> {
        let index = self.position(id).ok_or_else(|| ToolCallReferenceError {
            id: id.to_string(),
        })?;
        let call = &mut self.calls[index];
        if call.status.is_terminal() {
            tracing::debug!(tool_call_id = %id, status = %call.status, "event for finished tool call ignored");
            return Ok(None);
        }
        Ok(Some(call))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn start(id: &str, tool: &str, input: serde_json::Value) -> StreamEvent {
        StreamEvent::ToolCallStart {
            tool: tool.to_string(),
            tool_call_id: Some(id.to_string()),
            input,
        }
    }

    fn end(id: &str, result: serde_json::Value) -> StreamEvent {
        StreamEvent::ToolCallEnd {
            tool: "search".to_string(),
            tool_call_id: Some(id.to_string()),
            result: Some(result),
        }
    }

    fn fail(id: &str, error: &str) -> StreamEvent {
        StreamEvent::ToolCallError {
            tool: "search".to_string(),
            tool_call_id: Some(id.to_string()),
            error: Some(error.to_string()),
        }
    }

    #[test]
    fn test_start_inserts_calling_entry() {
        let mut tracker = ToolCallTracker::new();
        assert_eq!(tracker.apply(&start("c1", "search", json!({"q": "rust"}))), Ok(true));

        let call = &tracker.calls()[0];
        assert_eq!(call.id, "c1");
        assert_eq!(call.name, "search");
        assert_eq!(call.arguments, json!({"q": "rust"}));
        assert_eq!(call.status, ToolCallStatus::Calling);
    }

    #[test]
    fn test_duplicate_start_is_noop() {
        let mut tracker = ToolCallTracker::new();
        tracker.apply(&start("c1", "search", json!({"q": "first"}))).unwrap();
        tracker.apply(&start("c2", "clock", json!({}))).unwrap();

        assert_eq!(tracker.apply(&start("c1", "search", json!({"q": "second"}))), Ok(false));

        let ids: Vec<_> = tracker.calls().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
        assert_eq!(tracker.calls()[0].arguments, json!({"q": "first"}));
    }

    #[test]
    fn test_end_completes_call() {
        let mut tracker = ToolCallTracker::new();
        tracker.apply(&start("c1", "search", json!({}))).unwrap();
        assert_eq!(tracker.apply(&end("c1", json!(["hit"]))), Ok(true));

        let call = &tracker.calls()[0];
        assert_eq!(call.status, ToolCallStatus::Completed);
        assert_eq!(call.result, Some(json!(["hit"])));
    }

    #[test]
    fn test_error_marks_call_failed() {
        let mut tracker = ToolCallTracker::new();
        tracker.apply(&start("c1", "search", json!({}))).unwrap();
        assert_eq!(tracker.apply(&fail("c1", "timeout")), Ok(true));

        let call = &tracker.calls()[0];
        assert_eq!(call.status, ToolCallStatus::Error);
        assert_eq!(call.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_unknown_id_is_reference_error() {
        let mut tracker = ToolCallTracker::new();
        assert_eq!(
            tracker.apply(&end("ghost", json!(null))),
            Err(ToolCallReferenceError {
                id: "ghost".to_string()
            })
        );
        assert!(tracker.apply(&fail("ghost", "x")).is_err());
        assert!(tracker.calls().is_empty());
    }

    #[test]
    fn test_terminal_status_is_never_overwritten() {
        let mut tracker = ToolCallTracker::new();
        tracker.apply(&start("c1", "search", json!({}))).unwrap();
        tracker.apply(&end("c1", json!("first"))).unwrap();

        assert_eq!(tracker.apply(&fail("c1", "late failure")), Ok(false));
        assert_eq!(tracker.apply(&end("c1", json!("second"))), Ok(false));
        assert_eq!(tracker.apply(&start("c1", "search", json!({}))), Ok(false));

        let call = &tracker.calls()[0];
        assert_eq!(call.status, ToolCallStatus::Completed);
        assert_eq!(call.result, Some(json!("first")));
        assert!(call.error.is_none());
    }

    #[test]
    fn test_missing_id_falls_back_to_tool_name() {
        let mut tracker = ToolCallTracker::new();
        let start_event = StreamEvent::ToolCallStart {
            tool: "clock".to_string(),
            tool_call_id: None,
            input: json!({}),
        };
        let end_event = StreamEvent::ToolCallEnd {
            tool: "clock".to_string(),
            tool_call_id: None,
            result: Some(json!("12:00")),
        };
        tracker.apply(&start_event).unwrap();
        tracker.apply(&end_event).unwrap();

        assert_eq!(tracker.calls()[0].id, "clock");
        assert_eq!(tracker.calls()[0].status, ToolCallStatus::Completed);
    }

    #[test]
    fn test_non_tool_events_are_ignored() {
        let mut tracker = ToolCallTracker::new();
        let chunk = StreamEvent::Chunk {
            content: "hi".to_string(),
        };
        assert_eq!(tracker.apply(&chunk), Ok(false));
    }
}
