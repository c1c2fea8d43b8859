//! Merges streamed text and tool-call updates into one assistant turn.
//!
//! The accumulator writes into a conversation history by index. The index
//! is established lazily on the first write (first chunk or first tool-call
//! update) and stays fixed for the rest of the orchestration call.

use parley_types::chat::{ChatTurn, Role, ToolCall};

/// Builds the in-progress assistant turn.
#[derive(Debug)]
pub struct TurnAccumulator {
    /// Where the assistant turn is expected to live.
    target_index: usize,
    /// Position actually written, fixed by the first write.
    assistant_index: Option<usize>,
    content: String,
    tool_calls: Vec<ToolCall>,
}

impl TurnAccumulator {
    /// Create an accumulator targeting `target_index` in the history.
    pub fn new(target_index: usize) -> Self {
        Self {
            target_index,
            assistant_index: None,
            content: String::new(),
            tool_calls: Vec::new(),
        }
    }

    /// Index of the turn being built, once something has been written.
    pub fn assistant_index(&self) -> Option<usize> {
        self.assistant_index
    }

    /// Text accumulated so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Append a chunk and rewrite the assistant turn.
    pub fn apply_chunk(&mut self, history: &mut Vec<ChatTurn>, text: &str) {
        self.content.push_str(text);
        self.write(history);
    }

    /// Replace the turn's tool calls, leaving its content untouched.
    pub fn apply_tool_calls(&mut self, history: &mut Vec<ChatTurn>, calls: Vec<ToolCall>) {
        self.tool_calls = calls;
        let index = self.ensure_turn(history);
        history[index].tool_calls = self.materialized_tool_calls();
    }

    fn write(&mut self, history: &mut Vec<ChatTurn>) {
        let index = self.ensure_turn(history);
        history[index] = ChatTurn {
            role: Role::Assistant,
            content: self.content.clone(),
            tool_calls: self.materialized_tool_calls(),
        };
    }

    fn materialized_tool_calls(&self) -> Option<Vec<ToolCall>> {
        if self.tool_calls.is_empty() {
            None
        } else {
            Some(self.tool_calls.clone())
        }
    }

    /// Resolve the assistant index, appending the turn if it is missing.
    fn ensure_turn(&mut self, history: &mut Vec<ChatTurn>) -> usize {
        if let Some(index) = self.assistant_index {
            if index < history.len() {
                return index;
            }
        }

        let index = if self.target_index < history.len() {
            self.target_index
        } else {
            history.push(ChatTurn::assistant(self.content.clone()));
            history.len() - 1
        };
        self.assistant_index = Some(index);
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::chat::ToolCallStatus;
    use serde_json::json;

    fn call(id: &str, status: ToolCallStatus) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: "search".to_string(),
            arguments: json!({}),
            status,
            result: None,
            error: None,
        }
    }

    #[test]
    fn test_chunks_concatenate_into_placeholder_turn() {
        let mut history = vec![ChatTurn::user("hello"), ChatTurn::assistant("")];
        let mut acc = TurnAccumulator::new(1);

        acc.apply_chunk(&mut history, "Hi");
        acc.apply_chunk(&mut history, " there");

        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "Hi there");
        assert_eq!(history[1].role, Role::Assistant);
        assert!(history[1].tool_calls.is_none());
        assert_eq!(acc.assistant_index(), Some(1));
    }

    #[test]
    fn test_tool_calls_before_text_create_the_turn() {
        let mut history = vec![ChatTurn::user("hello")];
        let mut acc = TurnAccumulator::new(1);

        acc.apply_tool_calls(&mut history, vec![call("c1", ToolCallStatus::Calling)]);

        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "");
        assert_eq!(history[1].tool_calls.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_tool_calls_do_not_disturb_content() {
        let mut history = vec![ChatTurn::user("hello"), ChatTurn::assistant("")];
        let mut acc = TurnAccumulator::new(1);

        acc.apply_chunk(&mut history, "Looking");
        acc.apply_tool_calls(&mut history, vec![call("c1", ToolCallStatus::Completed)]);

        assert_eq!(history[1].content, "Looking");
        assert_eq!(
            history[1].tool_calls.as_ref().unwrap()[0].status,
            ToolCallStatus::Completed
        );
    }

    #[test]
    fn test_chunk_keeps_last_known_tool_calls() {
        let mut history = vec![ChatTurn::user("hello"), ChatTurn::assistant("")];
        let mut acc = TurnAccumulator::new(1);

        acc.apply_tool_calls(&mut history, vec![call("c1", ToolCallStatus::Calling)]);
        acc.apply_chunk(&mut history, "Found it");

        assert_eq!(history[1].content, "Found it");
        assert_eq!(history[1].tool_calls.as_ref().unwrap()[0].id, "c1");
    }

    #[test]
    fn test_reapplying_same_tool_calls_is_stable() {
        let mut history = vec![ChatTurn::user("hello"), ChatTurn::assistant("")];
        let mut acc = TurnAccumulator::new(1);
        let calls = vec![call("c1", ToolCallStatus::Calling)];

        acc.apply_tool_calls(&mut history, calls.clone());
        let once = history.clone();
        acc.apply_tool_calls(&mut history, calls);

        assert_eq!(history, once);
    }

    #[test]
    fn test_index_stays_fixed_after_first_write() {
        let mut history = vec![ChatTurn::user("hello")];
        let mut acc = TurnAccumulator::new(5);

        acc.apply_chunk(&mut history, "a");
        acc.apply_chunk(&mut history, "b");

        assert_eq!(history.len(), 2);
        assert_eq!(acc.assistant_index(), Some(1));
        assert_eq!(history[1].content, "ab");
        assert_eq!(acc.content(), "ab");
    }
}
