//! Incremental terminal output for a streaming assistant turn.
//!
//! `StreamPrinter` diffs successive `ChatState` snapshots and returns only
//! what is new: the unseen suffix of the assistant's text and one status
//! line per tool-call transition. Snapshots may be coalesced, so nothing
//! here assumes it sees every intermediate state.

use std::collections::HashMap;

use console::style;

use parley_types::chat::{ChatState, Role, ToolCall, ToolCallStatus};

/// Prints one assistant turn as it streams in.
pub struct StreamPrinter {
    /// History index the streamed assistant turn occupies.
    turn_index: usize,
    /// Bytes of the turn's content already printed.
    printed: usize,
    announced: HashMap<String, ToolCallStatus>,
    started: bool,
    at_line_start: bool,
}

impl StreamPrinter {
    pub fn new(turn_index: usize) -> Self {
        Self {
            turn_index,
            printed: 0,
            announced: HashMap::new(),
            started: false,
            at_line_start: true,
        }
    }

    /// Whether anything has been printed for this turn.
    pub fn has_output(&self) -> bool {
        self.started
    }

    /// Render whatever changed since the last call.
    pub fn update(&mut self, state: &ChatState) -> String {
        // A restored history after a failed call is not part of this turn.
        if state.error.is_some() {
            return String::new();
        }
        let Some(turn) = state
            .history
            .get(self.turn_index)
            .filter(|turn| turn.role == Role::Assistant)
        else {
            return String::new();
        };

        let mut out = String::new();

        for call in turn.tool_calls.iter().flatten() {
            if self.announced.get(&call.id) == Some(&call.status) {
                continue;
            }
            self.announced.insert(call.id.clone(), call.status);
            self.start(&mut out);
            if !self.at_line_start {
                out.push('\n');
            }
            out.push_str(&tool_line(call));
            out.push('\n');
            self.at_line_start = true;
        }

        if let Some(fresh) = turn.content.get(self.printed..).filter(|s| !s.is_empty()) {
            self.start(&mut out);
            if self.at_line_start {
                out.push_str("  ");
            }
            out.push_str(&fresh.replace('\n', "\n  "));
            self.at_line_start = fresh.ends_with('\n');
            self.printed = turn.content.len();
        }

        out
    }

    /// Text that closes the turn's output block.
    pub fn finish(&mut self) -> String {
        if !self.started {
            return String::new();
        }
        let close = if self.at_line_start { "\n" } else { "\n\n" };
        self.at_line_start = true;
        close.to_string()
    }

    fn start(&mut self, out: &mut String) {
        if !self.started {
            self.started = true;
            out.push_str(&format!("\n  {}\n", style("Assistant").cyan().bold()));
        }
    }
}

fn tool_line(call: &ToolCall) -> String {
    match call.status {
        ToolCallStatus::Calling => format!(
            "  {} {}",
            style("*").yellow().bold(),
            style(format!("calling {}...", call.name)).dim()
        ),
        ToolCallStatus::Completed => format!(
            "  {} {}",
            style("✓").green().bold(),
            style(format!("{} completed", call.name)).dim()
        ),
        ToolCallStatus::Error => format!(
            "  {} {} failed: {}",
            style("x").red().bold(),
            call.name,
            call.error.as_deref().unwrap_or("unknown error")
        ),
    }
}
