//! Slash command parsing for the chat loop.
//!
//! Commands start with `/` and control the conversation: regenerate, stop,
//! switch to a new session, attach files, and show history.

use std::path::Path;

use anyhow::Context;
use console::style;

use parley_types::chat::{AttachedFile, ChatTurn, Role};

use crate::cli::session::truncate;

/// Available slash commands in the chat loop.
#[derive(Debug, PartialEq)]
pub enum ChatCommand {
    /// Show available commands.
    Help,
    /// Discard the last answer and ask again.
    Regenerate,
    /// Stop the response being streamed.
    Stop,
    /// Start a new session.
    New,
    /// Show conversation history for this session.
    History,
    /// Attach a file to the next message.
    Attach(String),
    /// Exit the chat.
    Exit,
    /// Unknown command, or a known one used wrong.
    Unknown(String),
}

/// Parse user input as a slash command.
///
/// Returns `None` if the input doesn't start with `/`.
pub fn parse(input: &str) -> Option<ChatCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let (cmd, arg) = match trimmed.split_once(' ') {
        Some((cmd, arg)) => (cmd.to_lowercase(), arg.trim()),
        None => (trimmed.to_lowercase(), ""),
    };

    match cmd.as_str() {
        "/help" | "/h" | "/?" => Some(ChatCommand::Help),
        "/regenerate" | "/retry" | "/r" => Some(ChatCommand::Regenerate),
        "/stop" => Some(ChatCommand::Stop),
        "/new" => Some(ChatCommand::New),
        "/history" => Some(ChatCommand::History),
        "/attach" | "/a" => {
            if arg.is_empty() {
                Some(ChatCommand::Unknown("/attach requires a file path".to_string()))
            } else {
                Some(ChatCommand::Attach(arg.to_string()))
            }
        }
        "/exit" | "/quit" | "/q" => Some(ChatCommand::Exit),
        other => Some(ChatCommand::Unknown(other.to_string())),
    }
}

/// Help text listing all available commands.
pub fn help_text() -> String {
    let rows = [
        ("/help", "Show this help message"),
        ("/regenerate", "Ask again for the last answer"),
        ("/stop", "Stop the response being streamed"),
        ("/new", "Start a new session"),
        ("/history", "Show conversation history"),
        ("/attach <path>", "Attach a file to the next message"),
        ("/exit", "End the chat"),
    ];

    let mut out = format!("\n  {}\n\n", style("Available commands:").bold());
    for (cmd, desc) in rows {
        out.push_str(&format!("  {:<16} {desc}\n", style(cmd).cyan()));
    }
    out.push_str(&format!(
        "\n  {}\n",
        style("Ctrl+C stops a streaming response, Ctrl+D exits").dim()
    ));
    out
}

/// One line per turn, previews capped at 100 characters.
pub fn history_lines(history: &[ChatTurn]) -> Vec<String> {
    history
        .iter()
        .map(|turn| {
            let label = match turn.role {
                Role::User => style("You").green().bold(),
                Role::Assistant => style("Assistant").cyan().bold(),
                Role::System => style("System").dim(),
            };
            let preview = truncate(&turn.content.replace('\n', " "), 100);
            let tools = turn.tool_calls.as_ref().map_or(0, Vec::len);
            if tools > 0 {
                format!("{label} {preview} {}", style(format!("[{tools} tool calls]")).dim())
            } else {
                format!("{label} {preview}")
            }
        })
        .collect()
}

/// Read a file from disk as an attachment.
///
/// Files over `max_bytes` are refused before any content is read.
/// Non-UTF-8 bytes are replaced; the recorded size is the on-disk size.
pub async fn load_attachment(path: &Path, max_bytes: u64) -> anyhow::Result<AttachedFile> {
    let size = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?
        .len();
    if size > max_bytes {
        anyhow::bail!(
            "{} is {size} bytes, over the {max_bytes} byte limit",
            path.display()
        );
    }

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    Ok(AttachedFile {
        name,
        content: String::from_utf8_lossy(&bytes).into_owned(),
        size_bytes: bytes.len() as u64,
    })
}
