//! Session management CLI commands: list, show, rename, delete, new.
//!
//! Operates directly on the session store; no backend calls are made.

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dialoguer::Confirm;

use parley_types::chat::{Role, ToolCallStatus};
use parley_types::session::StoredSession;

use crate::state::AppState;

/// List stored sessions with title, last update, turn count, and ID.
///
/// # Examples
///
/// ```bash
/// parley sessions list
/// parley sessions list --json
/// ```
pub fn list_sessions(state: &AppState, json: bool) -> Result<()> {
    let sessions = state.store.sessions();
    let active = state.store.active_session_id();

    if json {
        let out = serde_json::json!({
            "sessions": sessions,
            "activeSessionId": active,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!();
        println!(
            "  {} No sessions yet. Start one with: {}",
            style("i").blue().bold(),
            style("parley chat").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("").fg(Color::White),
        Cell::new("Title").fg(Color::White),
        Cell::new("Updated").fg(Color::White),
        Cell::new("Turns").fg(Color::White),
        Cell::new("ID").fg(Color::White),
    ]);

    for session in &sessions {
        let marker = if active.as_deref() == Some(session.id.as_str()) {
            Cell::new("*").fg(Color::Green)
        } else {
            Cell::new("")
        };

        table.add_row(vec![
            marker,
            Cell::new(truncate(&session.title, 40)).fg(Color::Cyan),
            Cell::new(session.updated_at.format("%Y-%m-%d %H:%M").to_string()).fg(Color::White),
            Cell::new(session.history.len().to_string()).fg(Color::White),
            Cell::new(&session.id).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} session{} in {}",
        style(sessions.len()).bold(),
        if sessions.len() == 1 { "" } else { "s" },
        style(state.data_dir.display()).dim()
    );
    println!();

    Ok(())
}

/// Print a stored session's conversation.
pub fn show_session(state: &AppState, id: &str, json: bool) -> Result<()> {
    let session = state
        .store
        .session(id)
        .with_context(|| format!("Session '{id}' not found"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
        return Ok(());
    }

    println!();
    println!("  {}", style(&session.title).cyan().bold());
    println!(
        "  {}",
        style(format!(
            "{} · updated {}",
            session.id,
            session.updated_at.format("%Y-%m-%d %H:%M UTC")
        ))
        .dim()
    );
    println!();
    for line in transcript_lines(&session) {
        println!("  {line}");
    }
    if let Some(suggestions) = session.suggestions.as_ref().filter(|s| !s.is_empty()) {
        println!();
        println!("  {}", style("Suggestions:").bold());
        for suggestion in suggestions {
            println!("    - {suggestion}");
        }
    }
    println!();

    Ok(())
}

pub async fn rename_session(state: &AppState, id: &str, title: &str, json: bool) -> Result<()> {
    let title = title.trim();
    if title.is_empty() {
        anyhow::bail!("Title cannot be empty");
    }
    state
        .store
        .rename_session(id, title)
        .await
        .with_context(|| format!("Failed to rename session '{id}'"))?;

    if json {
        println!("{}", serde_json::json!({"id": id, "title": title}));
    } else {
        println!("  {} Session renamed to '{}'.", style("✓").green().bold(), title);
    }
    Ok(())
}

/// Delete a session with confirmation.
///
/// # Examples
///
/// ```bash
/// parley sessions delete <id>
/// parley sessions delete <id> --force
/// ```
pub async fn delete_session(state: &AppState, id: &str, force: bool, json: bool) -> Result<()> {
    let session = state
        .store
        .session(id)
        .with_context(|| format!("Session '{id}' not found"))?;

    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete session '{}' ({} turns)?",
                style(&session.title).red().bold(),
                session.history.len()
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    let active = state.store.delete_session(id).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({"deleted": true, "id": id, "activeSessionId": active})
        );
    } else {
        println!("  {} Session '{}' deleted.", style("x").red().bold(), session.title);
    }
    Ok(())
}

pub async fn new_session(state: &AppState, json: bool) -> Result<()> {
    let session = state.store.create_session().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
    } else {
        println!(
            "  {} New session {} is now active.",
            style("+").green().bold(),
            style(&session.id).dim()
        );
    }
    Ok(())
}

// --- Formatting helpers ---

/// Plain-text transcript of a session, one entry per line.
fn transcript_lines(session: &StoredSession) -> Vec<String> {
    let mut lines = Vec::new();
    for turn in &session.history {
        let label = match turn.role {
            Role::User => "You",
            Role::Assistant => "Assistant",
            Role::System => "System",
        };
        lines.push(format!("{label}: {}", turn.content));
        for call in turn.tool_calls.iter().flatten() {
            let outcome = match call.status {
                ToolCallStatus::Calling => "interrupted".to_string(),
                ToolCallStatus::Completed => "completed".to_string(),
                ToolCallStatus::Error => format!(
                    "failed: {}",
                    call.error.as_deref().unwrap_or("unknown error")
                ),
            };
            lines.push(format!("  [tool] {} {outcome}", call.name));
        }
    }
    lines
}

/// Shorten to `max` characters, marking the cut with "...".
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}
