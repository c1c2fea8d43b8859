//! Main chat loop.
//!
//! Resolves the session to chat in, then reads input until exit. While a
//! response streams, the loop keeps reading keys so Ctrl+C or `/stop` can
//! cancel it, and renders live state from the orchestrator's watch channel.

use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use rustyline_async::SharedWriter;
use tracing::{debug, info};

use parley_types::chat::{AttachedFile, Role};
use parley_types::error::ChatError;

use crate::state::{AppState, ConcreteOrchestrator};

use super::banner::session_banner;
use super::commands::{self, ChatCommand};
use super::input::{ChatInput, InputEvent};
use super::renderer::StreamPrinter;

/// How a streamed call ended, from the loop's point of view.
struct StreamEnd {
    result: Result<(), ChatError>,
    stopped: bool,
    exit_requested: bool,
    printed: bool,
}

/// Run the interactive chat loop.
///
/// `session` resumes a stored session; `new` starts a fresh one. With
/// neither, the store's active session is used.
pub async fn run_chat_loop(
    state: &AppState,
    session: Option<String>,
    new: bool,
) -> anyhow::Result<()> {
    let orch = state.orchestrator()?;

    let current = if new {
        orch.new_conversation().await?
    } else if let Some(id) = session {
        orch.switch_session(&id).await?
    } else {
        let active = state.store.ensure_active_session().await?;
        orch.switch_session(&active.id).await?
    };
    info!(session = %current.id, "chat started");

    let prompt = format!("  {} ", style("You >").green().bold());
    let (mut input, mut writer) =
        ChatInput::new(prompt).map_err(|e| anyhow::anyhow!("Failed to initialize input: {e}"))?;

    write!(writer, "{}", session_banner(&current, &state.config.base_url))?;

    let mut pending_files: Vec<AttachedFile> = Vec::new();

    loop {
        let text = match input.read_line().await {
            InputEvent::Eof => break,
            InputEvent::Interrupted => {
                writeln!(
                    writer,
                    "  {}",
                    style("Press Ctrl+D to exit, or keep chatting.").dim()
                )?;
                continue;
            }
            InputEvent::Message(text) => text,
        };

        if let Some(cmd) = commands::parse(&text) {
            match cmd {
                ChatCommand::Help => write!(writer, "{}", commands::help_text())?,
                ChatCommand::Exit => break,
                ChatCommand::Stop => {
                    writeln!(writer, "  {}", style("Nothing is streaming.").dim())?;
                }
                ChatCommand::History => {
                    let history = orch.state().history;
                    writeln!(writer)?;
                    if history.is_empty() {
                        writeln!(writer, "  {}", style("No messages yet.").dim())?;
                    }
                    for line in commands::history_lines(&history) {
                        writeln!(writer, "  {line}")?;
                    }
                    writeln!(writer)?;
                }
                ChatCommand::New => match orch.new_conversation().await {
                    Ok(session) => {
                        pending_files.clear();
                        write!(writer, "{}", session_banner(&session, &state.config.base_url))?;
                    }
                    Err(e) => print_error(&mut writer, &e)?,
                },
                ChatCommand::Attach(path) => match commands::load_attachment(
                    Path::new(&path),
                    state.config.max_file_bytes,
                )
                .await
                {
                    Ok(file) => {
                        writeln!(
                            writer,
                            "  {} Attached {} ({} bytes). It will be sent with your next message.",
                            style("+").green().bold(),
                            style(&file.name).cyan(),
                            file.size_bytes
                        )?;
                        pending_files.push(file);
                    }
                    Err(e) => {
                        writeln!(writer, "  {} {e:#}", style("!").red().bold())?;
                    }
                },
                ChatCommand::Regenerate => {
                    let turn_index = orch
                        .state()
                        .history
                        .iter()
                        .rposition(|turn| turn.role == Role::User)
                        .map_or(0, |i| i + 1);
                    let end = stream_call(
                        &orch,
                        &mut input,
                        &mut writer,
                        turn_index,
                        orch.regenerate_response(),
                    )
                    .await?;
                    if report(&orch, &mut writer, end)? {
                        break;
                    }
                }
                ChatCommand::Unknown(name) => {
                    writeln!(
                        writer,
                        "  {} Unknown command: {}. Type /help for available commands.",
                        style("?").yellow().bold(),
                        style(name).dim()
                    )?;
                }
            }
            continue;
        }

        if text.is_empty() && pending_files.is_empty() {
            continue;
        }

        let files = std::mem::take(&mut pending_files);
        let message = (!text.is_empty()).then_some(text.as_str());
        // User turn lands at the current length, the answer right after.
        let turn_index = orch.state().history.len() + 1;
        let end = stream_call(
            &orch,
            &mut input,
            &mut writer,
            turn_index,
            orch.send_message(message, files),
        )
        .await?;
        if report(&orch, &mut writer, end)? {
            break;
        }
    }

    writeln!(writer, "\n  {}", style("Session ended.").dim())?;
    orch.stop_generation();
    orch.wait_for_background().await;
    debug!("chat loop finished");
    Ok(())
}

/// Drive one orchestration call while rendering its live state.
async fn stream_call<F>(
    orch: &ConcreteOrchestrator,
    input: &mut ChatInput,
    writer: &mut SharedWriter,
    turn_index: usize,
    call: F,
) -> anyhow::Result<StreamEnd>
where
    F: Future<Output = Result<(), ChatError>>,
{
    let mut rx = orch.subscribe();
    let mut printer = StreamPrinter::new(turn_index);
    let mut stopped = false;
    let mut exit_requested = false;

    let spinner = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(spinner_style);
    }
    spinner.set_message("thinking...");
    spinner.enable_steady_tick(Duration::from_millis(80));

    tokio::pin!(call);

    let result = loop {
        tokio::select! {
            result = &mut call => break result,
            Ok(()) = rx.changed() => {
                let out = printer.update(&rx.borrow_and_update());
                if !out.is_empty() {
                    spinner.finish_and_clear();
                    write!(writer, "{out}")?;
                    writer.flush()?;
                }
            }
            event = input.read_line() => match event {
                InputEvent::Interrupted => {
                    stopped = true;
                    orch.stop_generation();
                }
                InputEvent::Eof => {
                    stopped = true;
                    exit_requested = true;
                    orch.stop_generation();
                }
                InputEvent::Message(text) => {
                    if matches!(commands::parse(&text), Some(ChatCommand::Stop)) {
                        stopped = true;
                        orch.stop_generation();
                    } else if !text.is_empty() {
                        writeln!(
                            writer,
                            "  {}",
                            style("Still answering. Use /stop or Ctrl+C to cancel.").dim()
                        )?;
                    }
                }
            },
        }
    };

    spinner.finish_and_clear();
    let out = printer.update(&rx.borrow_and_update());
    write!(writer, "{out}{}", printer.finish())?;
    writer.flush()?;

    Ok(StreamEnd {
        result,
        stopped,
        exit_requested,
        printed: printer.has_output(),
    })
}

/// Report how a call ended. Returns whether the loop should exit.
fn report(
    orch: &ConcreteOrchestrator,
    writer: &mut SharedWriter,
    end: StreamEnd,
) -> anyhow::Result<bool> {
    match &end.result {
        Err(e) => print_error(writer, e)?,
        Ok(()) if end.stopped => {
            writeln!(writer, "  {}\n", style("[stopped]").yellow())?;
        }
        Ok(()) => {
            if !end.printed {
                writeln!(writer, "  {}\n", style("(no response)").dim())?;
            }
            let suggestions = orch
                .store()
                .active_session()
                .and_then(|session| session.suggestions)
                .unwrap_or_default();
            if !suggestions.is_empty() {
                writeln!(writer, "  {}", style("Suggestions:").bold())?;
                for suggestion in suggestions {
                    writeln!(writer, "    {} {suggestion}", style("-").dim())?;
                }
                writeln!(writer)?;
            }
        }
    }
    Ok(end.exit_requested)
}

fn print_error(writer: &mut SharedWriter, error: &ChatError) -> anyhow::Result<()> {
    writeln!(writer, "\n  {} {}", style("!").red().bold(), error.user_message())?;
    if matches!(error, ChatError::Transport(_) | ChatError::Server(_)) {
        writeln!(
            writer,
            "  {}",
            style("Nothing from this exchange was kept. Try again or /exit to quit.").dim()
        )?;
    }
    writeln!(writer)?;
    Ok(())
}
