//! Parley CLI entry point.
//!
//! Binary name: `parley`
//!
//! Parses CLI arguments, initializes tracing and the session store, then
//! dispatches to the chat loop or a session management command.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands, SessionCommand};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,parley=debug",
        _ => "trace",
    };
    parley_observe::tracing_setup::init_tracing(cli.otel, filter)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "parley", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init(cli.base_url.clone()).await?;

    let result = match cli.command {
        Commands::Chat { session, new } => {
            cli::chat::loop_runner::run_chat_loop(&state, session, new).await
        }

        Commands::Sessions { action } => match action {
            SessionCommand::List => cli::session::list_sessions(&state, cli.json),
            SessionCommand::Show { id } => cli::session::show_session(&state, &id, cli.json),
            SessionCommand::Rename { id, title } => {
                cli::session::rename_session(&state, &id, &title, cli.json).await
            }
            SessionCommand::Delete { id, force } => {
                cli::session::delete_session(&state, &id, force, cli.json).await
            }
            SessionCommand::New => cli::session::new_session(&state, cli.json).await,
        },

        Commands::Completions { .. } => Ok(()),
    };

    parley_observe::tracing_setup::shutdown_tracing();
    result
}
