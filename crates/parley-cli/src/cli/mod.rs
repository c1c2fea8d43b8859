//! CLI command definitions for the `parley` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod chat;
pub mod session;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Chat with a streaming conversational agent from the terminal.
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Backend base URL, overriding config.toml.
    #[arg(long, global = true, env = "PARLEY_BASE_URL")]
    pub base_url: Option<String>,

    /// Export spans to stdout via OpenTelemetry.
    #[arg(long, global = true, hide = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat in the active session.
    Chat {
        /// Resume a stored session by ID.
        #[arg(long, conflicts_with = "new")]
        session: Option<String>,

        /// Start in a fresh session.
        #[arg(long)]
        new: bool,
    },

    /// Manage stored sessions.
    Sessions {
        #[command(subcommand)]
        action: SessionCommand,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum SessionCommand {
    /// List stored sessions, newest first.
    #[command(alias = "ls")]
    List,

    /// Print a session's conversation.
    Show {
        /// Session ID.
        id: String,
    },

    /// Rename a session.
    Rename {
        /// Session ID.
        id: String,

        /// New title.
        title: String,
    },

    /// Delete a session.
    #[command(alias = "rm")]
    Delete {
        /// Session ID.
        id: String,

        /// Skip confirmation prompt.
        #[arg(long)]
        force: bool,
    },

    /// Create an empty session and make it active.
    New,
}
