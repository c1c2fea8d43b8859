//! Interactive CLI chat for Parley.
//!
//! Streams assistant text as it arrives, prints one status line per tool
//! call, and handles slash commands. Entry point: `loop_runner::run_chat_loop`.

pub mod banner;
pub mod commands;
pub mod input;
pub mod loop_runner;
pub mod renderer;
