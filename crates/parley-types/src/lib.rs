//! Shared domain types for Parley.
//!
//! This crate contains the types used across the Parley conversation engine:
//! stream events, chat turns and tool calls, stored sessions, configuration,
//! and the error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod session;
pub mod stream;
