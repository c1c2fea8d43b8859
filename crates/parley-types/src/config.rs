//! Engine configuration types for Parley.
//!
//! `EngineConfig` represents the top-level `config.toml` that controls the
//! backend endpoints, session store bounds, and attachment limits.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the Parley engine.
///
/// Loaded from `~/.parley/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base URL of the chat backend.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the streaming chat endpoint.
    #[serde(default = "default_chat_path")]
    pub chat_path: String,

    /// Path of the title generation endpoint.
    #[serde(default = "default_title_path")]
    pub title_path: String,

    /// HTTP timeout for a whole request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum number of sessions kept in the store.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Per-file attachment ceiling in bytes.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Title given to new sessions until a real one is generated.
    #[serde(default = "default_placeholder_title")]
    pub placeholder_title: String,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_chat_path() -> String {
    "/api/chat/stream".to_string()
}

fn default_title_path() -> String {
    "/api/chat/title".to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_max_sessions() -> usize {
    20
}

fn default_max_file_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_placeholder_title() -> String {
    "New Chat".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chat_path: default_chat_path(),
            title_path: default_title_path(),
            request_timeout_secs: default_request_timeout_secs(),
            max_sessions: default_max_sessions(),
            max_file_bytes: default_max_file_bytes(),
            placeholder_title: default_placeholder_title(),
        }
    }
}

impl EngineConfig {
    /// Session store bounds derived from this config.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            max_sessions: self.max_sessions.max(1),
            placeholder_title: self.placeholder_title.clone(),
        }
    }
}

/// Bounds and defaults for the session store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub max_sessions: usize,
    pub placeholder_title: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        EngineConfig::default().store_config()
    }
}
