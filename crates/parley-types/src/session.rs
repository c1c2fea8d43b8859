//! Stored conversation sessions and their persisted layouts.
//!
//! A `StoredSession` is one conversation in the bounded multi-session store.
//! `SessionsLayout` is the versioned shape written to storage;
//! `LegacySessionLayout` is the older single-session shape that is migrated
//! on first load.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::{ChatTurn, Role};

/// Maximum length of a title derived from a migrated conversation.
const DERIVED_TITLE_MAX_CHARS: usize = 50;

/// One conversation held by the session store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    /// Client-generated identifier.
    pub id: String,
    pub title: String,
    /// Backend-assigned session id, adopted from a `done` event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl StoredSession {
    /// Create an empty session with a fresh id and the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            title: title.into(),
            session_id: None,
            history: Vec::new(),
            suggestions: None,
            summary: None,
            updated_at: Utc::now(),
        }
    }

    /// Whether nothing has been said in this session yet.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Apply a partial update and refresh `updated_at`.
    pub fn apply(&mut self, patch: SessionPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(session_id) = patch.session_id {
            self.session_id = Some(session_id);
        }
        if let Some(history) = patch.history {
            self.history = history;
        }
        if let Some(suggestions) = patch.suggestions {
            self.suggestions = Some(suggestions);
        }
        if let Some(summary) = patch.summary {
            self.summary = Some(summary);
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update merged into a session by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    pub title: Option<String>,
    pub session_id: Option<String>,
    pub history: Option<Vec<ChatTurn>>,
    pub suggestions: Option<Vec<String>>,
    pub summary: Option<String>,
}

impl SessionPatch {
    pub fn history(history: Vec<ChatTurn>) -> Self {
        Self {
            history: Some(history),
            ..Self::default()
        }
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }
}

/// Current persisted layout of the session store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsLayout {
    /// Newest first.
    #[serde(default)]
    pub sessions: Vec<StoredSession>,
    #[serde(default)]
    pub active_session_id: Option<String>,
}

/// Pre-multi-session layout: a single conversation record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacySessionLayout {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    #[serde(default)]
    pub suggestions: Option<Vec<String>>,
    #[serde(default)]
    pub summary: Option<String>,
}

impl LegacySessionLayout {
    /// Synthesize a stored session from the legacy record.
    ///
    /// The title comes from the first user message, truncated; the
    /// placeholder is used when there is no user message.
    pub fn into_session(self, placeholder_title: &str) -> StoredSession {
        let title = derive_title(&self.history).unwrap_or_else(|| placeholder_title.to_string());
        let mut session = StoredSession::new(title);
        session.session_id = self.session_id;
        session.history = self.history;
        session.suggestions = self.suggestions;
        session.summary = self.summary;
        session
    }
}

/// Title derived from the first user message, if any.
pub fn derive_title(history: &[ChatTurn]) -> Option<String> {
    let first = history
        .iter()
        .find(|turn| turn.role == Role::User)?
        .content
        .trim();
    if first.is_empty() {
        return None;
    }
    if first.chars().count() > DERIVED_TITLE_MAX_CHARS {
        let truncated: String = first.chars().take(DERIVED_TITLE_MAX_CHARS).collect();
        Some(format!("{}...", truncated.trim_end()))
    } else {
        Some(first.to_string())
    }
}
