//! Single-flight session title generation.
//!
//! A new session is titled once, from its first exchange. `TitleGuard`
//! ensures at most one title request is in flight and that a generated title
//! never overwrites one that was set in the meantime.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::session::storage::SessionStorage;
use crate::session::store::SessionStore;
use crate::transport::TitleGenerator;

/// Wraps a `TitleGenerator` with an in-flight latch.
pub struct TitleGuard<G> {
    generator: G,
    in_flight: AtomicBool,
}

/// Clears the latch when the title attempt finishes, however it finishes.
struct LatchRelease<'a>(&'a AtomicBool);

impl Drop for LatchRelease<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<G: TitleGenerator> TitleGuard<G> {
    pub fn new(generator: G) -> Self {
        Self {
            generator,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Whether a title request is currently running.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Whether a finished send should trigger title generation.
    ///
    /// `pre_send_len` is the history length including the new user turn but
    /// not the assistant placeholder.
    pub fn is_eligible(pre_send_len: usize, current_title: &str, placeholder: &str) -> bool {
        pre_send_len == 1 && current_title == placeholder
    }

    /// Generate and store a title for `session_id`.
    ///
    /// Returns the title written, or None when the attempt was skipped,
    /// failed, or lost to a title set in the meantime. Never errors.
    #[tracing::instrument(
        name = "generate_session_title",
        skip(self, store, first_user_message, first_assistant_message),
        fields(session_id = %session_id)
    )]
    pub async fn run<S: SessionStorage>(
        &self,
        store: &SessionStore<S>,
        session_id: &str,
        first_user_message: &str,
        first_assistant_message: &str,
    ) -> Option<String> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("title request already in flight, skipping");
            return None;
        }
        let _release = LatchRelease(&self.in_flight);

        let raw = match self
            .generator
            .generate_title(first_user_message, first_assistant_message)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "title generation failed");
                return None;
            }
        };

        let title = clean_title(&raw);
        let placeholder = store.config().placeholder_title.as_str();
        if title.is_empty() || title == placeholder {
            debug!(raw = %raw, "generated title discarded");
            return None;
        }

        match store.set_title_if_placeholder(session_id, &title).await {
            Ok(true) => {
                info!(title = %title, "session titled");
                Some(title)
            }
            Ok(false) => {
                debug!("session already titled, generated title discarded");
                None
            }
            Err(e) => {
                warn!(error = %e, "failed to store generated title");
                None
            }
        }
    }
}

/// Trim whitespace and surrounding quotes from a generated title.
pub fn clean_title(raw: &str) -> String {
    raw.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .trim()
        .to_string()
}
