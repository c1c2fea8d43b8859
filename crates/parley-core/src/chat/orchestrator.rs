//! Send/regenerate orchestration for the active conversation.
//!
//! `ChatOrchestrator` is the state machine a front-end drives. Each
//! orchestration call (`send_message` or `regenerate_response`) runs
//! `idle -> sending -> {done | error | cancelled}`:
//!
//! 1. Mutate live state optimistically and persist it.
//! 2. Open the stream and apply every decoded event to the assistant turn,
//!    persisting after each local change.
//! 3. On `done`, adopt backend session data and maybe title the session. On
//!    an error event or transport failure, restore the pre-call snapshot.
//!    Cancellation keeps whatever arrived.
//!
//! Live state is published through a `watch` channel; presentation
//! subscribes with [`ChatOrchestrator::subscribe`].

use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parley_types::chat::{
    AttachedFile, ChatRequestBody, ChatState, ChatTurn, Role, outbound_transcript,
};
use parley_types::error::{ChatError, TransportError};
use parley_types::session::{SessionPatch, StoredSession};
use parley_types::stream::StreamEvent;

use super::accumulator::TurnAccumulator;
use super::title::TitleGuard;
use super::tool_calls::ToolCallTracker;
use crate::session::storage::SessionStorage;
use crate::session::store::SessionStore;
use crate::stream::decoder::decode_stream;
use crate::transport::{ChatTransport, TitleGenerator};

/// Everything one orchestration call needs after its optimistic update.
struct Turn {
    /// Store id of the session this call writes to.
    session_id: String,
    snapshot_history: Vec<ChatTurn>,
    snapshot_input: String,
    /// Content of the user turn being answered.
    user_message: String,
    /// History length including the user turn, excluding the placeholder.
    pre_send_len: usize,
    body: ChatRequestBody,
}

enum TurnOutcome {
    Done {
        backend_session_id: Option<String>,
        suggestions: Option<Vec<String>>,
        assistant_text: String,
    },
    /// The body closed without a `done` event.
    Ended,
    Cancelled,
}

/// Clears the in-flight slot when an orchestration call finishes.
struct ActiveCall<'a> {
    slot: &'a Mutex<Option<CancellationToken>>,
    token: CancellationToken,
}

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }
}

/// Drives conversation turns against a transport and a session store.
pub struct ChatOrchestrator<T, S: SessionStorage, G> {
    transport: T,
    store: Arc<SessionStore<S>>,
    titles: Arc<TitleGuard<G>>,
    max_file_bytes: u64,
    state: watch::Sender<ChatState>,
    /// Store id of the session the live history belongs to.
    live_session: Mutex<Option<String>>,
    /// Cancellation handle of the call in flight, if any.
    in_flight: Mutex<Option<CancellationToken>>,
    title_task: Mutex<Option<JoinHandle<()>>>,
}

impl<T, S, G> ChatOrchestrator<T, S, G>
where
    T: ChatTransport,
    S: SessionStorage + 'static,
    G: TitleGenerator + 'static,
{
    /// Create an orchestrator whose live state starts from the store's
    /// active session.
    pub fn new(
        transport: T,
        store: Arc<SessionStore<S>>,
        title_generator: G,
        max_file_bytes: u64,
    ) -> Self {
        let active = store.active_session();
        let live_session = active.as_ref().map(|session| session.id.clone());
        let (state, _) = watch::channel(ChatState {
            history: active.map(|session| session.history).unwrap_or_default(),
            ..ChatState::default()
        });

        Self {
            transport,
            store,
            titles: Arc::new(TitleGuard::new(title_generator)),
            max_file_bytes,
            state,
            live_session: Mutex::new(live_session),
            in_flight: Mutex::new(None),
            title_task: Mutex::new(None),
        }
    }

    /// Receiver of live state updates.
    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.state.subscribe()
    }

    /// Current live state.
    pub fn state(&self) -> ChatState {
        self.state.borrow().clone()
    }

    pub fn store(&self) -> &Arc<SessionStore<S>> {
        &self.store
    }

    /// Whether an orchestration call is in flight.
    pub fn is_streaming(&self) -> bool {
        self.lock_in_flight().is_some()
    }

    /// Update the pending input text.
    pub fn set_input(&self, text: impl Into<String>) {
        let text = text.into();
        self.state.send_modify(|state| state.input = text);
    }

    /// Send a user message and stream the assistant's answer.
    ///
    /// Returns once the stream reaches a terminal state. Cancellation via
    /// [`stop_generation`](Self::stop_generation) returns `Ok(())`.
    #[tracing::instrument(name = "send_message", skip(self, text, files), fields(files = files.len()))]
    pub async fn send_message(
        &self,
        text: Option<&str>,
        files: Vec<AttachedFile>,
    ) -> Result<(), ChatError> {
        let text = text.map(str::trim).filter(|t| !t.is_empty());
        if text.is_none() && files.is_empty() {
            return Err(ChatError::Validation(
                "a message needs text or at least one file".to_string(),
            ));
        }

        let oversized: Vec<String> = files
            .iter()
            .filter(|file| file.size_bytes > self.max_file_bytes)
            .map(|file| file.name.clone())
            .collect();
        if !oversized.is_empty() {
            return Err(ChatError::PayloadTooLarge {
                files: oversized,
                limit_bytes: self.max_file_bytes,
            });
        }

        let call = self.begin_call()?;
        self.sync_with_store();
        let session = self.store.ensure_active_session().await?;
        self.set_live_session(&session.id);
        let snapshot = self.state();

        let user_message = match text {
            Some(text) => text.to_string(),
            None => attachment_placeholder(&files),
        };

        let history = self.apply_locally(|state| {
            state.history.push(ChatTurn::user(user_message.clone()));
            state.input.clear();
            state.error = None;
            state.is_loading = true;
        });
        let pre_send_len = history.len();
        let messages = outbound_transcript(&history);
        self.persist(&session.id, history).await;

        self.apply_locally(|state| state.history.push(ChatTurn::assistant("")));

        let turn = Turn {
            session_id: session.id,
            snapshot_history: snapshot.history,
            snapshot_input: snapshot.input,
            pre_send_len,
            body: ChatRequestBody {
                session_id: session.session_id,
                message: text.map(str::to_string),
                files,
                messages,
            },
            user_message,
        };
        self.run_turn(turn, &call.token).await
    }

    /// Discard the last answer and stream a new one for the same user turn.
    #[tracing::instrument(name = "regenerate_response", skip(self))]
    pub async fn regenerate_response(&self) -> Result<(), ChatError> {
        let call = self.begin_call()?;
        self.sync_with_store();
        let snapshot = self.state();
        let last_user = snapshot
            .history
            .iter()
            .rposition(|turn| turn.role == Role::User)
            .ok_or(ChatError::NoUserMessage)?;
        let session = self.store.ensure_active_session().await?;
        self.set_live_session(&session.id);

        let history = self.apply_locally(|state| {
            state.history.truncate(last_user + 1);
            state.error = None;
            state.is_loading = true;
        });
        let user_message = history[last_user].content.clone();
        let pre_send_len = history.len();
        let messages = outbound_transcript(&history);
        self.persist(&session.id, history).await;

        self.apply_locally(|state| state.history.push(ChatTurn::assistant("")));

        let turn = Turn {
            session_id: session.id,
            snapshot_history: snapshot.history,
            snapshot_input: snapshot.input,
            pre_send_len,
            body: ChatRequestBody {
                session_id: session.session_id,
                message: Some(user_message.clone()),
                files: Vec::new(),
                messages,
            },
            user_message,
        };
        self.run_turn(turn, &call.token).await
    }

    /// Cancel the call in flight, keeping whatever content arrived.
    pub fn stop_generation(&self) {
        if let Some(token) = self.lock_in_flight().as_ref() {
            info!("stopping generation");
            token.cancel();
        }
        self.state.send_modify(|state| state.is_loading = false);
    }

    /// Start a fresh session and reset live state.
    pub async fn new_conversation(&self) -> Result<StoredSession, ChatError> {
        if self.is_streaming() {
            return Err(ChatError::AlreadyStreaming);
        }
        let session = self.store.create_session().await?;
        self.set_live_session(&session.id);
        self.state.send_replace(ChatState::default());
        Ok(session)
    }

    /// Make a stored session active and load its history into live state.
    pub async fn switch_session(&self, id: &str) -> Result<StoredSession, ChatError> {
        if self.is_streaming() {
            return Err(ChatError::AlreadyStreaming);
        }
        let session = self.store.select_session(id).await?;
        self.set_live_session(&session.id);
        self.state.send_replace(ChatState {
            history: session.history.clone(),
            ..ChatState::default()
        });
        Ok(session)
    }

    /// Wait for a pending title request to finish.
    pub async fn wait_for_background(&self) {
        let task = self
            .title_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "title task did not complete");
            }
        }
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_live_session(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.live_session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_live_session(&self, id: &str) {
        *self.lock_live_session() = Some(id.to_string());
    }

    /// Reload live state if the store's active session changed underneath.
    ///
    /// The store is shared, so another holder may select or delete sessions.
    /// Live history must never be written into a session it was not loaded
    /// from.
    fn sync_with_store(&self) {
        let active = self.store.active_session();
        let active_id = active.as_ref().map(|session| session.id.clone());
        {
            let mut live = self.lock_live_session();
            if *live == active_id {
                return;
            }
            info!(from = ?*live, to = ?active_id, "active session changed, reloading history");
            *live = active_id;
        }
        self.state.send_modify(|state| {
            state.history = active.map(|session| session.history).unwrap_or_default();
            state.error = None;
        });
    }

    fn begin_call(&self) -> Result<ActiveCall<'_>, ChatError> {
        let mut slot = self.lock_in_flight();
        if slot.is_some() {
            return Err(ChatError::AlreadyStreaming);
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        Ok(ActiveCall {
            slot: &self.in_flight,
            token,
        })
    }

    /// Mutate live state and notify subscribers. Returns the new history.
    fn apply_locally(&self, f: impl FnOnce(&mut ChatState)) -> Vec<ChatTurn> {
        let mut history = Vec::new();
        self.state.send_modify(|state| {
            f(state);
            history = state.history.clone();
        });
        history
    }

    /// Write a history through to the store. Failures do not end the turn.
    async fn persist(&self, session_id: &str, history: Vec<ChatTurn>) {
        if let Err(e) = self
            .store
            .update_session(session_id, SessionPatch::history(history))
            .await
        {
            warn!(session_id = %session_id, error = %e, "failed to persist history");
        }
    }

    async fn run_turn(&self, turn: Turn, cancel: &CancellationToken) -> Result<(), ChatError> {
        match self.consume(&turn, cancel).await {
            Ok(TurnOutcome::Done {
                backend_session_id,
                suggestions,
                assistant_text,
            }) => {
                self.state.send_modify(|state| state.is_loading = false);
                self.complete(&turn, backend_session_id, suggestions, assistant_text)
                    .await;
                Ok(())
            }
            Ok(TurnOutcome::Ended) => {
                debug!("stream closed without a done event");
                self.settle_without_answer(&turn).await;
                Ok(())
            }
            Ok(TurnOutcome::Cancelled) => {
                debug!("generation cancelled");
                self.settle_without_answer(&turn).await;
                Ok(())
            }
            Err(e) => {
                self.roll_back(&turn, &e).await;
                Err(e)
            }
        }
    }

    /// Read the stream to a terminal state, applying each event in order.
    async fn consume(
        &self,
        turn: &Turn,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, ChatError> {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(TurnOutcome::Cancelled),
            opened = self.transport.open(&turn.body, cancel.clone()) => opened,
        };
        let bytes = match opened {
            Ok(bytes) => bytes,
            Err(TransportError::Cancelled) => return Ok(TurnOutcome::Cancelled),
            Err(e) => return Err(e.into()),
        };

        let mut events = decode_stream(bytes);
        let mut tracker = ToolCallTracker::new();
        let mut accumulator = TurnAccumulator::new(turn.pre_send_len);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(TurnOutcome::Cancelled),
                next = events.next() => next,
            };
            let event = match next {
                None => return Ok(TurnOutcome::Ended),
                Some(Ok(event)) => event,
                Some(Err(TransportError::Cancelled)) => return Ok(TurnOutcome::Cancelled),
                Some(Err(e)) => return Err(e.into()),
            };

            match event {
                StreamEvent::Chunk { content } => {
                    let history = self.apply_locally(|state| {
                        accumulator.apply_chunk(&mut state.history, &content)
                    });
                    self.persist(&turn.session_id, history).await;
                }
                StreamEvent::Done {
                    session_id,
                    suggestions,
                } => {
                    return Ok(TurnOutcome::Done {
                        backend_session_id: session_id,
                        suggestions,
                        assistant_text: accumulator.content().to_string(),
                    });
                }
                StreamEvent::Error { message } => return Err(ChatError::Server(message)),
                tool_event => match tracker.apply(&tool_event) {
                    Ok(true) => {
                        let calls = tracker.calls().to_vec();
                        let history = self.apply_locally(|state| {
                            accumulator.apply_tool_calls(&mut state.history, calls)
                        });
                        self.persist(&turn.session_id, history).await;
                    }
                    Ok(false) => {}
                    Err(e) => debug!(error = %e, "tool call event ignored"),
                },
            }
        }
    }

    /// Adopt backend session data and start title generation if eligible.
    async fn complete(
        &self,
        turn: &Turn,
        backend_session_id: Option<String>,
        suggestions: Option<Vec<String>>,
        assistant_text: String,
    ) {
        if backend_session_id.is_some() || suggestions.is_some() {
            let patch = SessionPatch {
                session_id: backend_session_id,
                suggestions,
                ..SessionPatch::default()
            };
            if let Err(e) = self.store.update_session(&turn.session_id, patch).await {
                warn!(session_id = %turn.session_id, error = %e, "failed to store session metadata");
            }
        }

        let Some(session) = self.store.session(&turn.session_id) else {
            return;
        };
        let placeholder = &self.store.config().placeholder_title;
        if !TitleGuard::<G>::is_eligible(turn.pre_send_len, &session.title, placeholder) {
            return;
        }

        let titles = Arc::clone(&self.titles);
        let store = Arc::clone(&self.store);
        let session_id = turn.session_id.clone();
        let user_message = turn.user_message.clone();
        let task = tokio::spawn(async move {
            titles
                .run(&store, &session_id, &user_message, &assistant_text)
                .await;
        });
        *self.title_task.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
    }

    /// Stop loading, dropping the assistant turn if nothing arrived for it.
    async fn settle_without_answer(&self, turn: &Turn) {
        let mut dropped = false;
        let history = self.apply_locally(|state| {
            state.is_loading = false;
            let unanswered = state.history.len() == turn.pre_send_len + 1
                && state.history.last().is_some_and(|last| {
                    last.role == Role::Assistant
                        && last.content.is_empty()
                        && last.tool_calls.as_ref().is_none_or(Vec::is_empty)
                });
            if unanswered {
                state.history.pop();
                dropped = true;
            }
        });
        if dropped {
            self.persist(&turn.session_id, history).await;
        }
    }

    /// Restore the pre-call snapshot and surface the error.
    async fn roll_back(&self, turn: &Turn, error: &ChatError) {
        warn!(error = %error, "chat turn failed, restoring previous history");
        let message = error.user_message();
        let history = self.apply_locally(|state| {
            state.history = turn.snapshot_history.clone();
            state.input = turn.snapshot_input.clone();
            state.is_loading = false;
            state.error = Some(message);
        });
        self.persist(&turn.session_id, history).await;
    }
}

/// User turn content for a message with files but no text.
fn attachment_placeholder(files: &[AttachedFile]) -> String {
    let names: Vec<&str> = files.iter().map(|file| file.name.as_str()).collect();
    format!("[Attached files: {}]", names.join(", "))
}
