use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use ragchat_backend::ChatBackend;
use ragchat_session::{MessageStatus, SharedSessionStore};
use ragchat_stream::{Response, StreamEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::{SendError, TurnError};
use crate::event::{ChatEvent, Finish, TurnOutcome};
use crate::guard::guard;
use crate::{CANCELLED_MESSAGE, FAILURE_MESSAGE};

// ---------------------------------------------------------------------------
// Configuration and per-session state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Longest wait for the next body chunk. `None` waits forever.
    pub stream_idle_timeout: Option<Duration>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            stream_idle_timeout: Some(Duration::from_secs(120)),
        }
    }
}

/// Where a session's generation stands. A failed turn goes straight back to
/// `Idle` once its answer has been rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    /// The query is out; no body yet.
    Sending,
    /// The body is being decoded into the session.
    Streaming,
}

struct InFlight {
    state: TurnState,
    cancel: CancellationToken,
}

type InFlightMap = Arc<Mutex<HashMap<String, InFlight>>>;

// ---------------------------------------------------------------------------
// StreamCoordinator
// ---------------------------------------------------------------------------

/// Runs answer streams and applies them to the session store.
///
/// At most one generation runs per session; different sessions may stream
/// at the same time. Cheap to clone.
#[derive(Clone)]
pub struct StreamCoordinator {
    backend: Arc<dyn ChatBackend>,
    store: SharedSessionStore,
    config: CoordinatorConfig,
    in_flight: InFlightMap,
}

impl StreamCoordinator {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        store: SharedSessionStore,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            backend,
            store,
            config,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &SharedSessionStore {
        &self.store
    }

    pub fn state(&self, session_id: &str) -> TurnState {
        self.in_flight
            .lock()
            .get(session_id)
            .map_or(TurnState::Idle, |turn| turn.state)
    }

    pub fn is_busy(&self, session_id: &str) -> bool {
        self.state(session_id) != TurnState::Idle
    }

    /// Cancel the generation running in `session_id`, if any.
    pub fn cancel(&self, session_id: &str) -> bool {
        match self.in_flight.lock().get(session_id) {
            Some(turn) => {
                turn.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Ask `question` in `session_id` and stream the answer into the store.
    ///
    /// Refused while the session already has a generation in flight. The
    /// turn runs on a spawned task, so this must be called from within a
    /// Tokio runtime. Dropping the returned handle does not stop the turn.
    pub fn send(&self, session_id: &str, question: &str) -> Result<TurnHandle, SendError> {
        if question.trim().is_empty() {
            return Err(SendError::EmptyQuestion);
        }
        if !self.store.lock().contains(session_id) {
            return Err(SendError::UnknownSession(session_id.to_string()));
        }

        let cancel = CancellationToken::new();
        {
            let mut in_flight = self.in_flight.lock();
            if in_flight.contains_key(session_id) {
                tracing::debug!(session_id, "send refused, generation in flight");
                return Err(SendError::Busy(session_id.to_string()));
            }
            in_flight.insert(
                session_id.to_string(),
                InFlight {
                    state: TurnState::Sending,
                    cancel: cancel.clone(),
                },
            );
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let turn = Turn {
            session_id: session_id.to_string(),
            question: question.to_string(),
            backend: Arc::clone(&self.backend),
            store: Arc::clone(&self.store),
            in_flight: Arc::clone(&self.in_flight),
            idle_timeout: self.config.stream_idle_timeout,
            cancel: cancel.clone(),
            tx,
        };
        let task = tokio::spawn(turn.run());

        Ok(TurnHandle {
            session_id: session_id.to_string(),
            events: rx,
            cancel,
            task,
        })
    }
}

// ---------------------------------------------------------------------------
// TurnHandle
// ---------------------------------------------------------------------------

/// A running turn. Yields [`ChatEvent`]s until the turn has finished.
pub struct TurnHandle {
    session_id: String,
    events: mpsc::UnboundedReceiver<ChatEvent>,
    cancel: CancellationToken,
    task: JoinHandle<Result<TurnOutcome, TurnError>>,
}

impl TurnHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The next event, or `None` once the turn is over.
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        self.events.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the turn to end.
    pub async fn wait(self) -> Result<TurnOutcome, TurnError> {
        self.task
            .await
            .map_err(|e| TurnError::Aborted(e.to_string()))?
    }
}

// ---------------------------------------------------------------------------
// Turn (runs in spawned task)
// ---------------------------------------------------------------------------

struct Turn {
    session_id: String,
    question: String,
    backend: Arc<dyn ChatBackend>,
    store: SharedSessionStore,
    in_flight: InFlightMap,
    idle_timeout: Option<Duration>,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<ChatEvent>,
}

/// Clears the in-flight entry, also when the task unwinds.
struct Release {
    in_flight: InFlightMap,
    session_id: String,
}

impl Drop for Release {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.session_id);
    }
}

#[derive(Default)]
struct Accumulator {
    text: String,
    tokens: usize,
    errors: Vec<String>,
}

impl Accumulator {
    fn into_outcome(self, finish: Finish) -> TurnOutcome {
        TurnOutcome {
            text: self.text,
            tokens: self.tokens,
            errors: self.errors,
            finish,
        }
    }
}

impl Turn {
    async fn run(self) -> Result<TurnOutcome, TurnError> {
        let release = Release {
            in_flight: Arc::clone(&self.in_flight),
            session_id: self.session_id.clone(),
        };

        tracing::info!(
            session_id = %self.session_id,
            question_length = self.question.len(),
            "query request started"
        );
        let result = self.drive().await;

        // Idle before the final event, so a listener may send right away.
        drop(release);

        match &result {
            Ok(outcome) => {
                tracing::info!(
                    session_id = %self.session_id,
                    tokens = outcome.tokens,
                    finish = ?outcome.finish,
                    "turn complete"
                );
                self.emit(ChatEvent::TurnComplete {
                    session_id: self.session_id.clone(),
                    outcome: outcome.clone(),
                });
            }
            Err(err) => {
                tracing::error!(session_id = %self.session_id, %err, "query failed");
                self.emit(ChatEvent::TurnFailed {
                    session_id: self.session_id.clone(),
                    error: err.to_string(),
                });
            }
        }
        result
    }

    async fn drive(&self) -> Result<TurnOutcome, TurnError> {
        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            opened = self.backend.query(&self.question, &self.session_id) => Some(opened),
        };

        // The question is recorded even when no answer stream opened, so the
        // failure shows up in the conversation.
        let body = match opened {
            Some(Ok(body)) => body,
            Some(Err(err)) => {
                self.start_turn()?;
                self.store
                    .lock()
                    .fail_last_message(&self.session_id, FAILURE_MESSAGE)?;
                return Err(err.into());
            }
            None => {
                self.start_turn()?;
                return self.finish(Accumulator::default(), Finish::Cancelled);
            }
        };

        self.set_state(TurnState::Streaming);
        self.start_turn()?;

        let mut acc = Accumulator::default();
        let mut events =
            Response::from_body(guard(body, self.cancel.clone(), self.idle_timeout)).events();

        let finish = loop {
            let Some(event) = events.next().await else {
                break Finish::Truncated;
            };

            match event {
                Ok(StreamEvent::Token(token)) => {
                    self.store
                        .lock()
                        .patch_last_message(&self.session_id, &token)?;
                    acc.text.push_str(&token);
                    acc.tokens += 1;
                    self.emit(ChatEvent::TextDelta {
                        session_id: self.session_id.clone(),
                        delta: token,
                    });
                }
                Ok(StreamEvent::Error(message)) => {
                    tracing::warn!(session_id = %self.session_id, %message, "stream error");
                    self.emit(ChatEvent::StreamError {
                        session_id: self.session_id.clone(),
                        message: message.clone(),
                    });
                    acc.errors.push(message);
                }
                Ok(StreamEvent::Done) => break Finish::Done,
                Err(ragchat_stream::Error::Cancelled) => break Finish::Cancelled,
                Err(err) => {
                    self.store
                        .lock()
                        .fail_last_message(&self.session_id, FAILURE_MESSAGE)?;
                    return Err(err.into());
                }
            }
        };

        if finish == Finish::Truncated {
            tracing::warn!(
                session_id = %self.session_id,
                tokens = acc.tokens,
                "stream closed without [DONE]"
            );
        }
        self.finish(acc, finish)
    }

    fn start_turn(&self) -> Result<(), TurnError> {
        if !self
            .store
            .lock()
            .append_turn(&self.session_id, &self.question)
        {
            return Err(TurnError::SessionGone(self.session_id.clone()));
        }
        self.emit(ChatEvent::TurnStarted {
            session_id: self.session_id.clone(),
            question: self.question.clone(),
        });
        Ok(())
    }

    /// Freeze the answer. Text that arrived is always kept; an answer with
    /// no text is only a success if the stream completed without errors.
    fn finish(&self, acc: Accumulator, finish: Finish) -> Result<TurnOutcome, TurnError> {
        let mut store = self.store.lock();

        if acc.tokens > 0 {
            store.finish_last_message(&self.session_id, MessageStatus::Complete)?;
            return Ok(acc.into_outcome(finish));
        }

        match finish {
            Finish::Cancelled => {
                store.fail_last_message(&self.session_id, CANCELLED_MESSAGE)?;
                Ok(acc.into_outcome(finish))
            }
            Finish::Done if acc.errors.is_empty() => {
                store.finish_last_message(&self.session_id, MessageStatus::Complete)?;
                Ok(acc.into_outcome(finish))
            }
            Finish::Done | Finish::Truncated => {
                store.fail_last_message(&self.session_id, FAILURE_MESSAGE)?;
                Err(TurnError::NoAnswer { errors: acc.errors })
            }
        }
    }

    fn set_state(&self, state: TurnState) {
        if let Some(turn) = self.in_flight.lock().get_mut(&self.session_id) {
            turn.state = state;
        }
    }

    fn emit(&self, event: ChatEvent) {
        // The session store is authoritative; nobody listening is fine.
        let _ = self.tx.send(event);
    }
}
