use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sessions::{Message, MessageStatus, Session, derive_title};

pub type SharedSessionStore = Arc<Mutex<SessionStore>>;

/// All open conversations plus the active pointer.
///
/// Sessions are kept in creation order. The active id, when set, always
/// names an entry in the store.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Vec<Session>,
    active_id: Option<String>,
}

/// A serializable copy of the whole store, for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionsSnapshot {
    pub active_id: Option<String>,
    /// Newest first.
    pub sessions: Vec<Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedSessionStore {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.iter().find(|session| session.id == id)
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn active(&self) -> Option<&Session> {
        self.active_id.as_deref().and_then(|id| self.get(id))
    }

    /// Sessions newest first.
    pub fn list(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter().rev()
    }

    pub fn snapshot(&self) -> SessionsSnapshot {
        SessionsSnapshot {
            active_id: self.active_id.clone(),
            sessions: self.list().cloned().collect(),
        }
    }

    /// Insert an empty session and make it active. An id that is already
    /// present is simply selected.
    pub fn create(&mut self, id: impl Into<String>) -> &Session {
        let id = id.into();
        let index = match self.position(&id) {
            Some(index) => index,
            None => {
                self.sessions.push(Session::new(id.clone()));
                self.sessions.len() - 1
            }
        };

        tracing::debug!(session_id = %id, "session created");
        self.active_id = Some(id);
        &self.sessions[index]
    }

    pub fn select(&mut self, id: &str) -> Result<()> {
        if !self.contains(id) {
            return Err(Error::NotFound(id.to_string()));
        }
        self.active_id = Some(id.to_string());
        Ok(())
    }

    /// Remove a session. If it was active, the most recently created
    /// remaining session becomes active; if none remain, nothing is.
    pub fn delete(&mut self, id: &str) -> Result<Session> {
        let index = self
            .position(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let removed = self.sessions.remove(index);

        if self.active_id.as_deref() == Some(id) {
            // Newest first in `list`, so the replacement is what heads it.
            self.active_id = self.sessions.last().map(|session| session.id.clone());
        }

        tracing::debug!(session_id = %id, active = ?self.active_id, "session deleted");
        Ok(removed)
    }

    /// Start a turn: the question plus an empty answer to stream into.
    ///
    /// The first turn also sets the title. Returns false without changing
    /// anything if the session is unknown or already has a turn in flight.
    pub fn append_turn(&mut self, session_id: &str, question: &str) -> bool {
        let Some(session) = self.get_mut(session_id) else {
            return false;
        };

        if session.is_generating() {
            tracing::warn!(session_id, "turn already in flight, not appending");
            return false;
        }

        if session.messages.is_empty() {
            session.title = derive_title(question);
        }
        session.messages.push(Message::human(question));
        session.messages.push(Message::pending_ai());
        true
    }

    /// Append `delta` to the answer currently streaming in `session_id`.
    pub fn patch_last_message(&mut self, session_id: &str, delta: &str) -> Result<()> {
        let message = self.streaming_message_mut(session_id)?;
        message.content.push_str(delta);
        Ok(())
    }

    /// Freeze the streaming answer with the given final status.
    pub fn finish_last_message(&mut self, session_id: &str, status: MessageStatus) -> Result<()> {
        if status == MessageStatus::Streaming {
            return Err(Error::InvalidState {
                session_id: session_id.to_string(),
                reason: "cannot finish a message as streaming",
            });
        }

        let message = self.streaming_message_mut(session_id)?;
        message.status = status;
        Ok(())
    }

    /// Fail the streaming answer. `text` replaces the content only if
    /// nothing has been streamed into it; returns whether it did.
    pub fn fail_last_message(&mut self, session_id: &str, text: &str) -> Result<bool> {
        let message = self.streaming_message_mut(session_id)?;
        let replaced = message.content.is_empty();
        if replaced {
            message.content = text.to_string();
        }
        message.status = MessageStatus::Failed;
        Ok(replaced)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.sessions.iter().position(|session| session.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|session| session.id == id)
    }

    fn streaming_message_mut(&mut self, session_id: &str) -> Result<&mut Message> {
        let session = self
            .get_mut(session_id)
            .ok_or_else(|| Error::NotFound(session_id.to_string()))?;
        session
            .streaming_message_mut()
            .ok_or_else(|| Error::InvalidState {
                session_id: session_id.to_string(),
                reason: "last message is not an answer in progress",
            })
    }
}
