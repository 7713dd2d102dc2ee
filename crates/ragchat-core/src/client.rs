use std::sync::Arc;

use ragchat_backend::ChatBackend;
use ragchat_session::{SessionStore, SessionsSnapshot, SharedSessionStore};
use tokio::sync::Mutex;

use crate::coordinator::{CoordinatorConfig, StreamCoordinator, TurnHandle};
use crate::error::{ClientError, SendError};

/// Session management and sending, as a frontend sees it.
///
/// After [`init`](ChatClient::init) has succeeded there is always an active
/// session: deleting the last one replaces it.
pub struct ChatClient {
    backend: Arc<dyn ChatBackend>,
    store: SharedSessionStore,
    coordinator: StreamCoordinator,
    /// Deletes run one at a time, from the last-session check to removal.
    deleting: Mutex<()>,
}

impl ChatClient {
    pub fn new(backend: Arc<dyn ChatBackend>, config: CoordinatorConfig) -> Self {
        let store = SessionStore::shared();
        let coordinator = StreamCoordinator::new(Arc::clone(&backend), Arc::clone(&store), config);
        Self {
            backend,
            store,
            coordinator,
            deleting: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &SharedSessionStore {
        &self.store
    }

    pub fn coordinator(&self) -> &StreamCoordinator {
        &self.coordinator
    }

    pub fn snapshot(&self) -> SessionsSnapshot {
        self.store.lock().snapshot()
    }

    pub fn active_id(&self) -> Option<String> {
        self.store.lock().active_id().map(ToString::to_string)
    }

    /// Make sure a session exists and is active. Returns its id.
    pub async fn init(&self) -> Result<String, ClientError> {
        if let Some(id) = self.active_id() {
            return Ok(id);
        }
        self.new_session().await
    }

    /// Open a new backend session and make it active.
    pub async fn new_session(&self) -> Result<String, ClientError> {
        let id = self.backend.create_session().await?;
        self.store.lock().create(id.clone());
        tracing::info!(session_id = %id, "session opened");
        Ok(id)
    }

    pub fn select(&self, session_id: &str) -> Result<(), ClientError> {
        self.store.lock().select(session_id)?;
        Ok(())
    }

    /// Delete a session here and on the backend.
    ///
    /// A generation running in the session is cancelled. Backend failures
    /// are logged and otherwise ignored. When the last session goes, its
    /// replacement is opened first; if that fails nothing is deleted.
    pub async fn delete(&self, session_id: &str) -> Result<(), ClientError> {
        let _deleting = self.deleting.lock().await;

        let is_last = {
            let store = self.store.lock();
            if !store.contains(session_id) {
                return Err(ragchat_session::Error::NotFound(session_id.to_string()).into());
            }
            store.len() == 1
        };

        let replacement = if is_last {
            Some(self.backend.create_session().await?)
        } else {
            None
        };

        self.coordinator.cancel(session_id);
        if let Err(err) = self.backend.delete_session(session_id).await {
            tracing::warn!(session_id, %err, "backend session delete failed");
        }

        {
            let mut store = self.store.lock();
            store.delete(session_id)?;
            if let Some(id) = replacement {
                store.create(id);
            }
        }
        tracing::info!(session_id, "session deleted");
        Ok(())
    }

    /// Ask `question` in the active session.
    pub fn send(&self, question: &str) -> Result<TurnHandle, SendError> {
        let session_id = self.active_id().ok_or(SendError::NoActiveSession)?;
        self.coordinator.send(&session_id, question)
    }
}
