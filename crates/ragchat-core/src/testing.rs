//! Scripted backend for exercising the coordinator without a network.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use ragchat_backend::{ChatBackend, Error, Result};
use ragchat_stream::ByteStream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

type Chunk = std::result::Result<Bytes, ragchat_stream::Error>;

/// What the next `query` call does.
pub(crate) enum Script {
    Body(mpsc::UnboundedReceiver<Chunk>),
    Fail(u16),
    /// Never responds.
    Hang,
}

impl Script {
    /// A body that delivers `chunks` and then closes.
    pub(crate) fn chunks(chunks: &[&str]) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        for chunk in chunks {
            let _ = tx.send(Ok(Bytes::copy_from_slice(chunk.as_bytes())));
        }
        Script::Body(rx)
    }

    /// A body fed by the test. It closes when the returned sender drops.
    pub(crate) fn live() -> (LiveBody, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (LiveBody { tx }, Script::Body(rx))
    }
}

pub(crate) struct LiveBody {
    tx: mpsc::UnboundedSender<Chunk>,
}

impl LiveBody {
    pub(crate) fn send_str(&self, chunk: &str) {
        let _ = self.tx.send(Ok(Bytes::copy_from_slice(chunk.as_bytes())));
    }

    pub(crate) fn fail(&self, message: &str) {
        let _ = self
            .tx
            .send(Err(ragchat_stream::Error::Transport(message.into())));
    }
}

#[derive(Default)]
pub(crate) struct ScriptedBackend {
    scripts: Mutex<VecDeque<Script>>,
    queries: Mutex<Vec<(String, String)>>,
    deleted: Mutex<Vec<String>>,
    created: AtomicUsize,
    fail_create: AtomicBool,
    fail_delete: AtomicBool,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn push(&self, script: Script) {
        self.scripts.lock().push_back(script);
    }

    pub(crate) fn queries(&self) -> Vec<(String, String)> {
        self.queries.lock().clone()
    }

    pub(crate) fn deleted(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }

    pub(crate) fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn create_session(&self) -> Result<String> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("session-{n}"))
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        // Let a concurrent caller run in between, as a network round trip would.
        tokio::task::yield_now().await;
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Error::Status {
                status: 500,
                body: String::new(),
            });
        }
        self.deleted.lock().push(session_id.to_string());
        Ok(())
    }

    async fn query(&self, question: &str, session_id: &str) -> Result<ByteStream> {
        self.queries
            .lock()
            .push((question.to_string(), session_id.to_string()));

        let script = self.scripts.lock().pop_front();
        match script {
            Some(Script::Body(rx)) => Ok(Box::pin(UnboundedReceiverStream::new(rx))),
            Some(Script::Fail(status)) => Err(Error::Status {
                status,
                body: String::new(),
            }),
            Some(Script::Hang) => std::future::pending().await,
            None => panic!("no scripted response for query '{question}'"),
        }
    }
}
