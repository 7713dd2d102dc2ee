mod error;
mod http;
mod types;

pub use error::{Error, Result};
pub use http::HttpBackend;
pub use types::{QueryRequest, SessionResponse};

use std::time::Duration;

use async_trait::async_trait;
use ragchat_stream::ByteStream;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

const DEFAULT_API_URL: &str = "http://localhost:8000";

/// The RAG backend as seen by the chat core.
///
/// Session ids come from the backend; the client never makes one up.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// `POST /session/create`.
    async fn create_session(&self) -> Result<String>;

    /// `DELETE /session/{id}`.
    async fn delete_session(&self, session_id: &str) -> Result<()>;

    /// `POST /query` with streaming enabled. Any non-2xx status is an error;
    /// on success the raw event-stream body is returned undecoded.
    async fn query(&self, question: &str, session_id: &str) -> Result<ByteStream>;
}

/// Configuration for [`HttpBackend`].
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    /// Bounds connection setup only. Answer streams may run long, so the
    /// body itself is not covered.
    pub connect_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.into(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl BackendConfig {
    /// Read `API_URL` from the environment.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into()),
            ..Default::default()
        }
    }
}

/// W3C trace context forwarded to the backend as `traceparent` /
/// `tracestate` headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceContext {
    pub traceparent: Option<String>,
    pub tracestate: Option<String>,
}

impl TraceContext {
    pub fn is_empty(&self) -> bool {
        self.traceparent.is_none() && self.tracestate.is_none()
    }
}
