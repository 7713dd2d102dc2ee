//! reqwest implementation of [`ChatBackend`].

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use ragchat_stream::ByteStream;
use reqwest::{Method, RequestBuilder};
use url::Url;

use crate::error::{Error, Result};
use crate::types::{QueryRequest, SessionResponse};
use crate::{BackendConfig, ChatBackend, TraceContext};

/// Talks to the backend over HTTP. Cheap to clone.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Arc<Url>,
    trace: TraceContext,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(Error::UrlBase(config.base_url));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: Arc::new(base_url),
            trace: TraceContext::default(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// A handle that sends `trace` with every request.
    pub fn traced(&self, trace: TraceContext) -> Self {
        Self {
            trace,
            ..self.clone()
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = Url::clone(&self.base_url);
        // Bases that cannot carry a path are rejected in `new`.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mut req = self.client.request(method, url);
        if let Some(traceparent) = &self.trace.traceparent {
            req = req.header("traceparent", traceparent);
        }
        if let Some(tracestate) = &self.trace.tracestate {
            req = req.header("tracestate", tracestate);
        }
        req
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn create_session(&self) -> Result<String> {
        let resp = self
            .request(Method::POST, self.endpoint(&["session", "create"]))
            .send()
            .await?;
        let resp = ensure_success(resp).await?;

        let body = resp.bytes().await?;
        let parsed: SessionResponse = serde_json::from_slice(&body)?;
        tracing::debug!(session_id = %parsed.session_id, "backend session created");
        Ok(parsed.session_id)
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let resp = self
            .request(Method::DELETE, self.endpoint(&["session", session_id]))
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }

    async fn query(&self, question: &str, session_id: &str) -> Result<ByteStream> {
        let body = QueryRequest::new(question, session_id);
        let resp = self
            .request(Method::POST, self.endpoint(&["query"]))
            .json(&body)
            .send()
            .await?;

        tracing::info!(
            session_id,
            status = resp.status().as_u16(),
            "query response received"
        );
        let resp = ensure_success(resp).await?;

        let chunks = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ragchat_stream::Error::Transport(Box::new(e))));
        Ok(Box::pin(chunks))
    }
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    Err(Error::Status {
        status: status.as_u16(),
        body,
    })
}
