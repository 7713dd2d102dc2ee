//! HTTP surface for browser frontends. Requests are forwarded to the backend;
//! answer streams pass through undecoded.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use ragchat_backend::{ChatBackend, HttpBackend, QueryRequest, SessionResponse, TraceContext};
use serde::Serialize;

#[derive(Serialize)]
struct DeleteResponse {
    success: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn router(backend: HttpBackend) -> Router {
    Router::new()
        .route("/api/chat/query", post(query))
        .route("/api/chat/session", post(create_session))
        .route("/api/chat/session/{id}", delete(delete_session))
        .route("/health", get(health))
        .with_state(backend)
}

pub async fn serve(backend: HttpBackend, listen: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        api_url = %backend.base_url(),
        "proxy listening"
    );

    axum::serve(listener, router(backend))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    tracing::info!("proxy stopped");
    Ok(())
}

/// The backend, carrying the caller's trace headers when it sent any.
fn traced(backend: HttpBackend, headers: &HeaderMap) -> HttpBackend {
    let trace = trace_context(headers);
    if trace.is_empty() {
        backend
    } else {
        backend.traced(trace)
    }
}

fn trace_context(headers: &HeaderMap) -> TraceContext {
    let value = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string)
    };
    TraceContext {
        traceparent: value("traceparent"),
        tracestate: value("tracestate"),
    }
}

fn backend_error(err: ragchat_backend::Error) -> Response {
    let status = match &err {
        ragchat_backend::Error::Status { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        _ => StatusCode::BAD_GATEWAY,
    };
    tracing::error!(%err, status = status.as_u16(), "backend request failed");
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

async fn query(
    State(backend): State<HttpBackend>,
    headers: HeaderMap,
    Json(request): Json<QueryRequest>,
) -> Response {
    tracing::info!(
        session_id = %request.session_id,
        question_length = request.question.len(),
        "query request received"
    );

    let backend = traced(backend, &headers);
    match backend.query(&request.question, &request.session_id).await {
        Ok(body) => (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            Body::from_stream(body),
        )
            .into_response(),
        Err(err) => backend_error(err),
    }
}

async fn create_session(State(backend): State<HttpBackend>, headers: HeaderMap) -> Response {
    let backend = traced(backend, &headers);
    match backend.create_session().await {
        Ok(session_id) => Json(SessionResponse { session_id }).into_response(),
        Err(err) => backend_error(err),
    }
}

/// Deletion is best effort: a backend failure is logged, not returned.
async fn delete_session(
    State(backend): State<HttpBackend>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Json<DeleteResponse> {
    let backend = traced(backend, &headers);
    if let Err(err) = backend.delete_session(&session_id).await {
        tracing::warn!(session_id, %err, "backend session delete failed");
    }
    Json(DeleteResponse { success: true })
}

async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use ragchat_backend::BackendConfig;

    use super::*;

    #[derive(Clone, Default)]
    struct Upstream {
        traceparents: Arc<Mutex<Vec<String>>>,
    }

    async fn upstream_create(State(upstream): State<Upstream>, headers: HeaderMap) -> Response {
        if let Some(value) = headers.get("traceparent") {
            upstream
                .traceparents
                .lock()
                .unwrap()
                .push(value.to_str().unwrap().to_string());
        }
        Json(serde_json::json!({ "session_id": "upstream-1" })).into_response()
    }

    async fn upstream_delete(Path(session_id): Path<String>) -> Response {
        if session_id == "gone" {
            return (StatusCode::NOT_FOUND, "no such session").into_response();
        }
        Json(serde_json::json!({ "success": true })).into_response()
    }

    async fn upstream_query(Json(request): Json<QueryRequest>) -> Response {
        if request.question == "explode" {
            return (StatusCode::SERVICE_UNAVAILABLE, "retriever down").into_response();
        }
        let chunks: Vec<Result<&'static str, std::io::Error>> =
            vec![Ok("data: Hel"), Ok("lo\n\ndata: [DONE]\n\n")];
        (
            [(header::CONTENT_TYPE, "text/event-stream")],
            Body::from_stream(futures::stream::iter(chunks)),
        )
            .into_response()
    }

    async fn spawn(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn start() -> (String, Upstream) {
        let upstream = Upstream::default();
        let upstream_addr = spawn(
            Router::new()
                .route("/session/create", post(upstream_create))
                .route("/session/{id}", delete(upstream_delete))
                .route("/query", post(upstream_query))
                .with_state(upstream.clone()),
        )
        .await;

        let backend = HttpBackend::new(BackendConfig {
            base_url: format!("http://{upstream_addr}"),
            ..Default::default()
        })
        .unwrap();
        let proxy_addr = spawn(router(backend)).await;
        (format!("http://{proxy_addr}"), upstream)
    }

    #[tokio::test]
    async fn streams_query_body_through() {
        let (base, _) = start().await;

        let resp = reqwest::Client::new()
            .post(format!("{base}/api/chat/query"))
            .json(&serde_json::json!({ "question": "hi", "session_id": "upstream-1" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE.as_str()],
            "text/event-stream"
        );
        assert_eq!(
            resp.text().await.unwrap(),
            "data: Hello\n\ndata: [DONE]\n\n"
        );
    }

    #[tokio::test]
    async fn upstream_status_is_passed_on() {
        let (base, _) = start().await;

        let resp = reqwest::Client::new()
            .post(format!("{base}/api/chat/query"))
            .json(&serde_json::json!({ "question": "explode", "session_id": "upstream-1" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("retriever down"));
    }

    #[tokio::test]
    async fn creates_sessions_with_trace_context() {
        let (base, upstream) = start().await;
        let traceparent = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

        let resp = reqwest::Client::new()
            .post(format!("{base}/api/chat/session"))
            .header("traceparent", traceparent)
            .send()
            .await
            .unwrap();
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["session_id"], "upstream-1");
        assert_eq!(
            *upstream.traceparents.lock().unwrap(),
            vec![traceparent.to_string()]
        );
    }

    #[tokio::test]
    async fn delete_succeeds_even_when_upstream_fails() {
        let (base, _) = start().await;
        let client = reqwest::Client::new();

        for id in ["upstream-1", "gone"] {
            let resp = client
                .delete(format!("{base}/api/chat/session/{id}"))
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            let body: serde_json::Value = resp.json().await.unwrap();
            assert_eq!(body["success"], true);
        }
    }

    #[test]
    fn reads_trace_headers() {
        assert!(trace_context(&HeaderMap::new()).is_empty());

        let mut headers = HeaderMap::new();
        headers.insert("tracestate", "vendor=1".parse().unwrap());
        let trace = trace_context(&headers);
        assert!(!trace.is_empty());
        assert_eq!(trace.traceparent, None);
        assert_eq!(trace.tracestate.as_deref(), Some("vendor=1"));
    }

    #[tokio::test]
    async fn health_check() {
        let (base, _) = start().await;
        let resp = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(resp.text().await.unwrap(), "ok");
    }
}
