use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, post};
use axum::{Json, Router};
use ragchat_backend::{BackendConfig, ChatBackend, Error, HttpBackend, QueryRequest, TraceContext};

#[derive(Clone, Default)]
struct Recorded {
    deleted: Arc<Mutex<Vec<String>>>,
    queries: Arc<Mutex<Vec<QueryRequest>>>,
    traceparents: Arc<Mutex<Vec<String>>>,
}

async fn create_session(State(recorded): State<Recorded>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(value) = headers.get("traceparent") {
        recorded
            .traceparents
            .lock()
            .unwrap()
            .push(value.to_str().unwrap().to_string());
    }
    Json(serde_json::json!({ "session_id": "sess-1234" }))
}

async fn delete_session(
    State(recorded): State<Recorded>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    recorded.deleted.lock().unwrap().push(session_id);
    Json(serde_json::json!({ "success": true }))
}

async fn query(State(recorded): State<Recorded>, Json(request): Json<QueryRequest>) -> Response {
    let question = request.question.clone();
    recorded.queries.lock().unwrap().push(request);

    if question == "explode" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "retriever down").into_response();
    }

    let chunks: Vec<Result<&'static str, std::io::Error>> = vec![
        Ok("data: Kubernetes"),
        Ok(" is\n\ndata:  an orchestrator"),
        Ok(".\n\ndata: [DONE]\n\n"),
    ];
    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(futures::stream::iter(chunks)),
    )
        .into_response()
}

async fn serve() -> (HttpBackend, Recorded) {
    let recorded = Recorded::default();
    let app = Router::new()
        .route("/session/create", post(create_session))
        .route("/session/{id}", delete(delete_session))
        .route("/query", post(query))
        .with_state(recorded.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let backend = HttpBackend::new(BackendConfig {
        base_url: format!("http://{addr}"),
        ..Default::default()
    })
    .unwrap();
    (backend, recorded)
}

#[tokio::test]
async fn creates_and_deletes_sessions() {
    let (backend, recorded) = serve().await;

    let id = backend.create_session().await.unwrap();
    assert_eq!(id, "sess-1234");

    backend.delete_session(&id).await.unwrap();
    assert_eq!(*recorded.deleted.lock().unwrap(), vec!["sess-1234".to_string()]);
}

#[tokio::test]
async fn query_streams_event_body() {
    let (backend, recorded) = serve().await;

    let body = backend.query("What is Kubernetes?", "sess-1234").await.unwrap();
    let answer = ragchat_stream::Response::from_body(body)
        .into_result()
        .await
        .unwrap();
    assert_eq!(answer.text, "Kubernetes is an orchestrator.");
    assert!(answer.done);

    let queries = recorded.queries.lock().unwrap();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].question, "What is Kubernetes?");
    assert_eq!(queries[0].session_id, "sess-1234");
    assert!(queries[0].stream);
}

#[tokio::test]
async fn non_success_status_is_an_error() {
    let (backend, _) = serve().await;

    let err = backend.query("explode", "sess-1234").await.err().unwrap();
    match err {
        Error::Status { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "retriever down");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn forwards_trace_context() {
    let (backend, recorded) = serve().await;
    let traceparent = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    backend
        .traced(TraceContext {
            traceparent: Some(traceparent.to_string()),
            tracestate: None,
        })
        .create_session()
        .await
        .unwrap();
    backend.create_session().await.unwrap();

    assert_eq!(
        *recorded.traceparents.lock().unwrap(),
        vec![traceparent.to_string()]
    );
}

#[tokio::test]
async fn unreachable_backend_is_an_http_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let backend = HttpBackend::new(BackendConfig {
        base_url: format!("http://{addr}"),
        ..Default::default()
    })
    .unwrap();
    let err = backend.create_session().await.unwrap_err();
    assert!(matches!(err, Error::Http(_)));
}
