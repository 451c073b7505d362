//! HTTP gateway: the `/v1/chat` SSE endpoint plus health and reserved
//! session routes. Channel webhook routers merge onto the same mux.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, info};

use crate::agent::{Emit, Event, RunContext, Runner};

const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<Runner>,
}

pub fn router(state: AppState, channel_routers: Vec<Router>) -> Router {
    let mut app = Router::new()
        .route("/v1/chat", post(handle_chat))
        .route("/v1/sessions", get(handle_list_sessions))
        .route("/v1/sessions/{id}", get(handle_get_session))
        .route("/v1/sessions/{id}/run", delete(handle_cancel_run))
        .route("/healthz", get(handle_healthz))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state);

    for routes in channel_routers {
        app = app.merge(routes);
    }
    app
}

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    message: String,
}

fn bad_request(msg: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
}

/// One user message in, a stream of SSE frames out. The run is spawned so
/// events flush as they happen; dropping the response stream cancels the
/// run at its next iteration boundary.
async fn handle_chat(State(state): State<AppState>, body: Bytes) -> Response {
    let req: ChatRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(_) => return bad_request("invalid JSON body"),
    };
    if req.session_id.is_empty() || req.message.is_empty() {
        return bad_request("session_id and message are required");
    }

    info!(session_id = %req.session_id, "chat request");

    let (tx, rx) = mpsc::unbounded_channel::<Event>();
    let emit: Emit = Arc::new(move |event| {
        // A dropped receiver means the client went away; nothing to do.
        let _ = tx.send(event);
    });

    let cancel = CancellationToken::new();
    let ctx = RunContext::new(req.session_id.clone(), emit, cancel.clone());
    let runner = state.runner.clone();
    tokio::spawn(async move {
        // The runner emits an error event on every failure path itself.
        if let Err(e) = runner.run(ctx, &req.message).await {
            debug!(session_id = %req.session_id, error = %e, "run ended with error");
        }
    });

    // The drop guard travels with the stream: client disconnect => cancel.
    let guard = cancel.drop_guard();
    let stream = futures::stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let event = rx.recv().await?;
        let frame = SseEvent::default()
            .event(event.kind())
            .data(event.data().to_string());
        Some((Ok::<_, Infallible>(frame), (rx, guard)))
    });

    (
        [
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (header::CONNECTION, HeaderValue::from_static("keep-alive")),
        ],
        Sse::new(stream),
    )
        .into_response()
}

// Reserved paths: present on the mux, not core functionality.
async fn handle_list_sessions() {}

async fn handle_get_session() {}

async fn handle_cancel_run() {}

async fn handle_healthz() -> StatusCode {
    StatusCode::OK
}
