//! Endpoint handlers.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use parley_rs::chat::{ChatOrchestrator, ChatRequest};
use parley_rs::config::{ConfigView, Settings};
use parley_rs::memory::SessionSnapshot;
use serde_json::json;

use crate::error::ApiError;

/// Shared application state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub chat: ChatOrchestrator,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(chat: ChatOrchestrator, settings: Settings) -> Self {
        Self {
            chat,
            settings: Arc::new(settings),
        }
    }
}

/// POST /chat: Stream a reply as plain text.
///
/// Fragments are written to the body as they arrive from upstream. An
/// upstream failure ends the body with an `[error] <detail>` line rather
/// than an error status, since the status line has already been sent.
pub async fn post_chat(
    State(app): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let fragments = app.chat.respond(request).await?;
    let body = Body::from_stream(fragments.map(Ok::<_, Infallible>));
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response())
}

/// GET /session/{session_id}: Memory snapshot for one session.
///
/// Returns 404 when memory is disabled for the whole relay.
pub async fn get_session(
    State(app): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    if !app.settings.memory.enabled {
        return Err(ApiError::MemoryDisabled);
    }
    let snapshot = app.chat.memory().snapshot(&session_id).await?;
    Ok(Json(snapshot))
}

/// GET /config: Effective configuration without the credential.
pub async fn get_config(State(app): State<AppState>) -> Json<ConfigView> {
    Json(app.settings.view())
}

/// GET /health: Liveness check.
pub async fn get_health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "time": chrono::Utc::now().timestamp() }))
}
