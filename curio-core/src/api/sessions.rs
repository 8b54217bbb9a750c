//! Chat sessions
//!
//! - GET /api/sessions
//! - POST /api/sessions/messages
//! - GET /api/sessions/:id/messages
//! - GET/PATCH/DELETE /api/sessions/:id

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use curio_common::db::{ChatMessage, ChatSession};
use serde::Deserialize;

use crate::db::sessions::{AppendOutcome, NewMessage};
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AppendMessageRequest {
    /// Omit to start a new session
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: NewMessage,
}

#[derive(Debug, Default, Deserialize)]
pub struct RenameSessionRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// GET /api/sessions
pub async fn list_sessions(State(state): State<AppState>) -> ApiResult<Json<Vec<ChatSession>>> {
    Ok(Json(state.service.list_chat_sessions().await?))
}

/// POST /api/sessions/messages
pub async fn append_message(
    State(state): State<AppState>,
    payload: Result<Json<AppendMessageRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<AppendOutcome>)> {
    let Json(req) = payload?;
    let outcome = state
        .service
        .append_message(req.session_id.as_deref(), &req.message)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /api/sessions/:id/messages
pub async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    Ok(Json(state.service.list_messages(&id).await?))
}

/// GET /api/sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ChatSession>> {
    Ok(Json(state.service.get_session(&id).await?))
}

/// PATCH /api/sessions/:id
pub async fn rename_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<RenameSessionRequest>, JsonRejection>,
) -> ApiResult<Json<ChatSession>> {
    let Json(req) = payload?;
    let session = state
        .service
        .rename_session(&id, req.name.as_deref(), req.category.as_deref())
        .await?;
    Ok(Json(session))
}

/// DELETE /api/sessions/:id
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.service.delete_session(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/messages", post(append_message))
        .route("/api/sessions/:id/messages", get(list_messages))
        .route(
            "/api/sessions/:id",
            get(get_session).patch(rename_session).delete(delete_session),
        )
}
