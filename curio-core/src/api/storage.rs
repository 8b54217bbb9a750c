//! Storage location and full reset
//!
//! - GET/PUT /api/storage/path
//! - POST /api/reset/database

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::db::ResetSummary;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct StoragePath {
    pub path: PathBuf,
}

/// GET /api/storage/path
pub async fn get_storage_path(State(state): State<AppState>) -> Json<StoragePath> {
    Json(StoragePath {
        path: state.service.get_storage_path().await,
    })
}

/// PUT /api/storage/path
///
/// `path` may name a folder (the database file goes inside) or a `.db` file.
pub async fn change_storage_path(
    State(state): State<AppState>,
    payload: Result<Json<StoragePath>, JsonRejection>,
) -> ApiResult<Json<StoragePath>> {
    let Json(req) = payload?;
    if !req.path.is_absolute() {
        return Err(ApiError::BadRequest(format!(
            "storage path must be absolute: {}",
            req.path.display()
        )));
    }

    let path = state.service.change_storage_path(&req.path).await?;
    Ok(Json(StoragePath { path }))
}

/// POST /api/reset/database
pub async fn reset_database(State(state): State<AppState>) -> ApiResult<Json<ResetSummary>> {
    Ok(Json(state.service.reset_database().await?))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/storage/path", get(get_storage_path).put(change_storage_path))
        .route("/api/reset/database", post(reset_database))
}
