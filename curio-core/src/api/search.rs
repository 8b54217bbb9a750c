//! Search and interaction reporting
//!
//! - POST /api/search
//! - POST /api/interactions

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::corpus::RecordedInteraction;
use crate::error::ApiResult;
use crate::mixing::Label;
use crate::service::SearchResults;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub image_features: Option<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
pub struct InteractionRequest {
    pub candidate_id: Uuid,
    pub label: Label,
}

/// POST /api/search
pub async fn search_products(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> ApiResult<Json<SearchResults>> {
    let Json(req) = payload?;
    let results = state
        .service
        .search_products(&req.query, req.image_features.as_deref())
        .await?;
    Ok(Json(results))
}

/// POST /api/interactions
pub async fn record_interaction(
    State(state): State<AppState>,
    payload: Result<Json<InteractionRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<RecordedInteraction>)> {
    let Json(req) = payload?;
    let recorded = state
        .service
        .record_interaction(&req.candidate_id, req.label)
        .await?;
    Ok((StatusCode::CREATED, Json(recorded)))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/search", post(search_products))
        .route("/api/interactions", post(record_interaction))
}
