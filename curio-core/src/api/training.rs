//! Training corpus
//!
//! - GET /api/training/export (NDJSON, `?after=<id>` resumes)
//! - GET /api/training/stats
//! - GET /api/training/outliers
//! - POST /api/reset/training

use axum::{
    body::Body,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use curio_common::db::OutlierInteraction;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::db::corpus::CorpusStats;
use crate::error::ApiResult;
use crate::AppState;

/// Header carrying the export's snapshot boundary
pub const EXPORT_UPPER_BOUND_HEADER: &str = "x-curio-export-upper-bound";

#[derive(Debug, Default, Deserialize)]
pub struct ExportParams {
    /// Resume after this interaction id
    pub after: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ResetTrainingResponse {
    pub deleted: u64,
}

/// GET /api/training/export
///
/// One JSON object per line. A storage error mid-stream aborts the body.
pub async fn export_training(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
) -> ApiResult<Response> {
    let export = state.service.export_training_data(params.after).await?;

    let lines = export.rows.map(|row| {
        row.and_then(|interaction| {
            let mut line = serde_json::to_vec(&interaction)?;
            line.push(b'\n');
            Ok(line)
        })
    });

    Ok((
        [
            (header::CONTENT_TYPE, "application/x-ndjson".to_string()),
            (
                header::HeaderName::from_static(EXPORT_UPPER_BOUND_HEADER),
                export.upper_bound.to_string(),
            ),
        ],
        Body::from_stream(lines),
    )
        .into_response())
}

/// GET /api/training/stats
pub async fn corpus_stats(State(state): State<AppState>) -> ApiResult<Json<CorpusStats>> {
    Ok(Json(state.service.corpus_stats().await?))
}

/// GET /api/training/outliers
pub async fn list_outliers(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<OutlierInteraction>>> {
    Ok(Json(state.service.list_outliers().await?))
}

/// POST /api/reset/training
pub async fn reset_training(
    State(state): State<AppState>,
) -> ApiResult<Json<ResetTrainingResponse>> {
    let deleted = state.service.reset_training_data().await?;
    Ok(Json(ResetTrainingResponse { deleted }))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/training/export", get(export_training))
        .route("/api/training/stats", get(corpus_stats))
        .route("/api/training/outliers", get(list_outliers))
        .route("/api/reset/training", post(reset_training))
}
