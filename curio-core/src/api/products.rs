//! Saved products
//!
//! - GET/POST /api/products
//! - GET/PATCH/DELETE /api/products/:id

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use curio_common::db::SavedProduct;
use serde::Serialize;

use crate::db::products::{NewProduct, ProductPatch};
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SaveProductResponse {
    pub id: String,
}

/// GET /api/products
pub async fn list_products(State(state): State<AppState>) -> ApiResult<Json<Vec<SavedProduct>>> {
    Ok(Json(state.service.list_products().await?))
}

/// POST /api/products
pub async fn save_product(
    State(state): State<AppState>,
    payload: Result<Json<NewProduct>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SaveProductResponse>)> {
    let Json(product) = payload?;
    let id = state.service.save_product(&product).await?;
    Ok((StatusCode::CREATED, Json(SaveProductResponse { id })))
}

/// GET /api/products/:id
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SavedProduct>> {
    Ok(Json(state.service.get_product(&id).await?))
}

/// PATCH /api/products/:id
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ProductPatch>, JsonRejection>,
) -> ApiResult<Json<SavedProduct>> {
    let Json(patch) = payload?;
    Ok(Json(state.service.update_product(&id, &patch).await?))
}

/// DELETE /api/products/:id
pub async fn remove_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.service.remove_product(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/products", get(list_products).post(save_product))
        .route(
            "/api/products/:id",
            get(get_product).patch(update_product).delete(remove_product),
        )
}
