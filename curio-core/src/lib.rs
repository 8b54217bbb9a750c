//! curio-core library
//!
//! Personalization store and discovery mixing engine behind the shopping
//! assistant: chat history, saved products, the training corpus and its
//! outlier log, user settings, and the HTTP surface the UI talks to.

use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod db;
pub mod error;
pub mod mixing;
pub mod provider;
pub mod service;

pub use service::CurioService;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CurioService>,
}

impl AppState {
    pub fn new(service: Arc<CurioService>) -> Self {
        Self { service }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::search::routes())
        .merge(api::products::routes())
        .merge(api::sessions::routes())
        .merge(api::settings::routes())
        .merge(api::training::routes())
        .merge(api::storage::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // UI runs in a local webview on another origin
        .layer(CorsLayer::permissive())
}
