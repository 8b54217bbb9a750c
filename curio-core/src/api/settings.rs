//! Settings
//!
//! - GET /api/settings
//! - GET/PUT /api/settings/discovery
//! - GET/PUT /api/settings/:key

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::settings::UserSettings;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct DiscoverySetting {
    /// 0, 5 or 10
    pub percentage: u8,
}

/// Body of PUT /api/settings/discovery
///
/// Kept loose so out-of-range numbers reach setting validation.
#[derive(Debug, Deserialize)]
pub struct SetDiscoveryRequest {
    pub percentage: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SettingValue {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct SetSettingRequest {
    pub value: serde_json::Value,
}

/// GET /api/settings
pub async fn get_settings(State(state): State<AppState>) -> ApiResult<Json<UserSettings>> {
    Ok(Json(state.service.get_settings().await?))
}

/// GET /api/settings/discovery
pub async fn get_discovery(State(state): State<AppState>) -> ApiResult<Json<DiscoverySetting>> {
    let pct = state.service.get_discovery_setting().await?;
    Ok(Json(DiscoverySetting {
        percentage: pct.as_percent(),
    }))
}

/// PUT /api/settings/discovery
pub async fn set_discovery(
    State(state): State<AppState>,
    payload: Result<Json<SetDiscoveryRequest>, JsonRejection>,
) -> ApiResult<Json<DiscoverySetting>> {
    let Json(req) = payload?;
    let percent = req
        .percentage
        .as_u64()
        .and_then(|n| u8::try_from(n).ok())
        .ok_or_else(|| {
            curio_common::Error::InvalidSetting(format!(
                "discovery percentage must be 0, 5 or 10 (got {})",
                req.percentage
            ))
        })?;
    let pct = state.service.set_discovery_setting(percent).await?;
    Ok(Json(DiscoverySetting {
        percentage: pct.as_percent(),
    }))
}

/// GET /api/settings/:key
pub async fn get_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Json<SettingValue>> {
    let value = state
        .service
        .get_setting(&key)
        .await?
        .ok_or_else(|| curio_common::Error::NotFound(format!("Setting {}", key)))?;
    Ok(Json(SettingValue { key, value }))
}

/// PUT /api/settings/:key
///
/// Accepts strings, numbers and booleans; stored in their text form.
pub async fn set_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
    payload: Result<Json<SetSettingRequest>, JsonRejection>,
) -> ApiResult<Json<SettingValue>> {
    let Json(req) = payload?;
    let value = match req.value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        other => {
            return Err(ApiError::BadRequest(format!(
                "setting value must be a string, number or boolean (got {})",
                other
            )))
        }
    };

    state.service.set_setting(&key, &value).await?;
    Ok(Json(SettingValue {
        key,
        value: value.trim().to_string(),
    }))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/settings", get(get_settings))
        .route("/api/settings/discovery", get(get_discovery).put(set_discovery))
        .route("/api/settings/:key", get(get_setting).put(set_setting))
}
