//! Saved products
//!
//! Keyed by the provider's `object_id`: saving the same item again updates
//! the existing row and keeps its id.

use curio_common::db::SavedProduct;
use curio_common::{time, Database, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

const PRODUCT_COLUMNS: &str = "id, object_id, custom_name, tags, payload, saved_at";

/// Product to save
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub object_id: String,
    #[serde(default)]
    pub custom_name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Raw provider hit
    #[serde(default)]
    pub payload: Value,
}

impl NewProduct {
    pub fn new(object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            custom_name: None,
            tags: Vec::new(),
            payload: Value::Null,
        }
    }
}

/// Partial update; `None` leaves a field unchanged
///
/// A blank `custom_name` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductPatch {
    #[serde(default)]
    pub custom_name: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

fn normalize_name(name: Option<&str>) -> Option<String> {
    name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string)
}

/// Trim, drop blanks and duplicates, keep first-seen order
fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        if !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// Save or re-save a product, returning its stable id
pub async fn save(db: &Database, product: &NewProduct) -> Result<String> {
    let object_id = product.object_id.trim();
    if object_id.is_empty() {
        return Err(Error::InvalidInput("object_id cannot be empty".to_string()));
    }

    let tags = serde_json::to_string(&normalize_tags(&product.tags))?;
    let payload = if product.payload.is_null() {
        "{}".to_string()
    } else {
        serde_json::to_string(&product.payload)?
    };

    let id: String = sqlx::query_scalar(
        r#"
        INSERT INTO saved_products (id, object_id, custom_name, tags, payload, saved_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(object_id) DO UPDATE SET
            custom_name = excluded.custom_name,
            tags = excluded.tags,
            payload = excluded.payload,
            saved_at = excluded.saved_at
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(object_id)
    .bind(normalize_name(product.custom_name.as_deref()))
    .bind(tags)
    .bind(payload)
    .bind(time::now_millis())
    .fetch_one(db.pool())
    .await?;

    info!(id = %id, object_id, "Saved product");
    Ok(id)
}

/// All saved products, most recently saved first
pub async fn list(db: &Database) -> Result<Vec<SavedProduct>> {
    let products = sqlx::query_as::<_, SavedProduct>(&format!(
        "SELECT {} FROM saved_products ORDER BY saved_at DESC, rowid DESC",
        PRODUCT_COLUMNS
    ))
    .fetch_all(db.pool())
    .await?;

    Ok(products)
}

pub async fn get(db: &Database, id: &str) -> Result<SavedProduct> {
    sqlx::query_as::<_, SavedProduct>(&format!(
        "SELECT {} FROM saved_products WHERE id = ?",
        PRODUCT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(db.pool())
    .await?
    .ok_or_else(|| Error::NotFound(format!("Saved product {}", id)))
}

pub async fn remove(db: &Database, id: &str) -> Result<()> {
    let deleted = sqlx::query("DELETE FROM saved_products WHERE id = ?")
        .bind(id)
        .execute(db.pool())
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(Error::NotFound(format!("Saved product {}", id)));
    }

    info!(id, "Removed saved product");
    Ok(())
}

/// Apply `patch` to one product and return the updated row
pub async fn update(db: &Database, id: &str, patch: &ProductPatch) -> Result<SavedProduct> {
    let tags = patch
        .tags
        .as_deref()
        .map(|t| serde_json::to_string(&normalize_tags(t)))
        .transpose()?;

    let updated = sqlx::query_as::<_, SavedProduct>(&format!(
        r#"
        UPDATE saved_products
        SET custom_name = CASE WHEN ? THEN ? ELSE custom_name END,
            tags = COALESCE(?, tags)
        WHERE id = ?
        RETURNING {}
        "#,
        PRODUCT_COLUMNS
    ))
    .bind(patch.custom_name.is_some())
    .bind(normalize_name(patch.custom_name.as_deref()))
    .bind(tags)
    .bind(id)
    .fetch_optional(db.pool())
    .await?
    .ok_or_else(|| Error::NotFound(format!("Saved product {}", id)))?;

    debug!(id, "Updated saved product");
    Ok(updated)
}
