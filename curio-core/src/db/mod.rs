//! Stores built on the shared storage layer
//!
//! Free functions over a [`Database`] handle, one module per table group.

pub mod corpus;
pub mod products;
pub mod sessions;
pub mod settings;

use curio_common::{Database, Result};
use serde::Serialize;
use tracing::info;

/// Rows removed by [`reset_all`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResetSummary {
    pub sessions: u64,
    pub messages: u64,
    pub products: u64,
    pub training_interactions: u64,
    pub outlier_interactions: u64,
}

/// Clear every user-data table in one transaction
///
/// Settings are left alone.
pub async fn reset_all(db: &Database) -> Result<ResetSummary> {
    let summary = db
        .transaction(|conn| {
            Box::pin(async move {
                // Messages first so the count is not hidden by the cascade
                let messages = sqlx::query("DELETE FROM chat_messages")
                    .execute(&mut *conn)
                    .await?
                    .rows_affected();
                let sessions = sqlx::query("DELETE FROM chat_sessions")
                    .execute(&mut *conn)
                    .await?
                    .rows_affected();
                let products = sqlx::query("DELETE FROM saved_products")
                    .execute(&mut *conn)
                    .await?
                    .rows_affected();
                let training_interactions = sqlx::query("DELETE FROM training_interactions")
                    .execute(&mut *conn)
                    .await?
                    .rows_affected();
                let outlier_interactions = sqlx::query("DELETE FROM outlier_interactions")
                    .execute(&mut *conn)
                    .await?
                    .rows_affected();

                Ok(ResetSummary {
                    sessions,
                    messages,
                    products,
                    training_interactions,
                    outlier_interactions,
                })
            })
        })
        .await?;

    info!(
        sessions = summary.sessions,
        messages = summary.messages,
        products = summary.products,
        training = summary.training_interactions,
        outliers = summary.outlier_interactions,
        "Database reset"
    );
    Ok(summary)
}
