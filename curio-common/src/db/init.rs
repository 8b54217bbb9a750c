//! Table creation and default settings
//!
//! Every statement here is `IF NOT EXISTS` / `INSERT OR IGNORE`, so running it
//! against an existing database is a no-op apart from filling gaps.

use crate::db::models::DEFAULT_SETTINGS;
use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

pub async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the settings table
///
/// Key/value store holding the singleton user settings record.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER) * 1000)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the chat_sessions table
pub async fn create_chat_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chat_sessions (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT 'general',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            CHECK (updated_at >= created_at)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chat_sessions_updated ON chat_sessions(updated_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the chat_messages table
///
/// Display order is `(session_id, created_at, id)`. Messages go with their
/// session on delete.
pub async fn create_chat_messages_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chat_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL REFERENCES chat_sessions(id) ON DELETE CASCADE,
            role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
            content TEXT NOT NULL,
            image_ref TEXT,
            created_at INTEGER NOT NULL,
            CHECK (length(content) > 0 OR image_ref IS NOT NULL)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chat_messages_order ON chat_messages(session_id, created_at, id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the saved_products table
///
/// `object_id` comes from the search provider and is unique: re-saving the
/// same item updates the existing row.
pub async fn create_saved_products_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS saved_products (
            id TEXT PRIMARY KEY,
            object_id TEXT NOT NULL UNIQUE,
            custom_name TEXT,
            tags TEXT NOT NULL DEFAULT '[]',
            payload TEXT NOT NULL DEFAULT '{}',
            saved_at INTEGER NOT NULL,
            CHECK (length(object_id) > 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_saved_products_saved_at ON saved_products(saved_at DESC)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the training_interactions table
///
/// Append-only ML corpus. Only interactions labeled personalized at serve
/// time land here.
pub async fn create_training_interactions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS training_interactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            query TEXT NOT NULL,
            chosen_object_id TEXT NOT NULL,
            features TEXT NOT NULL DEFAULT '{}',
            timestamp INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the outlier_interactions table
///
/// Interactions with discovery items. Kept apart from the training corpus.
pub async fn create_outlier_interactions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS outlier_interactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            query TEXT NOT NULL,
            shown_object_id TEXT NOT NULL,
            timestamp INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or repair default settings
///
/// Missing keys are created with their default; NULL values are reset to it.
/// Existing values are never overwritten.
pub async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    for (key, default_value) in DEFAULT_SETTINGS {
        ensure_setting(pool, key, default_value).await?;
    }

    Ok(())
}

/// Ensure a setting exists with the specified default value
async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let inserted = sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(default_value)
        .execute(pool)
        .await?
        .rows_affected();

    if inserted > 0 {
        info!("Initialized setting '{}' with default value: {}", key, default_value);
        return Ok(());
    }

    let repaired = sqlx::query("UPDATE settings SET value = ? WHERE key = ? AND value IS NULL")
        .bind(default_value)
        .bind(key)
        .execute(pool)
        .await?
        .rows_affected();

    if repaired > 0 {
        warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}
