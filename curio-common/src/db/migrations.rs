//! Database schema migrations
//!
//! Versioned, incremental schema changes tracked in `schema_version`, so a
//! database written by an older build is upgraded in place without data loss.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - users upgrading from older builds depend on them
//! 2. **Always add new migrations** - one function per schema change
//! 3. **Stay idempotent** - check before altering; a migration may meet a table
//!    that `CREATE TABLE IF NOT EXISTS` already built in its final shape
//! 4. **Use ALTER TABLE** - never DROP/CREATE a table holding user data

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
pub const CURRENT_SCHEMA_VERSION: i32 = 3;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    if !table_exists(pool, "schema_version").await? {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        warn!("This may indicate a downgrade. Proceeding with caution.");
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        set_schema_version(pool, 1).await?;
        info!("Migration v1 completed (baseline)");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("Migration v2 completed");
    }

    if current_version < 3 {
        migrate_v3(pool).await?;
        set_schema_version(pool, 3).await?;
        info!("Migration v3 completed");
    }

    info!("All migrations completed successfully");
    Ok(())
}

/// Migration v2: Add image_ref column to chat_messages
///
/// Early builds stored text-only messages.
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    if column_exists(pool, "chat_messages", "image_ref").await? {
        info!("  image_ref column already exists - skipping");
        return Ok(());
    }

    sqlx::query("ALTER TABLE chat_messages ADD COLUMN image_ref TEXT")
        .execute(pool)
        .await?;

    info!("  Added image_ref column to chat_messages table");
    Ok(())
}

/// Migration v3: Add category column to chat_sessions
async fn migrate_v3(pool: &SqlitePool) -> Result<()> {
    if column_exists(pool, "chat_sessions", "category").await? {
        info!("  category column already exists - skipping");
        return Ok(());
    }

    sqlx::query("ALTER TABLE chat_sessions ADD COLUMN category TEXT NOT NULL DEFAULT 'general'")
        .execute(pool)
        .await?;

    info!("  Added category column to chat_sessions table");
    Ok(())
}

/// Check if table exists
pub async fn table_exists(pool: &SqlitePool, table_name: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name = ?
        )
        "#,
    )
    .bind(table_name)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

/// Check if a column exists on a table
pub async fn column_exists(pool: &SqlitePool, table_name: &str, column_name: &str) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
            .bind(table_name)
            .bind(column_name)
            .fetch_one(pool)
            .await?;

    Ok(count > 0)
}
