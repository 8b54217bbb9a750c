//! Schema & storage layer
//!
//! Owns the SQLite file and every table in it. Other components read and
//! write exclusively through a [`Database`] handle.

pub mod init;
pub mod migrations;
pub mod models;

pub use init::*;
pub use migrations::*;
pub use models::*;

use crate::{Error, Result};
use futures::future::BoxFuture;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::Sqlite;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info};

/// Busy timeout applied to every pooled connection
const BUSY_TIMEOUT_MS: u64 = 5000;

/// Upper bound on pooled connections
const MAX_CONNECTIONS: u32 = 8;

/// Shared handle to the embedded database
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    path: PathBuf,
}

impl Database {
    /// Open (creating if missing) the database file at `path`
    ///
    /// Creates the parent directory when needed. Does not create tables; call
    /// [`Database::migrate`] afterwards or use [`init_database`].
    pub async fn open(path: &Path) -> Result<Self> {
        let newly_created = !path.exists();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::StorageUnavailable(format!(
                        "Cannot create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        // Per-connection pragmas: applying them through a single query would
        // only configure whichever pooled connection ran it.
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))
            .connect_with(options)
            .await
            .map_err(|e| {
                Error::StorageUnavailable(format!("Cannot open {}: {}", path.display(), e))
            })?;

        // Fail now on a file that is not a database rather than on first use
        sqlx::query("SELECT count(*) FROM sqlite_master")
            .execute(&pool)
            .await
            .map_err(|e| {
                Error::StorageUnavailable(format!("Cannot read {}: {}", path.display(), e))
            })?;

        if newly_created {
            info!("Initialized new database: {}", path.display());
        } else {
            info!("Opened existing database: {}", path.display());
        }

        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    /// Create missing tables and indexes, apply pending migrations, seed settings
    ///
    /// Idempotent and never drops data.
    pub async fn migrate(&self) -> Result<()> {
        create_schema_version_table(&self.pool).await?;
        create_settings_table(&self.pool).await?;
        create_chat_sessions_table(&self.pool).await?;
        create_chat_messages_table(&self.pool).await?;
        create_saved_products_table(&self.pool).await?;
        create_training_interactions_table(&self.pool).await?;
        create_outlier_interactions_table(&self.pool).await?;

        run_migrations(&self.pool).await?;

        init_default_settings(&self.pool).await?;

        Ok(())
    }

    /// Run `f` inside one transaction
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err`, so a
    /// failure part-way through leaves prior state untouched.
    ///
    /// ```rust,ignore
    /// let id = db.transaction(|conn| Box::pin(async move {
    ///     sqlx::query("INSERT INTO ...").execute(&mut *conn).await?;
    ///     sqlx::query("INSERT INTO ...").execute(&mut *conn).await?;
    ///     Ok(42)
    /// })).await?;
    /// ```
    pub async fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>> + Send,
    {
        let mut tx = self.pool.begin().await?;

        match f(&mut *tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                debug!("Rolling back transaction: {}", e);
                if let Err(rollback_err) = tx.rollback().await {
                    error!("Rollback failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    /// Begin a transaction for callers that manage commit themselves
    ///
    /// Dropping the returned transaction without committing rolls it back.
    pub async fn begin(&self) -> Result<sqlx::Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Current tracked schema version
    pub async fn schema_version(&self) -> Result<i32> {
        get_schema_version(&self.pool).await
    }

    /// Write a consistent copy of the database to `target`
    ///
    /// Fails if `target` already exists.
    pub async fn snapshot_to(&self, target: &Path) -> Result<()> {
        if target.exists() {
            return Err(Error::InvalidInput(format!(
                "Target already exists: {}",
                target.display()
            )));
        }
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let target_str = target.to_str().ok_or_else(|| {
            Error::InvalidInput(format!("Non UTF-8 path: {}", target.display()))
        })?;

        sqlx::query("VACUUM INTO ?")
            .bind(target_str)
            .execute(&self.pool)
            .await?;

        info!("Database snapshot written: {}", target.display());
        Ok(())
    }

    /// Connection pool for query execution
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Location of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Open the database at `db_path` and bring its schema up to date
pub async fn init_database(db_path: &Path) -> Result<Database> {
    let db = Database::open(db_path).await?;
    db.migrate().await?;
    Ok(db)
}

/// Delete a database file along with its `-wal`/`-shm` siblings
///
/// Files that are already gone are skipped. Close any pool on `db_path` first.
pub fn remove_database_files(db_path: &Path) -> Result<()> {
    let mut paths = vec![db_path.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut sibling = db_path.as_os_str().to_owned();
        sibling.push(suffix);
        paths.push(PathBuf::from(sibling));
    }

    for path in paths {
        match std::fs::remove_file(&path) {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
