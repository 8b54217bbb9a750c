//! Common error types for Curio
//!
//! Every storage failure is returned to its immediate caller as one of these
//! variants. SQLite failures are classified on conversion so callers can tell
//! an unavailable database apart from a rejected write.

use thiserror::Error;

/// Common result type for Curio operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across Curio crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database file locked, missing, unreadable or corrupt
    ///
    /// Fatal to the request, never to the process. The UI collaborator shows a
    /// "database unavailable" state.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration value outside its allowed range, rejected before persistence
    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    /// Write rejected by a table constraint (unique key, check, foreign key)
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Search provider failed or returned an unusable response
    #[error("Search provider error: {0}")]
    Provider(String),

    /// Database operation error not covered by a more specific variant
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding error for stored payloads
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

const SQLITE_CONSTRAINT: i64 = 19;

// SQLite primary result codes that mean the database itself cannot serve the request.
const SQLITE_BUSY: i64 = 5;
const SQLITE_LOCKED: i64 = 6;
const SQLITE_READONLY: i64 = 8;
const SQLITE_IOERR: i64 = 10;
const SQLITE_CORRUPT: i64 = 11;
const SQLITE_FULL: i64 = 13;
const SQLITE_CANTOPEN: i64 = 14;
const SQLITE_NOTADB: i64 = 26;

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                if matches!(
                    db_err.kind(),
                    sqlx::error::ErrorKind::UniqueViolation
                        | sqlx::error::ErrorKind::ForeignKeyViolation
                        | sqlx::error::ErrorKind::NotNullViolation
                        | sqlx::error::ErrorKind::CheckViolation
                ) {
                    return Error::ConstraintViolation(db_err.message().to_string());
                }

                let primary_code = db_err
                    .code()
                    .and_then(|code| code.parse::<i64>().ok())
                    .map(|code| code & 0xff);

                match primary_code {
                    Some(SQLITE_CONSTRAINT) => {
                        Error::ConstraintViolation(db_err.message().to_string())
                    }
                    Some(
                        SQLITE_BUSY | SQLITE_LOCKED | SQLITE_READONLY | SQLITE_IOERR
                        | SQLITE_CORRUPT | SQLITE_FULL | SQLITE_CANTOPEN | SQLITE_NOTADB,
                    ) => Error::StorageUnavailable(db_err.message().to_string()),
                    _ => Error::Database(err),
                }
            }
            sqlx::Error::Io(io_err) => Error::StorageUnavailable(io_err.to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Error::StorageUnavailable(err.to_string())
            }
            sqlx::Error::RowNotFound => Error::NotFound("row not found".to_string()),
            _ => Error::Database(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> sqlx::SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_unique_violation_is_constraint_violation() {
        let pool = memory_pool().await;
        sqlx::query("CREATE TABLE t (k TEXT PRIMARY KEY)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO t (k) VALUES ('a')")
            .execute(&pool)
            .await
            .unwrap();

        let err: Error = sqlx::query("INSERT INTO t (k) VALUES ('a')")
            .execute(&pool)
            .await
            .unwrap_err()
            .into();

        assert!(matches!(err, Error::ConstraintViolation(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_check_violation_is_constraint_violation() {
        let pool = memory_pool().await;
        sqlx::query("CREATE TABLE t (n INTEGER CHECK (n > 0))")
            .execute(&pool)
            .await
            .unwrap();

        let err: Error = sqlx::query("INSERT INTO t (n) VALUES (0)")
            .execute(&pool)
            .await
            .unwrap_err()
            .into();

        assert!(matches!(err, Error::ConstraintViolation(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_syntax_error_stays_database_error() {
        let pool = memory_pool().await;

        let err: Error = sqlx::query("SELEC 1")
            .execute(&pool)
            .await
            .unwrap_err()
            .into();

        assert!(matches!(err, Error::Database(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_closed_pool_is_storage_unavailable() {
        let pool = memory_pool().await;
        pool.close().await;

        let err: Error = sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .unwrap_err()
            .into();

        assert!(matches!(err, Error::StorageUnavailable(_)), "got {:?}", err);
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
