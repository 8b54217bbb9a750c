//! Chat sessions and their messages

use curio_common::db::{ChatMessage, ChatSession, Role};
use curio_common::{time, Database, Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};
use uuid::Uuid;

pub const SESSION_NAME_MAX_CHARS: usize = 60;
pub const DEFAULT_SESSION_NAME: &str = "New chat";

/// Message to append
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub image_ref: Option<String>,
}

impl NewMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            image_ref: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            image_ref: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let has_image = self
            .image_ref
            .as_deref()
            .map(|r| !r.trim().is_empty())
            .unwrap_or(false);

        if self.content.trim().is_empty() && !has_image {
            return Err(Error::InvalidInput(
                "message needs content or an image reference".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of [`create_or_append`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppendOutcome {
    pub session_id: String,
    pub message_id: i64,
    pub created_session: bool,
}

/// Per-session append locks
///
/// Appends to one session run one at a time; different sessions never wait
/// on each other.
#[derive(Debug, Clone, Default)]
pub struct AppendLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl AppendLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handle for `session_id`
    pub fn lock_for(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // Drop handles nobody is holding or waiting on
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
        map.entry(session_id.to_string()).or_default().clone()
    }

    pub fn tracked(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Session name from the first message: first non-blank line, whitespace
/// collapsed, at most [`SESSION_NAME_MAX_CHARS`] characters
pub fn session_name_from(content: &str) -> String {
    let line = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default();

    let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return DEFAULT_SESSION_NAME.to_string();
    }

    collapsed.chars().take(SESSION_NAME_MAX_CHARS).collect()
}

async fn insert_message(
    conn: &mut SqliteConnection,
    session_id: &str,
    message: &NewMessage,
    created_at: i64,
) -> Result<i64> {
    let image_ref = message
        .image_ref
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty());

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO chat_messages (session_id, role, content, image_ref, created_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(session_id)
    .bind(message.role)
    .bind(&message.content)
    .bind(image_ref)
    .bind(created_at)
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}

/// Append `message`, creating a session when `session_id` is `None`
///
/// The session write and the message insert commit together or not at all.
pub async fn create_or_append(
    db: &Database,
    locks: &AppendLocks,
    session_id: Option<&str>,
    message: &NewMessage,
) -> Result<AppendOutcome> {
    message.validate()?;

    match session_id {
        Some(session_id) => append(db, locks, session_id, message).await,
        None => create_with_message(db, message).await,
    }
}

async fn append(
    db: &Database,
    locks: &AppendLocks,
    session_id: &str,
    message: &NewMessage,
) -> Result<AppendOutcome> {
    let lock = locks.lock_for(session_id);
    let _guard = lock.lock().await;

    let mut tx = db.begin().await?;

    // Write first so the busy timeout covers taking the write lock.
    // updated_at never moves backwards, so it doubles as a per-session
    // monotonic message timestamp.
    let created_at: Option<i64> = sqlx::query_scalar(
        "UPDATE chat_sessions SET updated_at = MAX(updated_at, ?) WHERE id = ? RETURNING updated_at",
    )
    .bind(time::now_millis())
    .bind(session_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(created_at) = created_at else {
        return Err(Error::NotFound(format!("Chat session {}", session_id)));
    };

    let message_id = insert_message(&mut tx, session_id, message, created_at).await?;
    tx.commit().await?;

    debug!(session_id, message_id, "Appended chat message");
    Ok(AppendOutcome {
        session_id: session_id.to_string(),
        message_id,
        created_session: false,
    })
}

async fn create_with_message(db: &Database, message: &NewMessage) -> Result<AppendOutcome> {
    let session_id = Uuid::new_v4().to_string();
    let name = session_name_from(&message.content);
    let now = time::now_millis();

    let mut tx = db.begin().await?;

    sqlx::query(
        "INSERT INTO chat_sessions (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&session_id)
    .bind(&name)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let message_id = insert_message(&mut tx, &session_id, message, now).await?;
    tx.commit().await?;

    info!(session_id = %session_id, name = %name, "Created chat session");
    Ok(AppendOutcome {
        session_id,
        message_id,
        created_session: true,
    })
}

/// All sessions, most recently updated first
pub async fn list_sessions(db: &Database) -> Result<Vec<ChatSession>> {
    let sessions = sqlx::query_as::<_, ChatSession>(
        r#"
        SELECT id, name, category, created_at, updated_at
        FROM chat_sessions
        ORDER BY updated_at DESC, created_at DESC, id
        "#,
    )
    .fetch_all(db.pool())
    .await?;

    Ok(sessions)
}

pub async fn get_session(db: &Database, session_id: &str) -> Result<ChatSession> {
    sqlx::query_as::<_, ChatSession>(
        "SELECT id, name, category, created_at, updated_at FROM chat_sessions WHERE id = ?",
    )
    .bind(session_id)
    .fetch_optional(db.pool())
    .await?
    .ok_or_else(|| Error::NotFound(format!("Chat session {}", session_id)))
}

/// Messages of one session in display order
pub async fn list_messages(db: &Database, session_id: &str) -> Result<Vec<ChatMessage>> {
    // One read transaction so the existence check and the rows agree
    let mut tx = db.begin().await?;

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM chat_sessions WHERE id = ?)")
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await?;
    if !exists {
        return Err(Error::NotFound(format!("Chat session {}", session_id)));
    }

    let messages = sqlx::query_as::<_, ChatMessage>(
        r#"
        SELECT id, session_id, role, content, image_ref, created_at
        FROM chat_messages
        WHERE session_id = ?
        ORDER BY created_at, id
        "#,
    )
    .bind(session_id)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(messages)
}

/// Delete a session and, by cascade, its messages
pub async fn delete_session(db: &Database, session_id: &str) -> Result<()> {
    let deleted = sqlx::query("DELETE FROM chat_sessions WHERE id = ?")
        .bind(session_id)
        .execute(db.pool())
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(Error::NotFound(format!("Chat session {}", session_id)));
    }

    info!(session_id, "Deleted chat session");
    Ok(())
}

/// Change a session's name and/or category
///
/// `None` leaves a field as it is. Does not bump `updated_at`.
pub async fn rename_session(
    db: &Database,
    session_id: &str,
    name: Option<&str>,
    category: Option<&str>,
) -> Result<ChatSession> {
    let name = name.map(str::trim);
    let category = category.map(str::trim);

    if name.is_some_and(str::is_empty) {
        return Err(Error::InvalidInput("session name cannot be empty".to_string()));
    }
    if category.is_some_and(str::is_empty) {
        return Err(Error::InvalidInput("session category cannot be empty".to_string()));
    }
    let name = name.map(|n| n.chars().take(SESSION_NAME_MAX_CHARS).collect::<String>());

    sqlx::query_as::<_, ChatSession>(
        r#"
        UPDATE chat_sessions
        SET name = COALESCE(?, name), category = COALESCE(?, category)
        WHERE id = ?
        RETURNING id, name, category, created_at, updated_at
        "#,
    )
    .bind(name)
    .bind(category)
    .bind(session_id)
    .fetch_optional(db.pool())
    .await?
    .ok_or_else(|| Error::NotFound(format!("Chat session {}", session_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use curio_common::db::init_database;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Database, AppendLocks) {
        let dir = TempDir::new().unwrap();
        let db = init_database(&dir.path().join("curio.db")).await.unwrap();
        (dir, db, AppendLocks::new())
    }

    #[test]
    fn test_session_name_from_first_line() {
        assert_eq!(session_name_from("  red   lamp\nfor my desk"), "red lamp");
        assert_eq!(session_name_from("\n\n  second line wins  "), "second line wins");
        assert_eq!(session_name_from("   "), DEFAULT_SESSION_NAME);

        let long = "x".repeat(100);
        assert_eq!(session_name_from(&long).chars().count(), SESSION_NAME_MAX_CHARS);
    }

    #[test]
    fn test_message_needs_content_or_image() {
        assert!(NewMessage::user("hi").validate().is_ok());
        assert!(NewMessage::user("  ").validate().is_err());

        let image_only = NewMessage {
            role: Role::User,
            content: String::new(),
            image_ref: Some("img/1.png".to_string()),
        };
        assert!(image_only.validate().is_ok());
    }

    #[tokio::test]
    async fn test_create_then_append() {
        let (_dir, db, locks) = setup().await;

        let first = create_or_append(&db, &locks, None, &NewMessage::user("Walnut desk"))
            .await
            .unwrap();
        assert!(first.created_session);

        let second = create_or_append(
            &db,
            &locks,
            Some(&first.session_id),
            &NewMessage::assistant("Here are some desks"),
        )
        .await
        .unwrap();
        assert!(!second.created_session);
        assert_eq!(second.session_id, first.session_id);
        assert!(second.message_id > first.message_id);

        let session = get_session(&db, &first.session_id).await.unwrap();
        assert_eq!(session.name, "Walnut desk");
        assert_eq!(session.category, "general");

        let messages = list_messages(&db, &first.session_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].content, "Here are some desks");
    }

    #[tokio::test]
    async fn test_append_to_unknown_session_is_not_found() {
        let (_dir, db, locks) = setup().await;

        let err = create_or_append(&db, &locks, Some("missing"), &NewMessage::user("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_messages")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_list_sessions_most_recent_first() {
        let (_dir, db, locks) = setup().await;

        let older = create_or_append(&db, &locks, None, &NewMessage::user("older"))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let newer = create_or_append(&db, &locks, None, &NewMessage::user("newer"))
            .await
            .unwrap();

        let ids: Vec<String> = list_sessions(&db).await.unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![newer.session_id.clone(), older.session_id.clone()]);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        create_or_append(&db, &locks, Some(&older.session_id), &NewMessage::user("bump"))
            .await
            .unwrap();

        let ids: Vec<String> = list_sessions(&db).await.unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![older.session_id, newer.session_id]);
    }

    #[tokio::test]
    async fn test_concurrent_appends_to_one_session_keep_order() {
        let (_dir, db, locks) = setup().await;
        let start = create_or_append(&db, &locks, None, &NewMessage::user("start"))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let db = db.clone();
            let locks = locks.clone();
            let session_id = start.session_id.clone();
            handles.push(tokio::spawn(async move {
                create_or_append(&db, &locks, Some(&session_id), &NewMessage::user(format!("m{}", i)))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let messages = list_messages(&db, &start.session_id).await.unwrap();
        assert_eq!(messages.len(), 17);
        for pair in messages.windows(2) {
            assert!(pair[0].id < pair[1].id, "display order must follow id order");
            assert!(pair[0].created_at <= pair[1].created_at);
        }
    }

    #[tokio::test]
    async fn test_delete_session_and_unknown() {
        let (_dir, db, locks) = setup().await;
        let created = create_or_append(&db, &locks, None, &NewMessage::user("bye"))
            .await
            .unwrap();

        delete_session(&db, &created.session_id).await.unwrap();

        assert!(matches!(
            delete_session(&db, &created.session_id).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            list_messages(&db, &created.session_id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rename_session() {
        let (_dir, db, locks) = setup().await;
        let created = create_or_append(&db, &locks, None, &NewMessage::user("lamps"))
            .await
            .unwrap();

        let renamed = rename_session(&db, &created.session_id, Some("Desk lamps"), None)
            .await
            .unwrap();
        assert_eq!(renamed.name, "Desk lamps");
        assert_eq!(renamed.category, "general");

        let recategorized = rename_session(&db, &created.session_id, None, Some("lighting"))
            .await
            .unwrap();
        assert_eq!(recategorized.name, "Desk lamps");
        assert_eq!(recategorized.category, "lighting");

        assert!(matches!(
            rename_session(&db, &created.session_id, Some("  "), None).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            rename_session(&db, "missing", Some("x"), None).await,
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_append_locks_release_idle_entries() {
        let locks = AppendLocks::new();
        {
            let _a = locks.lock_for("a");
            let _b = locks.lock_for("b");
            assert_eq!(locks.tracked(), 2);
        }
        let _c = locks.lock_for("c");
        assert_eq!(locks.tracked(), 1);
    }
}
