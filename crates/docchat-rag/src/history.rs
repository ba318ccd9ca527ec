//! Conversation history stores
//!
//! [`SqliteConversationStore`] is the durable per-session log;
//! [`MemoryConversationStore`] backs tests and ephemeral sessions. Both are
//! append-only and return history oldest-first.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::debug;

use docchat_core::{ChatMessage, ChatRole, ConversationStore, DocChatError, Result};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS conversation_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    role TEXT NOT NULL,
    message TEXT NOT NULL,
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_conversation_session
    ON conversation_history (session_id);
";

fn store_error(e: sqlx::Error) -> DocChatError {
    DocChatError::Store(e.to_string())
}

#[derive(Debug, FromRow)]
struct HistoryRow {
    role: String,
    message: String,
}

/// SQLite-backed conversation log
pub struct SqliteConversationStore {
    pool: SqlitePool,
}

impl SqliteConversationStore {
    /// Open (or create) the database file and ensure the schema exists
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    DocChatError::Store(format!("failed to create {}: {e}", parent.display()))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(store_error)?;

        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(store_error)?;

        debug!(path = %path.display(), "conversation store ready");
        Ok(Self { pool })
    }

    /// An in-process database that disappears when the store is dropped.
    /// Pinned to a single connection so every query sees the same database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(store_error)?;

        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(store_error)?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn append(&self, session_id: &str, role: ChatRole, text: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO conversation_history (session_id, role, message) VALUES (?, ?, ?)",
        )
        .bind(session_id)
        .bind(role.to_string())
        .bind(text)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn read(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        // id breaks ties between messages stored within the same second
        let rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT role, message FROM conversation_history \
             WHERE session_id = ? ORDER BY timestamp, id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter()
            .map(|row| {
                let role: ChatRole = row.role.parse()?;
                Ok(ChatMessage {
                    role,
                    content: row.message,
                })
            })
            .collect()
    }
}

/// In-memory conversation log
#[derive(Default)]
pub struct MemoryConversationStore {
    sessions: RwLock<HashMap<String, Vec<ChatMessage>>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn append(&self, session_id: &str, role: ChatRole, text: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_default()
            .push(ChatMessage {
                role,
                content: text.to_string(),
            });
        Ok(())
    }

    async fn read(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_append_and_read_in_order() {
        let store = SqliteConversationStore::in_memory().await.unwrap();

        store.append("s1", ChatRole::User, "first").await.unwrap();
        store
            .append("s1", ChatRole::Assistant, "second")
            .await
            .unwrap();
        store.append("s1", ChatRole::User, "third").await.unwrap();

        let history = store.read("s1").await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0], ChatMessage::user("first"));
        assert_eq!(history[1], ChatMessage::assistant("second"));
        assert_eq!(history[2], ChatMessage::user("third"));
    }

    #[tokio::test]
    async fn test_sqlite_sessions_are_isolated() {
        let store = SqliteConversationStore::in_memory().await.unwrap();

        store.append("a", ChatRole::User, "for a").await.unwrap();
        store.append("b", ChatRole::User, "for b").await.unwrap();

        assert_eq!(store.read("a").await.unwrap().len(), 1);
        assert_eq!(store.read("b").await.unwrap().len(), 1);
        assert!(store.read("c").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("history.db");

        {
            let store = SqliteConversationStore::connect(&db).await.unwrap();
            store.append("s", ChatRole::User, "hello").await.unwrap();
        }

        let store = SqliteConversationStore::connect(&db).await.unwrap();
        let history = store.read("s").await.unwrap();
        assert_eq!(history, vec![ChatMessage::user("hello")]);
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryConversationStore::new();

        store.append("s", ChatRole::User, "hi").await.unwrap();
        store.append("s", ChatRole::Assistant, "hello").await.unwrap();

        let history = store.read("s").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, ChatRole::Assistant);
        assert!(store.read("other").await.unwrap().is_empty());
    }
}
