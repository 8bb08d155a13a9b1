use chrono::DateTime;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::Row;
use sqlx::SqlitePool;

use crate::error::StorageError;
use crate::models::role_from_db;
use crate::models::role_to_db;
use crate::models::Conversation;
use crate::models::Message;
use crate::models::DEFAULT_CONVERSATION_TITLE;
use crate::models::MAX_CONTENT_CHARS;
use agentcore_protocol::Role;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL DEFAULT 'New Conversation',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL,
    role TEXT NOT NULL,
    conversation_id INTEGER NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
    parts TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_id ON messages(conversation_id);
"#;

/// Owns the connection pool backing the whole process (§5: the pool is the
/// only process-wide shared database resource; sessions borrow from it but
/// are never shared across connections).
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory database, used by tests across the workspace that need a
    /// real `Store` without a file on disk.
    pub async fn connect_in_memory() -> Result<Self, StorageError> {
        Self::connect("sqlite::memory:").await
    }

    pub async fn insert_conversation(&self, title: Option<&str>) -> Result<Conversation, StorageError> {
        let title = title.unwrap_or(DEFAULT_CONVERSATION_TITLE);
        let now = Utc::now();
        let row = sqlx::query(
            "INSERT INTO conversations (title, created_at, updated_at) VALUES (?1, ?2, ?2) RETURNING id",
        )
        .bind(title)
        .bind(now.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        Ok(Conversation {
            id: row.try_get("id")?,
            title: title.to_string(),
            created_at: now,
            updated_at: now,
            message_count: Some(0),
        })
    }

    pub async fn get_conversation(&self, id: i64) -> Result<Option<Conversation>, StorageError> {
        let row = sqlx::query(
            "SELECT c.id, c.title, c.created_at, c.updated_at, COUNT(m.id) as message_count
             FROM conversations c LEFT JOIN messages m ON m.conversation_id = c.id
             WHERE c.id = ?1 GROUP BY c.id",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_conversation).transpose()
    }

    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, StorageError> {
        let rows = sqlx::query(
            "SELECT c.id, c.title, c.created_at, c.updated_at, COUNT(m.id) as message_count
             FROM conversations c LEFT JOIN messages m ON m.conversation_id = c.id
             GROUP BY c.id ORDER BY c.id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_conversation).collect()
    }

    pub async fn delete_conversation(&self, id: i64) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Inserts a message and returns it with its server-assigned id and
    /// timestamp. Rejects content over the 25 000 character bound before
    /// ever touching the database (§3 invariants).
    pub async fn insert_message(
        &self,
        conversation_id: i64,
        role: Role,
        content: &str,
        parts: Option<serde_json::Value>,
    ) -> Result<Message, StorageError> {
        if content.chars().count() > MAX_CONTENT_CHARS {
            return Err(StorageError::ContentTooLong);
        }

        let now = Utc::now();
        let parts_json = parts.as_ref().map(serde_json::to_string).transpose()?;

        let row = sqlx::query(
            "INSERT INTO messages (content, role, conversation_id, parts, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5) RETURNING id",
        )
        .bind(content)
        .bind(role_to_db(role))
        .bind(conversation_id)
        .bind(&parts_json)
        .bind(now.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        Ok(Message {
            id: row.try_get("id")?,
            conversation_id,
            role,
            content: content.to_string(),
            parts,
            created_at: now,
        })
    }

    /// Updates a message's content and parts in place — used by the
    /// orchestrator's Finalize transition to fill in the empty AGENT row
    /// created at turn start (§4.7).
    pub async fn update_message(
        &self,
        id: i64,
        content: &str,
        parts: Option<serde_json::Value>,
    ) -> Result<(), StorageError> {
        let parts_json = parts.as_ref().map(serde_json::to_string).transpose()?;
        sqlx::query("UPDATE messages SET content = ?1, parts = ?2 WHERE id = ?3")
            .bind(content)
            .bind(&parts_json)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Lists a conversation's messages ordered by creation time, optionally
    /// excluding one message id (the just-inserted user message during
    /// LoadHistory, §4.7).
    pub async fn list_messages(
        &self,
        conversation_id: i64,
        exclude_id: Option<i64>,
    ) -> Result<Vec<Message>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, content, role, conversation_id, parts, created_at
             FROM messages WHERE conversation_id = ?1 AND (?2 IS NULL OR id != ?2)
             ORDER BY created_at, id",
        )
        .bind(conversation_id)
        .bind(exclude_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_message).collect()
    }
}

fn row_to_conversation(row: sqlx::sqlite::SqliteRow) -> Result<Conversation, StorageError> {
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    Ok(Conversation {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
        message_count: row.try_get("message_count")?,
    })
}

fn row_to_message(row: sqlx::sqlite::SqliteRow) -> Result<Message, StorageError> {
    let role_raw: String = row.try_get("role")?;
    let created_at: String = row.try_get("created_at")?;
    let parts_raw: Option<String> = row.try_get("parts")?;
    let parts = parts_raw.map(|p| serde_json::from_str(&p)).transpose()?;

    Ok(Message {
        id: row.try_get("id")?,
        conversation_id: row.try_get("conversation_id")?,
        role: role_from_db(&role_raw),
        content: row.try_get("content")?,
        parts,
        created_at: parse_timestamp(&created_at),
    })
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_and_fetch_conversation_round_trips() {
        let store = Store::connect_in_memory().await.unwrap();
        let conv = store.insert_conversation(None).await.unwrap();
        assert_eq!(conv.title, DEFAULT_CONVERSATION_TITLE);

        let fetched = store.get_conversation(conv.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, conv.id);
        assert_eq!(fetched.message_count, Some(0));
    }

    #[tokio::test]
    async fn missing_conversation_is_none() {
        let store = Store::connect_in_memory().await.unwrap();
        assert!(store.get_conversation(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn insert_message_enforces_content_bound() {
        let store = Store::connect_in_memory().await.unwrap();
        let conv = store.insert_conversation(None).await.unwrap();
        let huge = "x".repeat(MAX_CONTENT_CHARS + 1);
        let err = store
            .insert_message(conv.id, Role::User, &huge, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ContentTooLong));
    }

    #[tokio::test]
    async fn list_messages_excludes_given_id_and_preserves_order() {
        let store = Store::connect_in_memory().await.unwrap();
        let conv = store.insert_conversation(None).await.unwrap();
        let m1 = store
            .insert_message(conv.id, Role::User, "hello", None)
            .await
            .unwrap();
        let m2 = store
            .insert_message(conv.id, Role::Agent, "hi back", None)
            .await
            .unwrap();

        let all = store.list_messages(conv.id, None).await.unwrap();
        assert_eq!(all.iter().map(|m| m.id).collect::<Vec<_>>(), vec![m1.id, m2.id]);

        let excluding_m1 = store.list_messages(conv.id, Some(m1.id)).await.unwrap();
        assert_eq!(excluding_m1.len(), 1);
        assert_eq!(excluding_m1[0].id, m2.id);
    }

    #[tokio::test]
    async fn delete_conversation_cascades_to_messages() {
        let store = Store::connect_in_memory().await.unwrap();
        let conv = store.insert_conversation(None).await.unwrap();
        store
            .insert_message(conv.id, Role::User, "hello", None)
            .await
            .unwrap();

        assert!(store.delete_conversation(conv.id).await.unwrap());
        assert!(store.get_conversation(conv.id).await.unwrap().is_none());
    }
}
