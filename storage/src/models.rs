use agentcore_protocol::Role;
use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

/// Upper bound on `Message.content`, enforced before insert (§3 invariants).
pub const MAX_CONTENT_CHARS: usize = 25_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    pub id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: Option<i64>,
}

pub const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub role: Role,
    pub content: String,
    /// The structured part payload: `{"parts": [...], "model_name": ..., "timestamp": ...}`.
    /// `None` for a row that has never had structured parts attached.
    pub parts: Option<Value>,
    pub created_at: DateTime<Utc>,
}

pub(crate) fn role_to_db(role: Role) -> &'static str {
    role.as_str()
}

pub(crate) fn role_from_db(raw: &str) -> Role {
    raw.parse().unwrap_or(Role::Agent)
}
