//! Relational persistence for conversations and messages (§4.3).
//!
//! Schema mirrors the original SQLModel definitions: two tables,
//! `conversations` and `messages`, the latter carrying a nullable JSON
//! `parts` column. Backed by SQLite through `sqlx` for an async pool that
//! fits the rest of the workspace's tokio-everywhere design.

mod error;
mod models;
mod store;

pub use error::StorageError;
pub use models::Conversation;
pub use models::Message;
pub use models::DEFAULT_CONVERSATION_TITLE;
pub use models::MAX_CONTENT_CHARS;
pub use store::Store;
