use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("conversation {0} not found")]
    ConversationNotFound(i64),

    #[error("message content exceeds 25000 characters")]
    ContentTooLong,
}
