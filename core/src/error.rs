use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// The error kinds a turn can produce, unified into one enum so call sites
/// can use `?` instead of matching on each failure domain individually.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Frame was missing `content` or otherwise malformed.
    #[error("Message content is required")]
    InvalidFrame,

    #[error("Conversation {0} not found")]
    UnknownConversation(i64),

    /// A path rejected by the path validator. Carries the user-facing reason
    /// so it can be embedded verbatim in a `tool_complete` error message.
    #[error("{0}")]
    InvalidPath(String),

    /// A tool-local failure the agent's retry budget is expected to absorb.
    #[error("{0}")]
    ToolFailure(String),

    /// A transient condition (port in use, resource unavailable, stuck
    /// process) the agent is instructed to retry.
    #[error("{0}")]
    RetryableTransient(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The agent exhausted its retry budget; the turn is aborted.
    #[error("agent retry budget exhausted: {0}")]
    AgentFatal(String),

    #[error("connection lost")]
    ConnectionLost,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Database(#[from] agentcore_storage::StorageError),

    #[error(transparent)]
    Provider(#[from] reqwest::Error),
}

impl CoreError {
    /// Whether this error should be surfaced to the client as an `error`
    /// envelope with the turn abandoned (§7), as opposed to being routed
    /// back into the agent loop as a recoverable tool result.
    pub fn aborts_turn(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidFrame
                | CoreError::UnknownConversation(_)
                | CoreError::InvalidPath(_)
                | CoreError::AgentFatal(_)
                | CoreError::ConnectionLost
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_path_renders_its_reason() {
        let err = CoreError::InvalidPath("path escapes sandbox root".into());
        assert_eq!(err.to_string(), "path escapes sandbox root");
    }

    #[test]
    fn unknown_conversation_formats_id() {
        let err = CoreError::UnknownConversation(42);
        assert_eq!(err.to_string(), "Conversation 42 not found");
    }

    #[test]
    fn abort_classification_matches_propagation_policy() {
        assert!(CoreError::InvalidFrame.aborts_turn());
        assert!(CoreError::UnknownConversation(1).aborts_turn());
        assert!(CoreError::InvalidPath("x".into()).aborts_turn());
        assert!(!CoreError::ToolFailure("x".into()).aborts_turn());
        assert!(!CoreError::RetryableTransient("x".into()).aborts_turn());
    }
}
