use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::node::Node;
use crate::parts::MessagePart;
use crate::role::Role;

/// Status of a completed tool call, carried on `tool_complete` (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Error,
    Cancelled,
}

/// Every envelope type the server can send to a connected client over the
/// duplex channel (§4.6). Writes are atomic per envelope: a client never
/// observes one envelope's fields interleaved with another's.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    ConversationCreated {
        conversation_id: i64,
    },
    Message {
        conversation_id: i64,
        id: i64,
        parts: Vec<MessagePart>,
        role: Role,
        created_at: DateTime<Utc>,
    },
    MessagePart {
        conversation_id: i64,
        message_id: i64,
        part: MessagePart,
        role: Role,
    },
    NodeAdded {
        conversation_id: i64,
        message_id: i64,
        node: Node,
    },
    TextChunk {
        conversation_id: i64,
        message_id: i64,
        chunk: String,
        role: Role,
    },
    ToolStart {
        conversation_id: i64,
        message_id: i64,
        tool_name: String,
        args: Value,
    },
    ToolComplete {
        conversation_id: i64,
        message_id: i64,
        tool_name: String,
        result: Value,
        status: ToolStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
    },
    MessageComplete {
        conversation_id: i64,
        id: i64,
        role: Role,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    },
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<i64>,
    },
}

impl Envelope {
    /// The conversation this envelope belongs to, when known. `Error` may be
    /// emitted before a conversation has been established.
    pub fn conversation_id(&self) -> Option<i64> {
        match self {
            Envelope::ConversationCreated { conversation_id }
            | Envelope::Message { conversation_id, .. }
            | Envelope::MessagePart { conversation_id, .. }
            | Envelope::NodeAdded { conversation_id, .. }
            | Envelope::TextChunk { conversation_id, .. }
            | Envelope::ToolStart { conversation_id, .. }
            | Envelope::ToolComplete { conversation_id, .. }
            | Envelope::MessageComplete { conversation_id, .. } => Some(*conversation_id),
            Envelope::Error { conversation_id, .. } => *conversation_id,
        }
    }
}

/// The client → server frame accepted on the duplex endpoint (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientFrame {
    pub content: String,
    #[serde(default)]
    pub conversation_id: Option<i64>,
}
