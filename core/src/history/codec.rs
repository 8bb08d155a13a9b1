//! Converts between the persisted `parts` JSON payload and the ordered
//! message list the agent graph consumes (§4.4).
//!
//! The critical piece of this module is repair: a crash between a
//! `tool-call` part being recorded and its `tool-return` arriving leaves an
//! AGENT row with an unanswered call. Decoding drops it rather than handing
//! the agent a call it can never resolve, which is what makes a
//! conversation safely resumable.

use std::collections::HashSet;

use agentcore_protocol::MessagePart;
use agentcore_protocol::Role;
use agentcore_storage::Message as StoredMessage;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// One entry of the decoded history handed to the agent graph: a user turn
/// or a prior agent response, each carrying its ordered parts.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryMessage {
    Request { parts: Vec<MessagePart> },
    Response { parts: Vec<MessagePart> },
}

#[derive(Debug, Deserialize, Serialize)]
struct PersistedParts {
    parts: Vec<MessagePart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<DateTime<Utc>>,
}

/// Builds the JSON payload stored in `messages.parts` at Finalize (§4.7).
/// `user-prompt`/`system-prompt` parts are never expected here — the
/// orchestrator only accumulates non-prompt parts into a turn's part list.
pub fn encode_turn_parts(
    parts: Vec<MessagePart>,
    model_name: Option<String>,
    timestamp: Option<DateTime<Utc>>,
) -> Value {
    let payload = PersistedParts {
        parts: parts
            .into_iter()
            .filter(|p| !matches!(p, MessagePart::UserPrompt { .. } | MessagePart::SystemPrompt { .. }))
            .collect(),
        model_name,
        timestamp,
    };
    // `PersistedParts` only ever contains part kinds that round-trip through
    // serde_json cleanly, so this cannot fail in practice.
    serde_json::to_value(payload).unwrap_or(Value::Null)
}

/// Decodes every stored message of a conversation into the ordered history
/// the agent graph is seeded with.
pub fn decode_history(rows: &[StoredMessage]) -> Vec<HistoryMessage> {
    rows.iter().map(decode_one).collect()
}

fn decode_one(row: &StoredMessage) -> HistoryMessage {
    match row.role {
        Role::User => HistoryMessage::Request {
            parts: vec![MessagePart::UserPrompt {
                content: row.content.clone(),
            }],
        },
        Role::Agent => decode_agent_row(row),
    }
}

fn decode_agent_row(row: &StoredMessage) -> HistoryMessage {
    let Some(raw) = &row.parts else {
        return fallback_text_response(row);
    };

    let Ok(persisted) = serde_json::from_value::<PersistedParts>(raw.clone()) else {
        return fallback_text_response(row);
    };

    let mut tool_call_ids = HashSet::new();
    let mut tool_return_ids = HashSet::new();
    for part in &persisted.parts {
        match part {
            MessagePart::ToolCall { tool_call_id, .. } => {
                tool_call_ids.insert(tool_call_id.clone());
            }
            MessagePart::ToolReturn { tool_call_id, .. } => {
                tool_return_ids.insert(tool_call_id.clone());
            }
            _ => {}
        }
    }
    let unprocessed: HashSet<&String> = tool_call_ids.difference(&tool_return_ids).collect();
    if !unprocessed.is_empty() {
        tracing::warn!(
            message_id = row.id,
            unprocessed = ?unprocessed,
            "dropping unmatched tool-call parts from persisted history"
        );
    }

    let repaired: Vec<MessagePart> = persisted
        .parts
        .into_iter()
        .filter(|part| match part {
            MessagePart::ToolCall { tool_call_id, .. } => !unprocessed.contains(tool_call_id),
            _ => true,
        })
        .collect();

    if repaired.is_empty() {
        fallback_text_response(row)
    } else {
        HistoryMessage::Response { parts: repaired }
    }
}

fn fallback_text_response(row: &StoredMessage) -> HistoryMessage {
    HistoryMessage::Response {
        parts: vec![MessagePart::Text {
            content: row.content.clone(),
            id: None,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_protocol::Role as PRole;
    use chrono::Utc;

    fn stored(id: i64, role: PRole, content: &str, parts: Option<Value>) -> StoredMessage {
        StoredMessage {
            id,
            conversation_id: 1,
            role,
            content: content.to_string(),
            parts,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn user_row_becomes_single_user_prompt_part() {
        let row = stored(1, PRole::User, "hello", None);
        let decoded = decode_history(&[row]);
        assert_eq!(
            decoded,
            vec![HistoryMessage::Request {
                parts: vec![MessagePart::UserPrompt { content: "hello".into() }]
            }]
        );
    }

    #[test]
    fn agent_row_without_parts_falls_back_to_text() {
        let row = stored(2, PRole::Agent, "hi there", None);
        let decoded = decode_history(&[row]);
        assert_eq!(
            decoded,
            vec![HistoryMessage::Response {
                parts: vec![MessagePart::Text { content: "hi there".into(), id: None }]
            }]
        );
    }

    #[test]
    fn unmatched_tool_call_is_dropped_and_falls_back_when_nothing_remains() {
        let payload = serde_json::json!({
            "parts": [
                {"part_kind": "tool-call", "tool_name": "read_file", "args": {}, "tool_call_id": "x"}
            ]
        });
        let row = stored(3, PRole::Agent, "reading a file", Some(payload));
        let decoded = decode_history(&[row]);
        assert_eq!(
            decoded,
            vec![HistoryMessage::Response {
                parts: vec![MessagePart::Text { content: "reading a file".into(), id: None }]
            }]
        );
    }

    #[test]
    fn matched_tool_call_and_return_survive_decoding() {
        let payload = serde_json::json!({
            "parts": [
                {"part_kind": "tool-call", "tool_name": "read_file", "args": {}, "tool_call_id": "x"},
                {"part_kind": "tool-return", "tool_name": "read_file", "content": "contents", "tool_call_id": "x"}
            ]
        });
        let row = stored(4, PRole::Agent, "ok", Some(payload));
        let decoded = decode_history(&[row]);
        match &decoded[0] {
            HistoryMessage::Response { parts } => assert_eq!(parts.len(), 2),
            _ => panic!("expected a response message"),
        }
    }

    #[test]
    fn encode_turn_parts_drops_prompt_kinds() {
        let parts = vec![
            MessagePart::SystemPrompt { content: "sys".into() },
            MessagePart::Text { content: "hi".into(), id: None },
        ];
        let encoded = encode_turn_parts(parts, Some("claude-sonnet-4-5".into()), None);
        let persisted: PersistedParts = serde_json::from_value(encoded).unwrap();
        assert_eq!(persisted.parts.len(), 1);
        assert_eq!(persisted.model_name.as_deref(), Some("claude-sonnet-4-5"));
    }
}
