//! The tagged union of fragments that make up a streamed or persisted agent
//! message (§3 `MessagePart` in the design).
//!
//! Decoding is strict: an unrecognized `part_kind` is a hard parse error
//! rather than a part silently dropped on the floor, so a payload from a
//! newer build never loses data quietly on an older one.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "part_kind", rename_all = "kebab-case")]
pub enum MessagePart {
    UserPrompt {
        content: String,
    },
    SystemPrompt {
        content: String,
    },
    Text {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    Thinking {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    ToolCall {
        tool_name: String,
        args: Value,
        tool_call_id: String,
    },
    ToolReturn {
        tool_name: String,
        /// `null` passthrough, string passthrough, or a list/mapping already
        /// stringified to canonical JSON — see [`encode_tool_return_content`].
        #[serde(default)]
        content: Option<String>,
        tool_call_id: String,
    },
}

impl MessagePart {
    pub fn kind(&self) -> &'static str {
        match self {
            MessagePart::UserPrompt { .. } => "user-prompt",
            MessagePart::SystemPrompt { .. } => "system-prompt",
            MessagePart::Text { .. } => "text",
            MessagePart::Thinking { .. } => "thinking",
            MessagePart::ToolCall { .. } => "tool-call",
            MessagePart::ToolReturn { .. } => "tool-return",
        }
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            MessagePart::ToolCall { tool_call_id, .. } => Some(tool_call_id),
            MessagePart::ToolReturn { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        }
    }

    /// Node-streamable parts are the non-tool output a step actually
    /// produces (§3 `Node`): `UserPrompt`/`SystemPrompt` are history-only
    /// and never appear in a streamed Node, and tool parts are emitted
    /// out-of-band as `tool_start`/`tool_complete` instead.
    pub fn is_streamable(&self) -> bool {
        matches!(self, MessagePart::Text { .. } | MessagePart::Thinking { .. })
    }
}

/// Render a tool's raw JSON result the way a persisted `tool-return` part
/// expects: `null` passes through as `None`, a string passes through
/// unchanged, a list/mapping is stringified via canonical JSON, and anything
/// else falls back to its default textual rendering.
pub fn encode_tool_return_content(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_return_content_passthrough() {
        assert_eq!(encode_tool_return_content(&Value::Null), None);
        assert_eq!(
            encode_tool_return_content(&Value::String("hi".into())),
            Some("hi".into())
        );
    }

    #[test]
    fn tool_return_content_stringifies_structured_values() {
        let v = serde_json::json!({"a": 1});
        assert_eq!(encode_tool_return_content(&v), Some("{\"a\":1}".into()));
    }

    #[test]
    fn unknown_part_kind_is_rejected() {
        let raw = serde_json::json!({"part_kind": "bogus", "content": "x"});
        let err = serde_json::from_value::<MessagePart>(raw).unwrap_err();
        assert!(err.to_string().contains("unknown variant"));
    }

    #[test]
    fn user_and_system_prompt_are_not_streamable() {
        assert!(!MessagePart::UserPrompt { content: "x".into() }.is_streamable());
        assert!(MessagePart::Text { content: "x".into(), id: None }.is_streamable());
    }
}
