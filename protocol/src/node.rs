use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::parts::MessagePart;

/// The bundle of non-tool parts produced at a single agent step (§3).
///
/// Tool parts never appear inside a `Node` — they are surfaced out-of-band
/// as `tool_start`/`tool_complete` envelopes by the tool wrappers themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub step: u32,
    pub parts: Vec<MessagePart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Node {
    pub fn new(step: u32) -> Self {
        Self {
            id: format!("step-{step}"),
            step,
            parts: Vec::new(),
            model_name: None,
            timestamp: None,
        }
    }

    pub fn has_content(&self) -> bool {
        !self.parts.is_empty()
    }
}
