//! Drives the agent graph one step at a time against the model provider.
//!
//! The source this was adapted from drives a cooperative generator-style
//! iterator over an agent graph. Here that collapses to a single
//! `step(state) -> (state', produced_parts, done?)` call (design note §9),
//! which removes any need for coroutine-specific primitives and makes the
//! orchestrator directly testable against a stub stepper.

use agentcore_protocol::MessagePart;
use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde_json::json;
use serde_json::Value;

use crate::error::Result;
use crate::history::HistoryMessage;

/// Everything the next step needs: the system prompt and the history so
/// far, including whatever parts the turn has produced since it began.
#[derive(Debug, Clone)]
pub struct AgentState {
    pub system_prompt: String,
    pub history: Vec<HistoryMessage>,
}

impl AgentState {
    pub fn new(system_prompt: impl Into<String>, history: Vec<HistoryMessage>) -> Self {
        Self { system_prompt: system_prompt.into(), history }
    }

    pub fn push(&mut self, message: HistoryMessage) {
        self.history.push(message);
    }
}

/// The outcome of one agent-graph step.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Parts produced this step, in order — non-tool parts and any
    /// `tool-call` parts the model wants executed before it continues.
    pub parts: Vec<MessagePart>,
    pub model_name: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    /// `Some(final_output)` once the graph has reached its `End` node.
    pub done: Option<String>,
}

#[async_trait]
pub trait AgentStepper: Send + Sync {
    async fn step(&self, state: &AgentState) -> Result<StepResult>;
}

/// Anthropic Messages API-backed stepper. One HTTP call per step: the
/// model either returns tool-use blocks (the step is not done; the caller
/// executes them and appends `tool-return` parts to history before calling
/// `step` again) or a plain text/stop response (the step is done).
pub struct AnthropicStepper {
    client: reqwest::Client,
    api_key: String,
    model: String,
    tool_schemas: Vec<Value>,
}

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 8192;

impl AnthropicStepper {
    pub fn new(api_key: String, model: String, tool_schemas: Vec<Value>) -> Self {
        Self { client: reqwest::Client::new(), api_key, model, tool_schemas }
    }

    fn format_history(&self, history: &[HistoryMessage]) -> Vec<Value> {
        history.iter().flat_map(|m| self.format_message(m)).collect()
    }

    fn format_message(&self, message: &HistoryMessage) -> Vec<Value> {
        match message {
            HistoryMessage::Request { parts } => parts
                .iter()
                .filter_map(|part| match part {
                    MessagePart::UserPrompt { content } => {
                        Some(json!({"role": "user", "content": content}))
                    }
                    MessagePart::SystemPrompt { content } => {
                        Some(json!({"role": "user", "content": format!("[system]\n{content}")}))
                    }
                    _ => None,
                })
                .collect(),
            HistoryMessage::Response { parts } => {
                let mut blocks = Vec::new();
                let mut tool_results = Vec::new();
                for part in parts {
                    match part {
                        MessagePart::Text { content, .. } => {
                            blocks.push(json!({"type": "text", "text": content}));
                        }
                        MessagePart::Thinking { content, .. } => {
                            blocks.push(json!({"type": "text", "text": format!("(thinking) {content}")}));
                        }
                        MessagePart::ToolCall { tool_name, args, tool_call_id } => {
                            blocks.push(json!({
                                "type": "tool_use",
                                "id": tool_call_id,
                                "name": tool_name,
                                "input": args,
                            }));
                        }
                        MessagePart::ToolReturn { tool_call_id, content, .. } => {
                            tool_results.push(json!({
                                "type": "tool_result",
                                "tool_use_id": tool_call_id,
                                "content": content.clone().unwrap_or_default(),
                            }));
                        }
                        _ => {}
                    }
                }

                let mut out = Vec::new();
                if !blocks.is_empty() {
                    out.push(json!({"role": "assistant", "content": blocks}));
                }
                if !tool_results.is_empty() {
                    out.push(json!({"role": "user", "content": tool_results}));
                }
                out
            }
        }
    }
}

#[async_trait]
impl AgentStepper for AnthropicStepper {
    async fn step(&self, state: &AgentState) -> Result<StepResult> {
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "system": state.system_prompt,
            "messages": self.format_history(&state.history),
            "tools": self.tool_schemas,
        });

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: Value = response.json().await?;
        parse_response(&parsed, &self.model)
    }
}

fn parse_response(response: &Value, model: &str) -> Result<StepResult> {
    let stop_reason = response.get("stop_reason").and_then(Value::as_str).unwrap_or("");
    let content = response
        .get("content")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut parts = Vec::new();
    let mut text_accum = String::new();

    for block in &content {
        let kind = block.get("type").and_then(Value::as_str).unwrap_or("");
        match kind {
            "text" => {
                let text = block.get("text").and_then(Value::as_str).unwrap_or("").to_string();
                text_accum.push_str(&text);
                parts.push(MessagePart::Text { content: text, id: None });
            }
            "thinking" => {
                let text = block.get("thinking").and_then(Value::as_str).unwrap_or("").to_string();
                let signature = block.get("signature").and_then(Value::as_str).map(String::from);
                parts.push(MessagePart::Thinking {
                    content: text,
                    provider_name: Some("anthropic".to_string()),
                    signature,
                    id: None,
                });
            }
            "tool_use" => {
                let tool_name = block.get("name").and_then(Value::as_str).unwrap_or("").to_string();
                let tool_call_id = block.get("id").and_then(Value::as_str).unwrap_or("").to_string();
                let args = block.get("input").cloned().unwrap_or(json!({}));
                parts.push(MessagePart::ToolCall { tool_name, args, tool_call_id });
            }
            other => {
                tracing::debug!(block_kind = other, "ignoring unrecognized content block kind");
            }
        }
    }

    let done = if stop_reason == "tool_use" { None } else { Some(text_accum) };

    Ok(StepResult {
        parts,
        model_name: Some(model.to_string()),
        timestamp: Some(Utc::now()),
        done,
    })
}

/// Provider-backed [`crate::history::Summarizer`]: a single, tool-free
/// Messages API call asking the model to recap the flattened history
/// (§4.5). Shares the same HTTP client shape as [`AnthropicStepper`] but
/// never drives the agent graph itself.
pub struct AnthropicSummarizer {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl AnthropicSummarizer {
    pub fn new(api_key: String, model: String) -> Self {
        Self { client: reqwest::Client::new(), api_key, model }
    }
}

#[async_trait]
impl crate::history::Summarizer for AnthropicSummarizer {
    async fn summarize(&self, flattened_history: &str, max_tokens: u32) -> Result<String> {
        let body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "system": "Summarize the following conversation history concisely, preserving any \
                       decisions, file paths, and open tasks a continuation would need.",
            "messages": [{"role": "user", "content": flattened_history}],
        });

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: Value = response.json().await?;
        let text = parsed
            .get("content")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_only_response_as_done() {
        let response = json!({
            "stop_reason": "end_turn",
            "content": [{"type": "text", "text": "hello"}],
        });
        let result = parse_response(&response, "claude-sonnet-4-5").unwrap();
        assert_eq!(result.done, Some("hello".to_string()));
        assert_eq!(result.parts.len(), 1);
    }

    #[test]
    fn parses_tool_use_response_as_not_done() {
        let response = json!({
            "stop_reason": "tool_use",
            "content": [{"type": "tool_use", "id": "t1", "name": "read_file", "input": {"path": "a.txt"}}],
        });
        let result = parse_response(&response, "claude-sonnet-4-5").unwrap();
        assert!(result.done.is_none());
        match &result.parts[0] {
            MessagePart::ToolCall { tool_name, tool_call_id, .. } => {
                assert_eq!(tool_name, "read_file");
                assert_eq!(tool_call_id, "t1");
            }
            other => panic!("expected tool-call, got {other:?}"),
        }
    }

    #[test]
    fn unrecognized_block_kind_is_skipped_not_fatal() {
        let response = json!({
            "stop_reason": "end_turn",
            "content": [{"type": "redaction", "data": "x"}, {"type": "text", "text": "ok"}],
        });
        let result = parse_response(&response, "claude-sonnet-4-5").unwrap();
        assert_eq!(result.parts.len(), 1);
    }
}
