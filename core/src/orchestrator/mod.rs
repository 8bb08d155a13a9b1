//! Per-turn state machine: `Recv -> EnsureConversation -> PersistUser ->
//! LoadHistory -> (Compact?) -> StartAgent -> StepLoop -> Finalize -> Idle`,
//! with `Error` reachable from any state (§4.7).

mod tool_dispatch;

use agentcore_protocol::ClientFrame;
use agentcore_protocol::Envelope;
use agentcore_protocol::MessagePart;
use agentcore_protocol::Node;
use agentcore_protocol::Role;
use agentcore_storage::Store;
use chrono::Utc;

use crate::emitter::EventEmitter;
use crate::error::CoreError;
use crate::error::Result;
use crate::history;
use crate::history::HistoryMessage;
use crate::model_client::AgentState;
use crate::model_client::AgentStepper;
use crate::tools::ToolSurface;
use tool_dispatch::dispatch_tool_call;
use tool_dispatch::ToolCallContext;

/// Tool failures absorbed before a turn is abandoned as `AgentFatal` (§4.7).
const TOOL_FAILURE_BUDGET: u32 = 10;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a software engineering assistant operating inside a sandboxed workspace. Use the available tools to read, write, and test code; explain your reasoning briefly before acting.";

pub struct Orchestrator {
    store: Store,
    tools: ToolSurface,
    compaction_threshold: u64,
}

impl Orchestrator {
    pub fn new(store: Store, tools: ToolSurface, compaction_threshold: u64) -> Self {
        Self { store, tools, compaction_threshold }
    }

    /// Drives exactly one turn to completion (or to an abandoned `Error`
    /// state). Never panics on a recoverable condition — every failure path
    /// either emits an `error` envelope or is absorbed into the agent loop.
    pub async fn handle_frame(
        &self,
        frame: ClientFrame,
        emitter: &dyn EventEmitter,
        summarizer: &dyn history::Summarizer,
        stepper: &dyn AgentStepper,
    ) -> Result<()> {
        // Recv
        if frame.content.trim().is_empty() {
            emitter
                .emit(Envelope::Error { error: "Message content is required".into(), conversation_id: None })
                .await;
            return Ok(());
        }

        // EnsureConversation
        let conversation_id = match self.ensure_conversation(&frame, emitter).await? {
            Some(id) => id,
            None => return Ok(()),
        };

        if let Err(err) = self.run_turn(conversation_id, &frame.content, emitter, summarizer, stepper).await {
            emitter
                .emit(Envelope::Error { error: err.to_string(), conversation_id: Some(conversation_id) })
                .await;
            return Err(err);
        }

        Ok(())
    }

    async fn ensure_conversation(
        &self,
        frame: &ClientFrame,
        emitter: &dyn EventEmitter,
    ) -> Result<Option<i64>> {
        match frame.conversation_id {
            None => {
                let conversation = self.store.insert_conversation(None).await?;
                emitter.emit(Envelope::ConversationCreated { conversation_id: conversation.id }).await;
                Ok(Some(conversation.id))
            }
            Some(id) => match self.store.get_conversation(id).await? {
                Some(conversation) => Ok(Some(conversation.id)),
                None => {
                    emitter
                        .emit(Envelope::Error {
                            error: format!("Conversation {id} not found"),
                            conversation_id: None,
                        })
                        .await;
                    Ok(None)
                }
            },
        }
    }

    async fn run_turn(
        &self,
        conversation_id: i64,
        content: &str,
        emitter: &dyn EventEmitter,
        summarizer: &dyn history::Summarizer,
        stepper: &dyn AgentStepper,
    ) -> Result<()> {
        tracing::info!(conversation_id, "turn started");

        // PersistUser
        let user_message = self.store.insert_message(conversation_id, Role::User, content, None).await?;
        emitter
            .emit(Envelope::Message {
                conversation_id,
                id: user_message.id,
                parts: vec![MessagePart::UserPrompt { content: content.to_string() }],
                role: Role::User,
                created_at: user_message.created_at,
            })
            .await;

        // LoadHistory
        let prior_rows = self.store.list_messages(conversation_id, Some(user_message.id)).await?;
        let mut loaded = history::decode_history(&prior_rows);
        loaded.push(HistoryMessage::Request {
            parts: vec![MessagePart::UserPrompt { content: content.to_string() }],
        });

        // Compact?
        let compacted = history::summarize_if_needed(loaded, self.compaction_threshold, summarizer).await?;

        // StartAgent
        let agent_message = self.store.insert_message(conversation_id, Role::Agent, "", None).await?;
        let mut state = AgentState::new(DEFAULT_SYSTEM_PROMPT, compacted);

        // StepLoop
        let outcome = self
            .step_loop(conversation_id, agent_message.id, &mut state, emitter, stepper)
            .await;

        let (turn_parts, model_name, timestamp, final_output) = outcome?;

        // Finalize
        let payload = history::encode_turn_parts(turn_parts, model_name.clone(), timestamp);
        self.store.update_message(agent_message.id, &final_output, Some(payload)).await?;
        emitter
            .emit(Envelope::MessageComplete {
                conversation_id,
                id: agent_message.id,
                role: Role::Agent,
                model_name,
                timestamp,
                created_at: agent_message.created_at,
            })
            .await;

        tracing::info!(conversation_id, message_id = agent_message.id, "turn finalized");
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn step_loop(
        &self,
        conversation_id: i64,
        agent_message_id: i64,
        state: &mut AgentState,
        emitter: &dyn EventEmitter,
        stepper: &dyn AgentStepper,
    ) -> Result<(Vec<MessagePart>, Option<String>, Option<chrono::DateTime<Utc>>, String)> {
        let mut turn_parts: Vec<MessagePart> = Vec::new();
        let mut latest_model_name = None;
        let mut latest_timestamp = None;
        let mut step_number: u32 = 0;
        let mut tool_failures: u32 = 0;

        loop {
            step_number += 1;
            let step_result = stepper.step(state).await?;

            if step_result.model_name.is_some() {
                latest_model_name = step_result.model_name.clone();
            }
            if step_result.timestamp.is_some() {
                latest_timestamp = step_result.timestamp;
            }

            let mut node = Node::new(step_number);
            node.model_name = step_result.model_name.clone();
            node.timestamp = step_result.timestamp;

            let mut response_parts: Vec<MessagePart> = Vec::new();

            for part in step_result.parts {
                match &part {
                    MessagePart::ToolCall { tool_name, args, tool_call_id } => {
                        turn_parts.push(part.clone());
                        response_parts.push(part.clone());

                        let ctx = ToolCallContext { conversation_id, agent_message_id, emitter };
                        let outcome =
                            dispatch_tool_call(&ctx, &self.tools, tool_name, args, tool_call_id).await;
                        if outcome.failed {
                            tool_failures += 1;
                        }
                        turn_parts.push(outcome.tool_return.clone());
                        response_parts.push(outcome.tool_return);
                    }
                    MessagePart::ToolReturn { .. } => {
                        // The stepper never produces these directly; tool
                        // returns come from dispatch_tool_call above.
                    }
                    non_tool => {
                        turn_parts.push(non_tool.clone());
                        response_parts.push(non_tool.clone());
                        node.parts.push(non_tool.clone());
                    }
                }
            }

            if tool_failures > TOOL_FAILURE_BUDGET {
                tracing::error!(conversation_id, agent_message_id, tool_failures, "tool failure budget exhausted");
                return Err(CoreError::AgentFatal(format!(
                    "exceeded tool failure budget of {TOOL_FAILURE_BUDGET} for this turn"
                )));
            }

            state.push(HistoryMessage::Response { parts: response_parts });

            if node.has_content() {
                emitter
                    .emit(Envelope::NodeAdded { conversation_id, message_id: agent_message_id, node })
                    .await;
            }

            if let Some(final_output) = step_result.done {
                return Ok((turn_parts, latest_model_name, latest_timestamp, final_output));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::RecordingEmitter;
    use crate::history::Summarizer;
    use crate::path_validator::PathValidator;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;

    struct NoopSummarizer;
    #[async_trait::async_trait]
    impl Summarizer for NoopSummarizer {
        async fn summarize(&self, _flattened: &str, _max_tokens: u32) -> Result<String> {
            Ok(String::new())
        }
    }

    /// Replies immediately with a fixed text, never calling a tool.
    struct ImmediateStepper;
    #[async_trait::async_trait]
    impl AgentStepper for ImmediateStepper {
        async fn step(&self, _state: &AgentState) -> Result<crate::model_client::StepResult> {
            Ok(crate::model_client::StepResult {
                parts: vec![MessagePart::Text { content: "hello back".into(), id: None }],
                model_name: Some("stub-model".into()),
                timestamp: Some(Utc::now()),
                done: Some("hello back".into()),
            })
        }
    }

    /// Calls a tool on the first step, then finishes on the second.
    struct ToolThenDoneStepper {
        calls: AtomicU32,
    }
    #[async_trait::async_trait]
    impl AgentStepper for ToolThenDoneStepper {
        async fn step(&self, _state: &AgentState) -> Result<crate::model_client::StepResult> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Ok(crate::model_client::StepResult {
                    parts: vec![MessagePart::ToolCall {
                        tool_name: "get_working_directory".into(),
                        args: serde_json::json!({}),
                        tool_call_id: "tc1".into(),
                    }],
                    model_name: Some("stub-model".into()),
                    timestamp: Some(Utc::now()),
                    done: None,
                })
            } else {
                Ok(crate::model_client::StepResult {
                    parts: vec![MessagePart::Text { content: "done".into(), id: None }],
                    model_name: Some("stub-model".into()),
                    timestamp: Some(Utc::now()),
                    done: Some("done".into()),
                })
            }
        }
    }

    async fn orchestrator(tmp: &std::path::Path) -> Orchestrator {
        let store = Store::connect_in_memory().await.unwrap();
        let tools = ToolSurface::new(PathValidator::new([tmp]).unwrap(), PathBuf::from(tmp));
        Orchestrator::new(store, tools, 100_000)
    }

    #[tokio::test]
    async fn empty_content_emits_error_without_touching_store() {
        let tmp = tempfile::tempdir().unwrap();
        let orch = orchestrator(tmp.path()).await;
        let emitter = RecordingEmitter::new();
        let frame = ClientFrame { content: "   ".into(), conversation_id: None };

        orch.handle_frame(frame, &emitter, &NoopSummarizer, &ImmediateStepper)
            .await
            .unwrap_or_else(|_| ());
        let sent = emitter.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], Envelope::Error { .. }));
    }

    #[tokio::test]
    async fn unknown_conversation_id_emits_error_and_stops() {
        let tmp = tempfile::tempdir().unwrap();
        let orch = orchestrator(tmp.path()).await;
        let emitter = RecordingEmitter::new();
        let frame = ClientFrame { content: "hi".into(), conversation_id: Some(999) };

        orch.handle_frame(frame, &emitter, &NoopSummarizer, &ImmediateStepper).await.unwrap();
        let sent = emitter.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], Envelope::Error { .. }));
    }

    #[tokio::test]
    async fn cold_start_emits_expected_envelope_sequence() {
        let tmp = tempfile::tempdir().unwrap();
        let orch = orchestrator(tmp.path()).await;
        let emitter = RecordingEmitter::new();
        let frame = ClientFrame { content: "hello".into(), conversation_id: None };

        orch.handle_frame(frame, &emitter, &NoopSummarizer, &ImmediateStepper).await.unwrap();

        let sent = emitter.sent.lock().await;
        assert!(matches!(sent[0], Envelope::ConversationCreated { conversation_id: 1 }));
        assert!(matches!(sent[1], Envelope::Message { .. }));
        assert!(matches!(sent.last(), Some(Envelope::MessageComplete { .. })));
    }

    #[tokio::test]
    async fn tool_call_step_emits_tool_start_and_complete_before_message_complete() {
        let tmp = tempfile::tempdir().unwrap();
        let orch = orchestrator(tmp.path()).await;
        let emitter = RecordingEmitter::new();
        let frame = ClientFrame { content: "list cwd".into(), conversation_id: None };
        let stepper = ToolThenDoneStepper { calls: AtomicU32::new(0) };

        orch.handle_frame(frame, &emitter, &NoopSummarizer, &stepper).await.unwrap();

        let sent = emitter.sent.lock().await;
        let kinds: Vec<&str> = sent
            .iter()
            .map(|e| match e {
                Envelope::ConversationCreated { .. } => "conversation_created",
                Envelope::Message { .. } => "message",
                Envelope::ToolStart { .. } => "tool_start",
                Envelope::ToolComplete { .. } => "tool_complete",
                Envelope::NodeAdded { .. } => "node_added",
                Envelope::MessageComplete { .. } => "message_complete",
                _ => "other",
            })
            .collect();

        let start_idx = kinds.iter().position(|k| *k == "tool_start").unwrap();
        let complete_idx = kinds.iter().position(|k| *k == "tool_complete").unwrap();
        let final_idx = kinds.iter().position(|k| *k == "message_complete").unwrap();
        assert!(start_idx < complete_idx);
        assert!(complete_idx < final_idx);
    }
}
