//! Dispatches a single `tool-call` part against the tool surface, emitting
//! `tool_start`/`tool_complete` itself (§4.7: these envelopes are produced
//! by the tool wrappers, not the orchestrator's generic step loop).
//!
//! Every branch here catches all failures and still returns a
//! `tool-return` part — the `tool_start` ≺ `tool_complete` pairing
//! invariant (§5) must hold even on error.

use agentcore_protocol::encode_tool_return_content;
use agentcore_protocol::Envelope;
use agentcore_protocol::MessagePart;
use agentcore_protocol::Role;
use agentcore_protocol::ToolStatus;
use serde_json::Value;

use crate::emitter::EventEmitter;
use crate::error::CoreError;
use crate::tools::ToolSurface;

pub struct ToolCallContext<'a> {
    pub conversation_id: i64,
    pub agent_message_id: i64,
    pub emitter: &'a dyn EventEmitter,
}

/// Outcome of dispatching one tool call, used by the orchestrator to decide
/// whether this counts against the turn's failure budget (§4.7 retry note).
pub struct DispatchOutcome {
    pub tool_return: MessagePart,
    pub failed: bool,
}

pub async fn dispatch_tool_call(
    ctx: &ToolCallContext<'_>,
    tools: &ToolSurface,
    tool_name: &str,
    args: &Value,
    tool_call_id: &str,
) -> DispatchOutcome {
    tracing::debug!(
        conversation_id = ctx.conversation_id,
        message_id = ctx.agent_message_id,
        tool_name,
        tool_call_id,
        "dispatching tool call"
    );

    ctx.emitter
        .emit(Envelope::ToolStart {
            conversation_id: ctx.conversation_id,
            message_id: ctx.agent_message_id,
            tool_name: tool_name.to_string(),
            args: args.clone(),
        })
        .await;

    let result = run_tool(tools, tool_name, args).await;

    let (status, error_message, result_value) = match &result {
        Ok(value) => (ToolStatus::Success, None, value.clone()),
        Err(err) => (ToolStatus::Error, Some(err.to_string()), Value::String(err.to_string())),
    };

    ctx.emitter
        .emit(Envelope::ToolComplete {
            conversation_id: ctx.conversation_id,
            message_id: ctx.agent_message_id,
            tool_name: tool_name.to_string(),
            result: result_value.clone(),
            status,
            error_message,
        })
        .await;

    let content = encode_tool_return_content(&result_value);
    let tool_return = MessagePart::ToolReturn {
        tool_name: tool_name.to_string(),
        content,
        tool_call_id: tool_call_id.to_string(),
    };

    DispatchOutcome { tool_return, failed: result.is_err() }
}

async fn run_tool(tools: &ToolSurface, tool_name: &str, args: &Value) -> crate::error::Result<Value> {
    match tool_name {
        "read_file" => {
            let path = str_arg(args, "path")?;
            let start = usize_opt(args, "start_line");
            let end = usize_opt(args, "end_line");
            tools.read_file(&path, start, end).await
        }
        "write_file" => {
            let path = str_arg(args, "path")?;
            let content = str_arg(args, "content")?;
            let create_dirs = bool_arg(args, "create_dirs", true);
            tools.write_file(&path, &content, create_dirs).await
        }
        "edit_file" => {
            let path = str_arg(args, "path")?;
            let old = str_arg(args, "old")?;
            let new = str_arg(args, "new")?;
            tools.edit_file(&path, &old, &new).await
        }
        "list_files" => {
            let directory = str_arg(args, "directory")?;
            let pattern = args.get("pattern").and_then(Value::as_str);
            let recursive = bool_arg(args, "recursive", false);
            let include_dirs = bool_arg(args, "include_dirs", false);
            let exclude_patterns = args.get("exclude_patterns").and_then(|v| {
                v.as_array().map(|a| a.iter().filter_map(|x| x.as_str().map(String::from)).collect())
            });
            let respect_gitignore = bool_arg(args, "respect_gitignore", true);
            tools
                .list_files(&directory, pattern, recursive, include_dirs, exclude_patterns, respect_gitignore)
                .await
        }
        "search_in_files" => {
            let pattern = str_arg(args, "pattern")?;
            let directory = str_arg(args, "directory")?;
            let file_pattern = str_arg(args, "file_pattern")?;
            tools.search_in_files(&pattern, &directory, &file_pattern).await
        }
        "run_command" => {
            let command = str_arg(args, "command")?;
            let cwd = args.get("cwd").and_then(Value::as_str);
            let timeout = args
                .get("timeout")
                .and_then(Value::as_u64)
                .map(std::time::Duration::from_secs);
            tools.run_command(&command, cwd, timeout).await
        }
        "run_git_command" => {
            let git_command = str_arg(args, "git_command")?;
            let cwd = args.get("cwd").and_then(Value::as_str);
            tools.run_git_command(&git_command, cwd).await
        }
        "run_tests" => {
            let test_path = args.get("test_path").and_then(Value::as_str);
            let cwd = args.get("cwd").and_then(Value::as_str);
            let verbose = bool_arg(args, "verbose", true);
            tools.run_tests(test_path, cwd, verbose).await
        }
        "start_background_process" => {
            let command = str_arg(args, "command")?;
            let process_id = str_arg(args, "process_id")?;
            let cwd = args.get("cwd").and_then(Value::as_str);
            tools.start_background_process(&command, &process_id, cwd).await
        }
        "stop_background_process" => {
            let process_id = str_arg(args, "process_id")?;
            tools.stop_background_process(&process_id).await
        }
        "list_background_processes" => tools.list_background_processes().await,
        "get_working_directory" => tools.get_working_directory().await,
        "file_exists" => {
            let path = str_arg(args, "path")?;
            tools.file_exists(&path).await
        }
        other => Err(CoreError::ToolFailure(format!("unknown tool: {other}"))),
    }
}

fn str_arg(args: &Value, name: &str) -> crate::error::Result<String> {
    args.get(name)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| CoreError::ToolFailure(format!("missing required argument '{name}'")))
}

fn bool_arg(args: &Value, name: &str, default: bool) -> bool {
    args.get(name).and_then(Value::as_bool).unwrap_or(default)
}

fn usize_opt(args: &Value, name: &str) -> Option<usize> {
    args.get(name).and_then(Value::as_u64).map(|v| v as usize)
}

/// The role attached to `tool_start`/`tool_complete` envelopes is always
/// the agent's — tool calls never originate from the user.
pub const TOOL_EMIT_ROLE: Role = Role::Agent;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::RecordingEmitter;
    use crate::path_validator::PathValidator;
    use std::path::PathBuf;

    #[tokio::test]
    async fn unknown_tool_emits_error_tool_complete_but_does_not_panic() {
        let tmp = tempfile::tempdir().unwrap();
        let tools = ToolSurface::new(PathValidator::new([tmp.path()]).unwrap(), PathBuf::from(tmp.path()));
        let emitter = RecordingEmitter::new();
        let ctx = ToolCallContext { conversation_id: 1, agent_message_id: 2, emitter: &emitter };

        let outcome = dispatch_tool_call(&ctx, &tools, "not_a_real_tool", &serde_json::json!({}), "tc1").await;
        assert!(outcome.failed);
        match outcome.tool_return {
            MessagePart::ToolReturn { tool_call_id, .. } => assert_eq!(tool_call_id, "tc1"),
            other => panic!("expected tool-return, got {other:?}"),
        }

        let sent = emitter.sent.lock().await;
        assert_eq!(sent.len(), 2);
    }

    #[tokio::test]
    async fn successful_tool_call_pairs_start_and_complete() {
        let tmp = tempfile::tempdir().unwrap();
        let tools = ToolSurface::new(PathValidator::new([tmp.path()]).unwrap(), PathBuf::from(tmp.path()));
        let emitter = RecordingEmitter::new();
        let ctx = ToolCallContext { conversation_id: 1, agent_message_id: 2, emitter: &emitter };

        let args = serde_json::json!({"path": "a.txt", "content": "hi"});
        let outcome = dispatch_tool_call(&ctx, &tools, "write_file", &args, "tc2").await;
        assert!(!outcome.failed);
    }
}
