use std::sync::Arc;

use agentcore_core::AnthropicStepper;
use agentcore_core::AnthropicSummarizer;
use agentcore_core::Config;
use agentcore_core::Orchestrator;
use agentcore_core::PathValidator;
use agentcore_core::ToolSurface;
use agentcore_server::AppState;
use agentcore_server::build_router;
use agentcore_server::connection_manager::ConnectionManager;
use agentcore_storage::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.log_filter))
        .with_writer(std::io::stdout)
        .init();

    let store = Store::connect(&config.database_url).await?;

    let mut allowed_roots = vec![config.sandbox_root.clone()];
    allowed_roots.extend(config.extra_allowed_roots.iter().cloned());
    let validator = PathValidator::new(allowed_roots)?;
    let tools = ToolSurface::new(validator, config.sandbox_root.clone());

    let stepper = Arc::new(AnthropicStepper::new(
        config.model_provider_api_key.clone(),
        config.model.clone(),
        tool_schemas(),
    ));
    let summarizer = Arc::new(AnthropicSummarizer::new(
        config.model_provider_api_key.clone(),
        config.model.clone(),
    ));

    let orchestrator = Arc::new(Orchestrator::new(store.clone(), tools, config.compaction_token_threshold));
    let connections = Arc::new(ConnectionManager::new());

    let state = AppState { orchestrator, connections, store, summarizer, stepper };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Tool schemas advertised to the model provider, one per name dispatched in
/// `orchestrator::tool_dispatch::run_tool`.
fn tool_schemas() -> Vec<serde_json::Value> {
    use serde_json::json;
    vec![
        json!({
            "name": "read_file",
            "description": "Read a file's contents, optionally restricted to a line range.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "start_line": {"type": "integer"},
                    "end_line": {"type": "integer"}
                },
                "required": ["path"]
            }
        }),
        json!({
            "name": "write_file",
            "description": "Write content to a file, creating parent directories if requested.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "content": {"type": "string"},
                    "create_dirs": {"type": "boolean"}
                },
                "required": ["path", "content"]
            }
        }),
        json!({
            "name": "edit_file",
            "description": "Replace the first occurrence of old content with new content in a file.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "old": {"type": "string"},
                    "new": {"type": "string"}
                },
                "required": ["path", "old", "new"]
            }
        }),
        json!({
            "name": "list_files",
            "description": "List files under a directory, honoring gitignore and exclusion defaults.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "directory": {"type": "string"},
                    "pattern": {"type": "string"},
                    "recursive": {"type": "boolean"},
                    "include_dirs": {"type": "boolean"},
                    "exclude_patterns": {"type": "array", "items": {"type": "string"}},
                    "respect_gitignore": {"type": "boolean"}
                },
                "required": ["directory"]
            }
        }),
        json!({
            "name": "search_in_files",
            "description": "Search for a substring across files matching a glob pattern.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "pattern": {"type": "string"},
                    "directory": {"type": "string"},
                    "file_pattern": {"type": "string"}
                },
                "required": ["pattern", "directory", "file_pattern"]
            }
        }),
        json!({
            "name": "run_command",
            "description": "Run a shell command with an optional working directory and timeout.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "command": {"type": "string"},
                    "cwd": {"type": "string"},
                    "timeout": {"type": "integer"}
                },
                "required": ["command"]
            }
        }),
        json!({
            "name": "run_git_command",
            "description": "Run a git subcommand (without the leading `git`).",
            "input_schema": {
                "type": "object",
                "properties": {
                    "git_command": {"type": "string"},
                    "cwd": {"type": "string"}
                },
                "required": ["git_command"]
            }
        }),
        json!({
            "name": "run_tests",
            "description": "Run pytest, optionally scoped to a test path.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "test_path": {"type": "string"},
                    "cwd": {"type": "string"},
                    "verbose": {"type": "boolean"}
                }
            }
        }),
        json!({
            "name": "start_background_process",
            "description": "Start a long-running process under a caller-chosen process_id.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "command": {"type": "string"},
                    "process_id": {"type": "string"},
                    "cwd": {"type": "string"}
                },
                "required": ["command", "process_id"]
            }
        }),
        json!({
            "name": "stop_background_process",
            "description": "Stop a previously started background process by its process_id.",
            "input_schema": {
                "type": "object",
                "properties": {"process_id": {"type": "string"}},
                "required": ["process_id"]
            }
        }),
        json!({
            "name": "list_background_processes",
            "description": "List all background processes started this session and their status.",
            "input_schema": {"type": "object", "properties": {}}
        }),
        json!({
            "name": "get_working_directory",
            "description": "Return the sandbox root the agent is operating within.",
            "input_schema": {"type": "object", "properties": {}}
        }),
        json!({
            "name": "file_exists",
            "description": "Check whether a path exists within the sandbox.",
            "input_schema": {
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"]
            }
        }),
    ]
}
