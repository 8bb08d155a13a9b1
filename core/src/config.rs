//! Process-wide configuration loaded once from the environment (§4.10).
//!
//! Unlike the CLI this crate was adapted from, there is no on-disk
//! `config.toml` or profile layering here — a server process has one
//! identity for its whole lifetime, so configuration is env-only.

use std::path::PathBuf;

use crate::error::CoreError;

const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const DEFAULT_COMPACTION_THRESHOLD: u64 = 100_000;
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8787";

/// Application configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// The single directory tree within which all tool I/O is permitted.
    pub sandbox_root: PathBuf,

    /// Additional roots the path validator accepts besides `sandbox_root`.
    pub extra_allowed_roots: Vec<PathBuf>,

    pub database_url: String,

    pub model_provider_api_key: String,

    pub model: String,

    /// Token-estimate threshold above which history is summarized (§4.5).
    pub compaction_token_threshold: u64,

    pub listen_addr: String,

    /// `tracing_subscriber::EnvFilter` directive, e.g. `"info"` or
    /// `"agentcore_core=debug,info"`.
    pub log_filter: String,
}

impl Config {
    /// Loads from environment variables, optionally reading a `.env` file
    /// first for local development. Required variables missing is a
    /// startup-time fatal error naming the variable.
    pub fn from_env() -> Result<Self, CoreError> {
        let _ = dotenvy::dotenv();

        let sandbox_root = required_var("SANDBOX_ROOT")?;
        let database_url = required_var("DATABASE_URL")?;
        let model_provider_api_key = required_var("MODEL_PROVIDER_API_KEY")?;

        let extra_allowed_roots = std::env::var("EXTRA_ALLOWED_ROOTS")
            .ok()
            .map(|v| {
                v.split(':')
                    .filter(|s| !s.is_empty())
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default();

        let model = std::env::var("MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let compaction_token_threshold = std::env::var("COMPACTION_TOKEN_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_COMPACTION_THRESHOLD);

        let listen_addr =
            std::env::var("LISTEN_ADDR").unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());

        let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            sandbox_root: PathBuf::from(sandbox_root),
            extra_allowed_roots,
            database_url,
            model_provider_api_key,
            model,
            compaction_token_threshold,
            listen_addr,
            log_filter,
        })
    }
}

fn required_var(name: &str) -> Result<String, CoreError> {
    std::env::var(name).map_err(|_| {
        CoreError::AgentFatal(format!("missing required environment variable `{name}`"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_var_names_itself_in_the_error() {
        let err = required_var("DEFINITELY_NOT_SET_ANYWHERE").unwrap_err();
        assert!(err.to_string().contains("DEFINITELY_NOT_SET_ANYWHERE"));
    }
}
