pub mod config;
pub mod emitter;
pub mod error;
pub mod history;
pub mod model_client;
pub mod orchestrator;
pub mod path_validator;
pub mod tools;

pub use config::Config;
pub use emitter::ChannelEmitter;
pub use emitter::EventEmitter;
pub use error::CoreError;
pub use error::Result;
pub use model_client::AgentStepper;
pub use model_client::AnthropicStepper;
pub use model_client::AnthropicSummarizer;
pub use history::Summarizer;
pub use orchestrator::Orchestrator;
pub use path_validator::PathValidator;
pub use tools::ToolSurface;
