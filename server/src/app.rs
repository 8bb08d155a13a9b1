//! Shared, process-wide application state handed to every axum handler.

use std::sync::Arc;

use agentcore_core::AgentStepper;
use agentcore_core::Orchestrator;
use agentcore_core::Summarizer;
use agentcore_storage::Store;

use crate::connection_manager::ConnectionManager;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub connections: Arc<ConnectionManager>,
    pub store: Store,
    pub summarizer: Arc<dyn Summarizer>,
    pub stepper: Arc<dyn AgentStepper>,
}
