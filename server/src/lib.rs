pub mod app;
pub mod connection_manager;
pub mod routes;
pub mod ws_handler;

use axum::Router;
use axum::routing::delete;
use axum::routing::get;

pub use app::AppState;

/// Builds the full router: the `messaging/ws` duplex endpoint plus the
/// auxiliary CRUD routes of §4.12. Split out of `main` so integration tests
/// can mount it against an in-memory `AppState`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/messaging/ws", get(ws_handler::ws_handler))
        .route("/messaging/conversations", get(routes::list_conversations))
        .route("/messaging/conversations/:id/messages", get(routes::list_messages))
        .route("/messaging/conversations/:id", delete(routes::delete_conversation))
        .route("/health", get(routes::health))
        .with_state(state)
}
