//! Auxiliary HTTP routes (C12, §4.12). These query the store directly and
//! never touch C7 — no agent-loop side effects, no envelopes.

use agentcore_storage::Conversation;
use agentcore_storage::Message;
use axum::Json;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::Value;
use serde_json::json;

use crate::app::AppState;

pub async fn list_conversations(
    State(state): State<AppState>,
) -> Result<Json<Vec<Conversation>>, (StatusCode, Json<Value>)> {
    let conversations = state.store.list_conversations().await.map_err(internal_error)?;
    Ok(Json(conversations))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<i64>,
) -> Result<Json<Vec<Message>>, (StatusCode, Json<Value>)> {
    if state.store.get_conversation(conversation_id).await.map_err(internal_error)?.is_none() {
        return Err(not_found(conversation_id));
    }
    let messages = state.store.list_messages(conversation_id, None).await.map_err(internal_error)?;
    Ok(Json(messages))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<i64>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    let deleted = state.store.delete_conversation(conversation_id).await.map_err(internal_error)?;
    if deleted { Ok(StatusCode::NO_CONTENT) } else { Err(not_found(conversation_id)) }
}

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

fn not_found(conversation_id: i64) -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": format!("conversation {conversation_id} not found")})),
    )
}

fn internal_error(err: agentcore_storage::StorageError) -> (StatusCode, Json<Value>) {
    tracing::error!(error = %err, "auxiliary route failed");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": err.to_string()})))
}
