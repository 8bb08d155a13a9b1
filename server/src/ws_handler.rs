//! The `messaging/ws` duplex endpoint (C9, §4.9, §6).
//!
//! Grounded on the teacher's stdin/processor/stdout split: here the two
//! halves of one `WebSocket` take the place of stdin and stdout, and each
//! accepted connection gets its own task instead of sharing one global
//! reader/writer pair.

use agentcore_core::EventEmitter;
use agentcore_protocol::ClientFrame;
use agentcore_protocol::Envelope;
use async_trait::async_trait;
use axum::extract::ws::Message;
use axum::extract::ws::WebSocket;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::Response;
use futures::SinkExt;
use futures::StreamExt;
use futures::stream::SplitSink;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::app::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Forwards envelopes onto the connection's outgoing half and remembers the
/// most recent `conversation_id` it has seen, so the caller can report it on
/// an uncaught turn error (§4.9) without threading it through separately.
struct WebSocketEmitter {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    last_conversation_id: Mutex<Option<i64>>,
}

#[async_trait]
impl EventEmitter for WebSocketEmitter {
    async fn emit(&self, envelope: Envelope) {
        if let Some(id) = envelope.conversation_id() {
            *self.last_conversation_id.lock().await = Some(id);
        }
        let Ok(json) = serde_json::to_string(&envelope) else {
            tracing::error!("failed to serialize outgoing envelope");
            return;
        };
        if self.sink.lock().await.send(Message::Text(json)).await.is_err() {
            tracing::debug!("emit: websocket sink closed, dropping envelope");
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let handle = Uuid::new_v4();
    state.connections.connect(handle).await;

    let (sink, mut stream) = socket.split();
    let emitter = WebSocketEmitter {
        sink: Mutex::new(sink),
        last_conversation_id: Mutex::new(None),
    };

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                handle_frame_text(&text, &state, &emitter, handle).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {} // ping/pong/binary frames carry no protocol meaning here
            Err(err) => {
                tracing::debug!(connection = %handle, error = %err, "websocket recv error");
                break;
            }
        }
    }

    state.connections.disconnect(handle).await;
}

async fn handle_frame_text(text: &str, state: &AppState, emitter: &WebSocketEmitter, handle: Uuid) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(err) => {
            emitter
                .emit(Envelope::Error {
                    error: format!("invalid frame: {err}"),
                    conversation_id: None,
                })
                .await;
            return;
        }
    };

    let outcome = state
        .orchestrator
        .handle_frame(frame, emitter, state.summarizer.as_ref(), state.stepper.as_ref())
        .await;

    if let Some(conversation_id) = *emitter.last_conversation_id.lock().await {
        state.connections.set_conversation(handle, conversation_id).await;
    }

    // handle_frame already emits an `error` envelope before returning Err;
    // this is purely the operator-facing log line (§4.13).
    if let Err(err) = outcome {
        let conversation_id = state.connections.current_conversation(handle).await;
        tracing::error!(connection = %handle, ?conversation_id, error = %err, "turn aborted");
    }
}
