//! Envelopes and sends typed events over the duplex channel (§4.6).
//!
//! The orchestrator depends on the [`EventEmitter`] trait, never on a
//! concrete transport, so a turn can be driven end to end in a test against
//! an in-memory sink (design note §9: pass context explicitly).

use agentcore_protocol::Envelope;
use async_trait::async_trait;

#[async_trait]
pub trait EventEmitter: Send + Sync {
    /// Sends one envelope. Atomic from the caller's perspective — a
    /// caller never observes a partially written envelope. Never blocks on
    /// anything beyond the underlying channel's own flow control.
    async fn emit(&self, envelope: Envelope);
}

/// Emits onto a bounded `tokio::sync::mpsc` channel feeding the connection's
/// writer task (mirrors the outgoing channel in a stdio reader/processor/
/// writer split, adapted to a duplex socket).
pub struct ChannelEmitter {
    sender: tokio::sync::mpsc::Sender<Envelope>,
}

impl ChannelEmitter {
    pub fn new(sender: tokio::sync::mpsc::Sender<Envelope>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl EventEmitter for ChannelEmitter {
    async fn emit(&self, envelope: Envelope) {
        if self.sender.send(envelope).await.is_err() {
            tracing::debug!("emit: receiver gone, dropping envelope");
        }
    }
}

#[cfg(test)]
pub struct RecordingEmitter {
    pub sent: tokio::sync::Mutex<Vec<Envelope>>,
}

#[cfg(test)]
impl RecordingEmitter {
    pub fn new() -> Self {
        Self { sent: tokio::sync::Mutex::new(Vec::new()) }
    }
}

#[cfg(test)]
#[async_trait]
impl EventEmitter for RecordingEmitter {
    async fn emit(&self, envelope: Envelope) {
        self.sent.lock().await.push(envelope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_emitter_forwards_to_receiver() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let emitter = ChannelEmitter::new(tx);
        emitter.emit(Envelope::ConversationCreated { conversation_id: 1 }).await;
        let received = rx.recv().await.unwrap();
        assert!(matches!(received, Envelope::ConversationCreated { conversation_id: 1 }));
    }

    #[tokio::test]
    async fn channel_emitter_does_not_panic_when_receiver_dropped() {
        let (tx, rx) = tokio::sync::mpsc::channel(8);
        drop(rx);
        let emitter = ChannelEmitter::new(tx);
        emitter.emit(Envelope::ConversationCreated { conversation_id: 1 }).await;
    }

    #[tokio::test]
    async fn recording_emitter_captures_envelopes_in_order() {
        let emitter = RecordingEmitter::new();
        emitter.emit(Envelope::ConversationCreated { conversation_id: 1 }).await;
        emitter.emit(Envelope::Error { error: "boom".into(), conversation_id: Some(1) }).await;
        let sent = emitter.sent.lock().await;
        assert_eq!(sent.len(), 2);
    }
}
