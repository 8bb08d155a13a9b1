//! Process-wide registry of live duplex sessions (§4.8).
//!
//! Mirrors the background-process registry's `Mutex<HashMap<..>>` shape —
//! the only state this owns is which conversation a connection is currently
//! on, never any per-turn data.

use std::collections::HashMap;

use tokio::sync::Mutex;
use uuid::Uuid;

pub struct ConnectionManager {
    connections: Mutex<HashMap<Uuid, Option<i64>>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self { connections: Mutex::new(HashMap::new()) }
    }

    pub async fn connect(&self, handle: Uuid) {
        self.connections.lock().await.insert(handle, None);
        tracing::info!(connection = %handle, "connection accepted");
    }

    pub async fn disconnect(&self, handle: Uuid) {
        self.connections.lock().await.remove(&handle);
        tracing::info!(connection = %handle, "connection dropped");
    }

    pub async fn set_conversation(&self, handle: Uuid, conversation_id: i64) {
        if let Some(slot) = self.connections.lock().await.get_mut(&handle) {
            *slot = Some(conversation_id);
        }
    }

    pub async fn current_conversation(&self, handle: Uuid) -> Option<i64> {
        self.connections.lock().await.get(&handle).copied().flatten()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_then_disconnect_removes_entry() {
        let manager = ConnectionManager::new();
        let handle = Uuid::new_v4();
        manager.connect(handle).await;
        assert_eq!(manager.len().await, 1);
        manager.disconnect(handle).await;
        assert_eq!(manager.len().await, 0);
    }

    #[tokio::test]
    async fn set_conversation_is_visible_to_current_conversation() {
        let manager = ConnectionManager::new();
        let handle = Uuid::new_v4();
        manager.connect(handle).await;
        assert_eq!(manager.current_conversation(handle).await, None);
        manager.set_conversation(handle, 7).await;
        assert_eq!(manager.current_conversation(handle).await, Some(7));
    }
}
