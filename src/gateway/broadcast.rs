//! Outbound fan-out seam
//!
//! The playback engine talks to clients only through the `Broadcaster`
//! trait, so the core runs against a mock in tests without a live socket.

use crate::error::{LobbyError, Result};
use crate::gateway::protocol::ServerMessage;
use crate::types::UserId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// Trait for delivering server messages to connections
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Deliver a message to one connection
    async fn send_to(&self, user_id: UserId, message: ServerMessage) -> Result<()>;

    /// Deliver a message to every listed connection
    async fn broadcast(&self, recipients: &[UserId], message: ServerMessage) -> Result<()>;
}

/// WebSocket-backed broadcaster: one unbounded sender of serialized frames
/// per live connection
#[derive(Default)]
pub struct WsBroadcaster {
    peers: Mutex<HashMap<UserId, UnboundedSender<String>>>,
}

impl WsBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbound channel
    pub fn register(&self, user_id: UserId, sender: UnboundedSender<String>) {
        if let Ok(mut peers) = self.peers.lock() {
            peers.insert(user_id, sender);
        }
    }

    /// Drop a connection's outbound channel
    pub fn unregister(&self, user_id: UserId) {
        if let Ok(mut peers) = self.peers.lock() {
            peers.remove(&user_id);
        }
    }

    /// Number of live connections
    pub fn connected_count(&self) -> usize {
        self.peers.lock().map(|peers| peers.len()).unwrap_or(0)
    }

    fn deliver(&self, user_id: UserId, frame: &str) {
        let Ok(peers) = self.peers.lock() else {
            return;
        };
        if let Some(sender) = peers.get(&user_id) {
            // A closed channel means the connection is mid-teardown
            if sender.send(frame.to_string()).is_err() {
                debug!("Dropping frame for disconnecting user {}", user_id);
            }
        }
    }
}

#[async_trait]
impl Broadcaster for WsBroadcaster {
    async fn send_to(&self, user_id: UserId, message: ServerMessage) -> Result<()> {
        let frame = serde_json::to_string(&message).map_err(|e| LobbyError::InternalError {
            message: format!("Failed to serialize server message: {}", e),
        })?;
        self.deliver(user_id, &frame);
        Ok(())
    }

    async fn broadcast(&self, recipients: &[UserId], message: ServerMessage) -> Result<()> {
        let frame = serde_json::to_string(&message).map_err(|e| LobbyError::InternalError {
            message: format!("Failed to serialize server message: {}", e),
        })?;
        for user_id in recipients {
            self.deliver(*user_id, &frame);
        }
        Ok(())
    }
}

/// Recording broadcaster for tests
#[derive(Debug, Default)]
pub struct MockBroadcaster {
    sent: Mutex<Vec<(UserId, ServerMessage)>>,
}

impl MockBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// All deliveries so far, in order
    pub fn sent_messages(&self) -> Vec<(UserId, ServerMessage)> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Deliveries addressed to one user
    pub fn messages_for(&self, user_id: UserId) -> Vec<ServerMessage> {
        self.sent_messages()
            .into_iter()
            .filter(|(to, _)| *to == user_id)
            .map(|(_, msg)| msg)
            .collect()
    }

    /// Count of deliveries with the given wire tag
    pub fn count_of_kind(&self, kind: &str) -> usize {
        self.sent_messages()
            .iter()
            .filter(|(_, msg)| msg.kind() == kind)
            .count()
    }

    /// Most recent `queue_updated` payload delivered to anyone
    pub fn last_queue_update(&self) -> Option<Vec<crate::types::Track>> {
        self.sent_messages()
            .into_iter()
            .rev()
            .find_map(|(_, msg)| match msg {
                ServerMessage::QueueUpdated { queue } => Some(queue),
                _ => None,
            })
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

#[async_trait]
impl Broadcaster for MockBroadcaster {
    async fn send_to(&self, user_id: UserId, message: ServerMessage) -> Result<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((user_id, message));
        }
        Ok(())
    }

    async fn broadcast(&self, recipients: &[UserId], message: ServerMessage) -> Result<()> {
        if let Ok(mut sent) = self.sent.lock() {
            for user_id in recipients {
                sent.push((*user_id, message.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::generate_user_id;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_ws_broadcaster_fan_out() {
        let broadcaster = WsBroadcaster::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let alice = generate_user_id();
        let bob = generate_user_id();

        broadcaster.register(alice, tx_a);
        broadcaster.register(bob, tx_b);
        assert_eq!(broadcaster.connected_count(), 2);

        broadcaster
            .broadcast(&[alice, bob], ServerMessage::QueueUpdated { queue: vec![] })
            .await
            .unwrap();

        let frame = rx_a.try_recv().unwrap();
        assert!(frame.contains("queue_updated"));
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_send_to_unknown_user_is_noop() {
        let broadcaster = WsBroadcaster::new();
        broadcaster
            .send_to(
                generate_user_id(),
                ServerMessage::LobbyError {
                    message: "nope".to_string(),
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unregister_stops_delivery() {
        let broadcaster = WsBroadcaster::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let alice = generate_user_id();

        broadcaster.register(alice, tx);
        broadcaster.unregister(alice);
        assert_eq!(broadcaster.connected_count(), 0);

        broadcaster
            .send_to(alice, ServerMessage::QueueUpdated { queue: vec![] })
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_mock_records_in_order() {
        let mock = MockBroadcaster::new();
        let alice = generate_user_id();

        mock.send_to(alice, ServerMessage::QueueUpdated { queue: vec![] })
            .await
            .unwrap();
        mock.send_to(
            alice,
            ServerMessage::LobbyError {
                message: "x".to_string(),
            },
        )
        .await
        .unwrap();

        assert_eq!(mock.count_of_kind("queue_updated"), 1);
        assert_eq!(mock.messages_for(alice).len(), 2);
    }
}
