// Connection Registry: in-process source of truth for "who is currently
// connected to this process".
//
// Each record owns the connection's outbound channel sender; fan-out code
// pushes onto it and the connection task drains it to the socket. Removing
// a record drops the sender, which closes the channel if the task is gone.

use chrono::{DateTime, Utc};
use collabspace_common::{protocol::ws::ServerEvent, types::Identity};
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// A live connection as seen by the registry.
#[derive(Debug, Clone)]
pub struct Connection {
    pub connection_id: Uuid,
    pub identity: Identity,
    pub connected_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

#[derive(Debug)]
struct ConnectionRecord {
    identity: Identity,
    connected_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
    outbound: mpsc::UnboundedSender<ServerEvent>,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<Uuid, ConnectionRecord>>,
}

impl ConnectionRegistry {
    /// Record a freshly authenticated connection and return its handle.
    pub async fn register(
        &self,
        identity: Identity,
        outbound: mpsc::UnboundedSender<ServerEvent>,
    ) -> Uuid {
        let connection_id = Uuid::new_v4();
        let now = Utc::now();
        let record = ConnectionRecord {
            identity,
            connected_at: now,
            last_activity_at: now,
            outbound,
        };
        self.connections.write().await.insert(connection_id, record);
        connection_id
    }

    /// Refresh the activity clock for keepalive/heartbeat accounting.
    pub async fn touch(&self, connection_id: Uuid) {
        if let Some(record) = self.connections.write().await.get_mut(&connection_id) {
            record.last_activity_at = Utc::now();
        }
    }

    /// Remove a connection. Idempotent: the client-initiated close and the
    /// transport-level disconnect callback may both land here.
    pub async fn unregister(&self, connection_id: Uuid) -> Option<Connection> {
        self.connections.write().await.remove(&connection_id).map(|record| Connection {
            connection_id,
            identity: record.identity,
            connected_at: record.connected_at,
            last_activity_at: record.last_activity_at,
        })
    }

    pub async fn identity_of(&self, connection_id: Uuid) -> Option<Identity> {
        self.connections.read().await.get(&connection_id).map(|r| r.identity.clone())
    }

    /// All connection handles currently owned by a user (multi-tab/device).
    pub async fn connections_of(&self, user_id: Uuid) -> Vec<Uuid> {
        self.connections
            .read()
            .await
            .iter()
            .filter(|(_, record)| record.identity.user_id == user_id)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Outbound senders for every connection of a user, for direct relay.
    pub async fn senders_of_user(
        &self,
        user_id: Uuid,
    ) -> Vec<(Uuid, mpsc::UnboundedSender<ServerEvent>)> {
        self.connections
            .read()
            .await
            .iter()
            .filter(|(_, record)| record.identity.user_id == user_id)
            .map(|(id, record)| (*id, record.outbound.clone()))
            .collect()
    }

    pub async fn sender_of(
        &self,
        connection_id: Uuid,
    ) -> Option<mpsc::UnboundedSender<ServerEvent>> {
        self.connections.read().await.get(&connection_id).map(|r| r.outbound.clone())
    }

    /// Fire-and-forget delivery to one connection. A closed channel is not
    /// an error; the lifecycle sweep will reap the connection.
    pub async fn send_to(&self, connection_id: Uuid, event: ServerEvent) -> bool {
        match self.sender_of(connection_id).await {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collabspace_common::protocol::ws::ServerEvent;

    fn identity(name: &str) -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            display_name: name.into(),
            email: format!("{}@example.com", name.to_lowercase()),
        }
    }

    fn channel() -> (
        mpsc::UnboundedSender<ServerEvent>,
        mpsc::UnboundedReceiver<ServerEvent>,
    ) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn register_and_unregister_round_trip() {
        let registry = ConnectionRegistry::default();
        let alice = identity("Alice");
        let (tx, _rx) = channel();

        let connection_id = registry.register(alice.clone(), tx).await;
        assert_eq!(registry.len().await, 1);

        let removed = registry.unregister(connection_id).await.expect("connection should exist");
        assert_eq!(removed.identity, alice);
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn double_unregister_is_a_noop() {
        let registry = ConnectionRegistry::default();
        let (tx, _rx) = channel();
        let connection_id = registry.register(identity("Alice"), tx).await;

        assert!(registry.unregister(connection_id).await.is_some());
        assert!(registry.unregister(connection_id).await.is_none());
    }

    #[tokio::test]
    async fn connections_of_tracks_multiple_devices() {
        let registry = ConnectionRegistry::default();
        let alice = identity("Alice");
        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();
        let (tx3, _rx3) = channel();

        let laptop = registry.register(alice.clone(), tx1).await;
        let phone = registry.register(alice.clone(), tx2).await;
        registry.register(identity("Bob"), tx3).await;

        let mut connections = registry.connections_of(alice.user_id).await;
        connections.sort();
        let mut expected = vec![laptop, phone];
        expected.sort();
        assert_eq!(connections, expected);

        registry.unregister(laptop).await;
        assert_eq!(registry.connections_of(alice.user_id).await, vec![phone]);
    }

    #[tokio::test]
    async fn touch_advances_activity_clock() {
        let registry = ConnectionRegistry::default();
        let (tx, _rx) = channel();
        let connection_id = registry.register(identity("Alice"), tx).await;

        let before = registry.unregister(connection_id).await.unwrap().last_activity_at;
        let (tx, _rx) = channel();
        let connection_id = registry.register(identity("Alice"), tx).await;
        registry.touch(connection_id).await;
        let after = registry.unregister(connection_id).await.unwrap().last_activity_at;

        assert!(after >= before);
    }

    #[tokio::test]
    async fn send_to_delivers_to_outbound_channel() {
        let registry = ConnectionRegistry::default();
        let (tx, mut rx) = channel();
        let connection_id = registry.register(identity("Alice"), tx).await;

        let delivered = registry
            .send_to(
                connection_id,
                ServerEvent::Error { code: "VALIDATION_FAILED".into(), message: "x".into() },
            )
            .await;

        assert!(delivered);
        assert!(matches!(rx.recv().await, Some(ServerEvent::Error { .. })));
    }

    #[tokio::test]
    async fn send_to_unknown_connection_reports_false() {
        let registry = ConnectionRegistry::default();
        assert!(
            !registry
                .send_to(
                    Uuid::new_v4(),
                    ServerEvent::Error { code: "NOT_FOUND".into(), message: "x".into() },
                )
                .await
        );
    }
}
