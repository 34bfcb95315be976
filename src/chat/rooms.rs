use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

/// Identifies one live socket for the duration of its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Volatile map of conversation id to the sockets currently watching it.
/// Holds no history; delivery targets whoever is present right now.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<Uuid, HashMap<ConnectionId, mpsc::UnboundedSender<String>>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the connection to the room. Joining twice is a no-op.
    pub async fn join(
        &self,
        conversation_id: Uuid,
        connection_id: ConnectionId,
        queue: mpsc::UnboundedSender<String>,
    ) {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(conversation_id)
            .or_default()
            .insert(connection_id, queue);
        tracing::debug!(%connection_id, %conversation_id, "joined room");
    }

    pub async fn leave(&self, conversation_id: Uuid, connection_id: ConnectionId) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(&conversation_id) {
            members.remove(&connection_id);
            if members.is_empty() {
                rooms.remove(&conversation_id);
            }
        }
        tracing::debug!(%connection_id, %conversation_id, "left room");
    }

    /// Removes the connection from every room it joined. Called when the
    /// socket closes, however it closed.
    pub async fn leave_all(&self, connection_id: ConnectionId) {
        let mut rooms = self.rooms.write().await;
        rooms.retain(|_, members| {
            members.remove(&connection_id);
            !members.is_empty()
        });
    }

    /// Queues the payload on every member of the room and returns how many
    /// accepted it. Members whose socket is gone are dropped from the room;
    /// nobody else's delivery is affected.
    pub async fn broadcast(&self, conversation_id: Uuid, payload: &str) -> usize {
        let mut stale = Vec::new();
        let mut delivered = 0;

        {
            let rooms = self.rooms.read().await;
            let Some(members) = rooms.get(&conversation_id) else {
                return 0;
            };
            for (connection_id, queue) in members {
                if queue.send(payload.to_owned()).is_ok() {
                    delivered += 1;
                } else {
                    stale.push(*connection_id);
                }
            }
        }

        if !stale.is_empty() {
            let mut rooms = self.rooms.write().await;
            if let Some(members) = rooms.get_mut(&conversation_id) {
                for connection_id in &stale {
                    members.remove(connection_id);
                    tracing::debug!(%connection_id, %conversation_id, "pruned dead connection");
                }
                if members.is_empty() {
                    rooms.remove(&conversation_id);
                }
            }
        }

        delivered
    }

    pub async fn member_count(&self, conversation_id: Uuid) -> usize {
        self.rooms
            .read()
            .await
            .get(&conversation_id)
            .map_or(0, HashMap::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member() -> (
        ConnectionId,
        mpsc::UnboundedSender<String>,
        mpsc::UnboundedReceiver<String>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionId::new(), tx, rx)
    }

    #[tokio::test]
    async fn broadcast_reaches_every_member() {
        let registry = RoomRegistry::new();
        let room = Uuid::now_v7();
        let (id_a, tx_a, mut rx_a) = member();
        let (id_b, tx_b, mut rx_b) = member();

        registry.join(room, id_a, tx_a).await;
        registry.join(room, id_b, tx_b).await;

        let delivered = registry.broadcast(room, "hello").await;
        assert_eq!(delivered, 2);
        assert_eq!(rx_a.recv().await.unwrap(), "hello");
        assert_eq!(rx_b.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn join_is_idempotent() {
        let registry = RoomRegistry::new();
        let room = Uuid::now_v7();
        let (id, tx, mut rx) = member();

        registry.join(room, id, tx.clone()).await;
        registry.join(room, id, tx).await;
        assert_eq!(registry.member_count(room).await, 1);

        registry.broadcast(room, "once").await;
        assert_eq!(rx.recv().await.unwrap(), "once");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn rooms_are_isolated() {
        let registry = RoomRegistry::new();
        let (room_x, room_y) = (Uuid::now_v7(), Uuid::now_v7());
        let (id_x, tx_x, mut rx_x) = member();
        let (id_y, tx_y, mut rx_y) = member();

        registry.join(room_x, id_x, tx_x).await;
        registry.join(room_y, id_y, tx_y).await;

        assert_eq!(registry.broadcast(room_x, "for x").await, 1);
        assert_eq!(rx_x.recv().await.unwrap(), "for x");
        assert!(rx_y.try_recv().is_err());
    }

    #[tokio::test]
    async fn leave_stops_delivery_and_empties_room() {
        let registry = RoomRegistry::new();
        let room = Uuid::now_v7();
        let (id, tx, mut rx) = member();

        registry.join(room, id, tx).await;
        registry.leave(room, id).await;

        assert_eq!(registry.broadcast(room, "gone").await, 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(registry.member_count(room).await, 0);
    }

    #[tokio::test]
    async fn dead_connections_are_pruned() {
        let registry = RoomRegistry::new();
        let room = Uuid::now_v7();
        let (id_dead, tx_dead, rx_dead) = member();
        let (id_live, tx_live, mut rx_live) = member();

        registry.join(room, id_dead, tx_dead).await;
        registry.join(room, id_live, tx_live).await;
        drop(rx_dead);

        let delivered = registry.broadcast(room, "still flows").await;
        assert_eq!(delivered, 1);
        assert_eq!(rx_live.recv().await.unwrap(), "still flows");
        assert_eq!(registry.member_count(room).await, 1);
    }

    #[tokio::test]
    async fn leave_all_clears_every_room() {
        let registry = RoomRegistry::new();
        let (room_x, room_y) = (Uuid::now_v7(), Uuid::now_v7());
        let (id, tx, _rx) = member();

        registry.join(room_x, id, tx.clone()).await;
        registry.join(room_y, id, tx).await;
        registry.leave_all(id).await;

        assert_eq!(registry.member_count(room_x).await, 0);
        assert_eq!(registry.member_count(room_y).await, 0);
    }

    #[tokio::test]
    async fn broadcast_to_unknown_room_is_silent() {
        let registry = RoomRegistry::new();
        assert_eq!(registry.broadcast(Uuid::now_v7(), "anyone?").await, 0);
    }
}
