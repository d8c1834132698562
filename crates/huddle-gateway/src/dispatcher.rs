use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;

use huddle_types::events::GatewayEvent;

/// Identifies one live WebSocket session. A user may hold several.
pub type ConnId = Uuid;

struct ConnectionHandle {
    user_id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

/// Manages all connected clients, channel rooms and event delivery.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Global events (presence), delivered to every connected client
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Per-connection targeted send channels
    connections: RwLock<HashMap<ConnId, ConnectionHandle>>,

    /// Rooms: channel_id -> connections subscribed to it
    rooms: RwLock<HashMap<Uuid, HashSet<ConnId>>>,
}

/// Returned by [`Dispatcher::register`].
pub struct Registration {
    pub conn_id: ConnId,
    pub rx: mpsc::UnboundedReceiver<GatewayEvent>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                connections: RwLock::new(HashMap::new()),
                rooms: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to global events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to every connected client.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a new connection for `user_id`.
    pub async fn register(&self, user_id: Uuid) -> Registration {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .connections
            .write()
            .await
            .insert(conn_id, ConnectionHandle { user_id, tx });
        Registration { conn_id, rx }
    }

    /// Drop a connection and every room membership it held.
    /// Returns the user it belonged to.
    pub async fn unregister(&self, conn_id: ConnId) -> Option<Uuid> {
        let handle = self.inner.connections.write().await.remove(&conn_id)?;

        let mut rooms = self.inner.rooms.write().await;
        rooms.retain(|_, members| {
            members.remove(&conn_id);
            !members.is_empty()
        });

        Some(handle.user_id)
    }

    /// Admit a connection to a channel room. The caller has already checked
    /// membership. Returns false for unknown connections.
    pub async fn join_room(&self, conn_id: ConnId, channel_id: Uuid) -> bool {
        if !self.inner.connections.read().await.contains_key(&conn_id) {
            return false;
        }
        self.inner
            .rooms
            .write()
            .await
            .entry(channel_id)
            .or_default()
            .insert(conn_id);
        true
    }

    /// Leave a room. Unconditional; returns whether the connection was in it.
    pub async fn leave_room(&self, conn_id: ConnId, channel_id: Uuid) -> bool {
        let mut rooms = self.inner.rooms.write().await;
        let Some(members) = rooms.get_mut(&channel_id) else {
            return false;
        };
        let removed = members.remove(&conn_id);
        if members.is_empty() {
            rooms.remove(&channel_id);
        }
        removed
    }

    pub async fn in_room(&self, conn_id: ConnId, channel_id: Uuid) -> bool {
        self.inner
            .rooms
            .read()
            .await
            .get(&channel_id)
            .is_some_and(|members| members.contains(&conn_id))
    }

    /// Deliver an event to every connection in a channel room, optionally
    /// skipping one. At-most-once: closed receivers are skipped silently.
    /// Returns how many connections it was handed to.
    pub async fn broadcast_to_room(
        &self,
        channel_id: Uuid,
        event: GatewayEvent,
        except: Option<ConnId>,
    ) -> usize {
        let rooms = self.inner.rooms.read().await;
        let Some(members) = rooms.get(&channel_id) else {
            return 0;
        };
        let connections = self.inner.connections.read().await;

        let mut delivered = 0;
        for conn_id in members {
            if Some(*conn_id) == except {
                continue;
            }
            if let Some(handle) = connections.get(conn_id) {
                if handle.tx.send(event.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Send a targeted event to one connection.
    pub async fn send_to_connection(&self, conn_id: ConnId, event: GatewayEvent) -> bool {
        let connections = self.inner.connections.read().await;
        connections
            .get(&conn_id)
            .is_some_and(|handle| handle.tx.send(event).is_ok())
    }

    /// Send a targeted event to every connection of a user.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) -> usize {
        let connections = self.inner.connections.read().await;
        let mut sent = 0;
        for handle in connections.values().filter(|h| h.user_id == user_id) {
            if handle.tx.send(event.clone()).is_ok() {
                sent += 1;
            }
        }
        sent
    }

    /// Remove all of a user's connections from a room, e.g. after they left
    /// the channel. Each evicted connection is told with `RoomLeft`.
    pub async fn evict_user(&self, user_id: Uuid, channel_id: Uuid) -> usize {
        let user_conns: Vec<ConnId> = {
            let connections = self.inner.connections.read().await;
            connections
                .iter()
                .filter(|(_, handle)| handle.user_id == user_id)
                .map(|(conn_id, _)| *conn_id)
                .collect()
        };

        let mut evicted = Vec::new();
        {
            let mut rooms = self.inner.rooms.write().await;
            if let Some(members) = rooms.get_mut(&channel_id) {
                for conn_id in &user_conns {
                    if members.remove(conn_id) {
                        evicted.push(*conn_id);
                    }
                }
                if members.is_empty() {
                    rooms.remove(&channel_id);
                }
            }
        }

        for conn_id in &evicted {
            self.send_to_connection(*conn_id, GatewayEvent::RoomLeft { channel_id })
                .await;
        }
        if !evicted.is_empty() {
            debug!("Evicted {} connections of {} from room {}", evicted.len(), user_id, channel_id);
        }
        evicted.len()
    }

    #[cfg(test)]
    pub(crate) async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }
}
