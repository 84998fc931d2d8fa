use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use wishlist_types::events::RoomEvent;

struct ConnectionEntry {
    user_id: Uuid,
    tx: mpsc::UnboundedSender<RoomEvent>,
}

/// Room-based fan-out. Each wishlist id is a room; a connection receives the
/// events of every room it has joined. Delivery is best-effort: a connection
/// that is gone when an event is broadcast simply misses it.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// conn_id -> owning user and outbound queue
    connections: RwLock<HashMap<Uuid, ConnectionEntry>>,

    /// wishlist_id -> joined conn_ids
    ///
    /// Lock order: `rooms` before `connections`.
    rooms: RwLock<HashMap<Uuid, HashSet<Uuid>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                connections: RwLock::new(HashMap::new()),
                rooms: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a connection. Returns (conn_id, receiver for its room events).
    pub async fn register(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<RoomEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .connections
            .write()
            .await
            .insert(conn_id, ConnectionEntry { user_id, tx });
        (conn_id, rx)
    }

    /// Drop a connection and remove it from every room it had joined.
    pub async fn unregister(&self, conn_id: Uuid) {
        let mut rooms = self.inner.rooms.write().await;
        rooms.retain(|_, members| {
            members.remove(&conn_id);
            !members.is_empty()
        });
        self.inner.connections.write().await.remove(&conn_id);
    }

    /// Returns false if the connection is not registered.
    pub async fn join(&self, conn_id: Uuid, wishlist_id: Uuid) -> bool {
        let mut rooms = self.inner.rooms.write().await;
        if !self.inner.connections.read().await.contains_key(&conn_id) {
            return false;
        }
        rooms.entry(wishlist_id).or_default().insert(conn_id);
        true
    }

    pub async fn leave(&self, conn_id: Uuid, wishlist_id: Uuid) {
        let mut rooms = self.inner.rooms.write().await;
        if let Some(members) = rooms.get_mut(&wishlist_id) {
            members.remove(&conn_id);
            if members.is_empty() {
                rooms.remove(&wishlist_id);
            }
        }
    }

    pub async fn in_room(&self, conn_id: Uuid, wishlist_id: Uuid) -> bool {
        self.inner
            .rooms
            .read()
            .await
            .get(&wishlist_id)
            .is_some_and(|members| members.contains(&conn_id))
    }

    pub async fn room_size(&self, wishlist_id: Uuid) -> usize {
        self.inner
            .rooms
            .read()
            .await
            .get(&wishlist_id)
            .map_or(0, HashSet::len)
    }

    /// Send an event to every connection in the room. Returns how many
    /// connections accepted it; an empty room is a no-op.
    pub async fn broadcast(&self, wishlist_id: Uuid, event: RoomEvent) -> usize {
        self.fan_out(wishlist_id, event, None).await
    }

    /// Like `broadcast`, skipping the originating connection.
    pub async fn broadcast_except(&self, wishlist_id: Uuid, event: RoomEvent, except: Uuid) -> usize {
        self.fan_out(wishlist_id, event, Some(except)).await
    }

    /// Forget a room entirely, e.g. after its wishlist was deleted.
    pub async fn close_room(&self, wishlist_id: Uuid) {
        self.inner.rooms.write().await.remove(&wishlist_id);
    }

    async fn fan_out(&self, wishlist_id: Uuid, event: RoomEvent, except: Option<Uuid>) -> usize {
        let rooms = self.inner.rooms.read().await;
        let Some(members) = rooms.get(&wishlist_id) else {
            return 0;
        };
        let connections = self.inner.connections.read().await;

        let mut delivered = 0;
        for conn_id in members {
            if Some(*conn_id) == except {
                continue;
            }
            if let Some(entry) = connections.get(conn_id) {
                if entry.tx.send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    debug!("Connection {} of {} already closed", conn_id, entry.user_id);
                }
            }
        }
        delivered
    }
}
