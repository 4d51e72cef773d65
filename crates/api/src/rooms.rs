//! Room registry for live websocket connections.
//!
//! A registry-level lock guards the room table: membership changes take it
//! exclusively and broadcasts take it shared. Each room has its own lock over
//! its connections, so delivery in one room never waits on another.
//!
//! Broadcasting only enqueues into each connection's bounded outbound queue.
//! The socket write happens in the connection's writer task, never under a
//! registry lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, info, warn};

/// Payload shared by every connection it is delivered to.
pub type Payload = Arc<str>;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Sending half of a connection's outbound queue.
///
/// The receiving half belongs to the connection's writer task. Once the
/// registry drops every `Connection` for an id, the writer sees its queue
/// close and shuts the socket.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    tx: mpsc::Sender<Payload>,
}

impl Connection {
    /// Create a connection with an outbound queue holding `buffer` payloads.
    #[must_use]
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Payload>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                id: ConnectionId::next(),
                tx,
            },
            rx,
        )
    }

    /// Connection identifier.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }
}

/// What happened to a payload offered to a set of connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanoutReport {
    /// Connections the payload was queued for.
    pub delivered: usize,
    /// Connections whose queue was full; the payload was dropped for them.
    pub dropped: usize,
    /// Connections found closed and removed.
    pub removed: usize,
}

impl FanoutReport {
    fn merge(&mut self, other: Self) {
        self.delivered += other.delivered;
        self.dropped += other.dropped;
        self.removed += other.removed;
    }
}

/// Room and connection counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Rooms with at least one connection.
    pub rooms: usize,
    /// Connections across all rooms.
    pub connections: usize,
}

#[derive(Default)]
struct Room {
    connections: Mutex<HashMap<ConnectionId, mpsc::Sender<Payload>>>,
}

impl Room {
    /// Offer `payload` to every connection and drop the closed ones.
    async fn offer(&self, room_id: &str, payload: &Payload) -> FanoutReport {
        let mut report = FanoutReport::default();
        let mut connections = self.connections.lock().await;

        connections.retain(|id, tx| match tx.try_send(Arc::clone(payload)) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(%room_id, connection_id = %id, "Outbound queue full, dropping notification");
                report.dropped += 1;
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!(%room_id, connection_id = %id, "Removing closed connection");
                report.removed += 1;
                false
            }
        });

        report
    }

    async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }
}

/// Registry mapping room ids to their live connections.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
}

impl RoomRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `connection` to `room_id`, creating the room if needed.
    pub async fn join(&self, room_id: &str, connection: Connection) {
        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(room_id.to_string()).or_default();
        room.connections
            .lock()
            .await
            .insert(connection.id, connection.tx);

        info!(%room_id, connection_id = %connection.id, "Connection joined room");
    }

    /// Remove a connection from a room. Removing an absent connection is a
    /// no-op. The room is dropped once its last connection leaves.
    ///
    /// Returns whether the connection was present.
    pub async fn leave(&self, room_id: &str, connection_id: ConnectionId) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get(room_id) else {
            return false;
        };

        let (removed, now_empty) = {
            let mut connections = room.connections.lock().await;
            let removed = connections.remove(&connection_id).is_some();
            (removed, connections.is_empty())
        };

        if now_empty {
            rooms.remove(room_id);
            debug!(%room_id, "Reaped empty room");
        }
        if removed {
            info!(%room_id, %connection_id, "Connection left room");
        }
        removed
    }

    /// Queue `payload` for every connection in `room_id`.
    ///
    /// A missing or empty room is not an error.
    pub async fn broadcast_to_room(
        &self,
        room_id: &str,
        payload: impl Into<Payload>,
    ) -> FanoutReport {
        let payload = payload.into();
        let room = self.rooms.read().await.get(room_id).cloned();
        let Some(room) = room else {
            return FanoutReport::default();
        };

        let report = room.offer(room_id, &payload).await;
        if report.removed > 0 {
            self.reap_empty().await;
        }
        report
    }

    /// Queue `payload` for every connection in every room.
    pub async fn broadcast_all(&self, payload: impl Into<Payload>) -> FanoutReport {
        let payload = payload.into();
        let mut report = FanoutReport::default();

        {
            let rooms = self.rooms.read().await;
            for (room_id, room) in rooms.iter() {
                report.merge(room.offer(room_id, &payload).await);
            }
        }

        if report.removed > 0 {
            self.reap_empty().await;
        }
        report
    }

    /// Drop every connection and room. Each writer task sees its queue close
    /// and closes its socket.
    ///
    /// Returns the number of connections dropped.
    pub async fn close_all(&self) -> usize {
        let rooms: Vec<Arc<Room>> = self.rooms.write().await.drain().map(|(_, r)| r).collect();

        let mut closed = 0;
        for room in rooms {
            let mut connections = room.connections.lock().await;
            closed += connections.len();
            connections.clear();
        }

        info!(connections = closed, "Closed all connections");
        closed
    }

    /// Number of connections in `room_id`.
    pub async fn room_size(&self, room_id: &str) -> usize {
        let room = self.rooms.read().await.get(room_id).cloned();
        match room {
            Some(room) => room.connections.lock().await.len(),
            None => 0,
        }
    }

    /// Current room and connection counts.
    pub async fn stats(&self) -> RegistryStats {
        let rooms = self.rooms.read().await;
        let mut connections = 0;
        for room in rooms.values() {
            connections += room.connections.lock().await.len();
        }
        RegistryStats {
            rooms: rooms.len(),
            connections,
        }
    }

    async fn reap_empty(&self) {
        let mut rooms = self.rooms.write().await;
        let mut empty = Vec::new();
        for (room_id, room) in rooms.iter() {
            if room.is_empty().await {
                empty.push(room_id.clone());
            }
        }
        for room_id in empty {
            rooms.remove(&room_id);
            debug!(%room_id, "Reaped empty room");
        }
    }
}
