//! Notification broadcaster.
//!
//! Holds the process's one standing subscription to job outcome payloads and
//! hands each of them to the room registry.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::fanout::{BroadcastAll, FanoutPolicy, Route};
use crate::rooms::{FanoutReport, RoomRegistry};

/// Relays notification payloads to websocket rooms.
pub struct NotificationBroadcaster {
    registry: Arc<RoomRegistry>,
    policy: Arc<dyn FanoutPolicy>,
}

impl NotificationBroadcaster {
    /// Create a broadcaster with the given routing policy.
    pub fn new(registry: Arc<RoomRegistry>, policy: Arc<dyn FanoutPolicy>) -> Self {
        Self { registry, policy }
    }

    /// Create a broadcaster that relays to every room.
    #[must_use]
    pub fn broadcast_all(registry: Arc<RoomRegistry>) -> Self {
        Self::new(registry, Arc::new(BroadcastAll))
    }

    /// Route one payload and queue it for its connections.
    pub async fn dispatch(&self, payload: String) -> FanoutReport {
        match self.policy.route(&payload) {
            Route::AllRooms => self.registry.broadcast_all(payload).await,
            Route::Room(room_id) => self.registry.broadcast_to_room(&room_id, payload).await,
            Route::Drop => {
                debug!("Notification dropped by fan-out policy");
                FanoutReport::default()
            }
        }
    }

    /// Relay payloads until the source channel closes.
    pub async fn run(self, mut notifications: broadcast::Receiver<String>) {
        info!("Notification broadcaster started");

        loop {
            match notifications.recv().await {
                Ok(payload) => {
                    let report = self.dispatch(payload).await;
                    debug!(
                        delivered = report.delivered,
                        dropped = report.dropped,
                        removed = report.removed,
                        "Notification relayed"
                    );
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notification broadcaster lagged, notifications lost");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        info!("Notification broadcaster stopped");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::rooms::Connection;
    use std::time::Duration;

    struct OnlyRoom(&'static str);

    impl FanoutPolicy for OnlyRoom {
        fn route(&self, payload: &str) -> Route {
            if payload.is_empty() {
                Route::Drop
            } else {
                Route::Room(self.0.to_string())
            }
        }
    }

    #[tokio::test]
    async fn test_run_relays_to_all_rooms() {
        let registry = Arc::new(RoomRegistry::new());
        let (a, mut rx_a) = Connection::new(4);
        let (b, mut rx_b) = Connection::new(4);
        registry.join("r1", a).await;
        registry.join("r2", b).await;

        let (tx, rx) = broadcast::channel(16);
        let handle = tokio::spawn(NotificationBroadcaster::broadcast_all(registry).run(rx));

        tx.send(r#"{"task_id":"task_1","status":"completed"}"#.to_string())
            .unwrap();

        for rx in [&mut rx_a, &mut rx_b] {
            let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(got.contains("task_1"));
        }

        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_policy_routes_to_single_room() {
        let registry = Arc::new(RoomRegistry::new());
        let (a, mut rx_a) = Connection::new(4);
        let (b, mut rx_b) = Connection::new(4);
        registry.join("r1", a).await;
        registry.join("r2", b).await;

        let broadcaster = NotificationBroadcaster::new(registry, Arc::new(OnlyRoom("r2")));

        let report = broadcaster.dispatch("hi".to_string()).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(&*rx_b.recv().await.unwrap(), "hi");
        assert!(rx_a.try_recv().is_err());

        assert_eq!(
            broadcaster.dispatch(String::new()).await,
            FanoutReport::default()
        );
    }

    #[tokio::test]
    async fn test_lag_does_not_stop_broadcaster() {
        let registry = Arc::new(RoomRegistry::new());
        let (conn, mut conn_rx) = Connection::new(16);
        registry.join("r1", conn).await;

        let (tx, rx) = broadcast::channel(2);
        for i in 0..5 {
            tx.send(format!("old {i}")).unwrap();
        }
        let handle = tokio::spawn(NotificationBroadcaster::broadcast_all(registry).run(rx));

        let first = tokio::time::timeout(Duration::from_secs(1), conn_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&*first, "old 3");

        tx.send("fresh".to_string()).unwrap();
        let mut last = String::new();
        while last != "fresh" {
            last = tokio::time::timeout(Duration::from_secs(1), conn_rx.recv())
                .await
                .unwrap()
                .unwrap()
                .to_string();
        }

        drop(tx);
        handle.await.unwrap();
    }
}
