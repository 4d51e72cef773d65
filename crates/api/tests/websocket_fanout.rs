//! Websocket fan-out tests.
//!
//! A real server is bound to an ephemeral port and clients connect with
//! `tokio-tungstenite`. Every wait is bounded by a timeout.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use jobcast_api::{AppState, NotificationBroadcaster, RoomRegistry, build_router};
use jobcast_queue::{JobOutcome, MemoryWorkQueue};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DEADLINE: Duration = Duration::from_secs(5);

struct TestServer {
    addr: SocketAddr,
    rooms: Arc<RoomRegistry>,
    notifications: broadcast::Sender<String>,
}

async fn spawn_server(connection_buffer: usize) -> TestServer {
    let rooms = Arc::new(RoomRegistry::new());
    let state = AppState::new(Arc::new(MemoryWorkQueue::new()))
        .with_rooms(rooms.clone())
        .with_connection_buffer(connection_buffer);
    let app = build_router(state, std::env::temp_dir());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let (notifications, rx) = broadcast::channel(1000);
    tokio::spawn(NotificationBroadcaster::broadcast_all(rooms.clone()).run(rx));

    TestServer {
        addr,
        rooms,
        notifications,
    }
}

async fn connect(addr: SocketAddr, room: &str) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}/ws/{room}")).await.unwrap();
    client
}

async fn wait_for_connections(rooms: &RoomRegistry, expected: usize) {
    tokio::time::timeout(DEADLINE, async {
        while rooms.stats().await.connections != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("registry never reached the expected connection count");
}

async fn next_text(client: &mut Client) -> String {
    loop {
        let message = tokio::time::timeout(DEADLINE, client.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = message {
            return text.to_string();
        }
    }
}

#[tokio::test]
async fn test_outcome_reaches_every_room() {
    let server = spawn_server(64).await;
    let mut a = connect(server.addr, "r1").await;
    let mut b = connect(server.addr, "r1").await;
    let mut c = connect(server.addr, "r2").await;
    wait_for_connections(&server.rooms, 3).await;

    let payload =
        serde_json::to_string(&JobOutcome::completed("task_1", "export_1.xlsx")).unwrap();
    server.notifications.send(payload).unwrap();

    for client in [&mut a, &mut b, &mut c] {
        let received: serde_json::Value = serde_json::from_str(&next_text(client).await).unwrap();
        assert_eq!(
            received,
            serde_json::json!({
                "task_id": "task_1",
                "status": "completed",
                "artifact_location": "export_1.xlsx",
            })
        );
    }
}

#[tokio::test]
async fn test_room_order_is_publication_order() {
    let server = spawn_server(64).await;
    let mut client = connect(server.addr, "r1").await;
    wait_for_connections(&server.rooms, 1).await;

    for i in 0..10 {
        server.notifications.send(format!("n{i}")).unwrap();
    }

    for i in 0..10 {
        assert_eq!(next_text(&mut client).await, format!("n{i}"));
    }
}

#[tokio::test]
async fn test_disconnect_leaves_room() {
    let server = spawn_server(64).await;
    let mut stays = connect(server.addr, "r1").await;
    let mut goes = connect(server.addr, "r1").await;
    wait_for_connections(&server.rooms, 2).await;

    goes.close(None).await.unwrap();
    wait_for_connections(&server.rooms, 1).await;

    server.notifications.send("after".to_string()).unwrap();
    assert_eq!(next_text(&mut stays).await, "after");
    assert_eq!(server.rooms.stats().await.rooms, 1);
}

#[tokio::test]
async fn test_dropped_socket_leaves_room() {
    let server = spawn_server(64).await;
    let client = connect(server.addr, "r9").await;
    wait_for_connections(&server.rooms, 1).await;

    drop(client);

    wait_for_connections(&server.rooms, 0).await;
    assert_eq!(server.rooms.stats().await.rooms, 0);
}

#[tokio::test]
async fn test_ping_is_answered() {
    let server = spawn_server(64).await;
    let mut client = connect(server.addr, "r1").await;
    wait_for_connections(&server.rooms, 1).await;

    client.send(Message::Ping(vec![7, 7].into())).await.unwrap();

    let pong = tokio::time::timeout(DEADLINE, async {
        loop {
            if let Message::Pong(data) = client.next().await.unwrap().unwrap() {
                return data;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(&pong[..], &[7, 7]);
}

#[tokio::test]
async fn test_close_all_sends_close_frame() {
    let server = spawn_server(64).await;
    let mut client = connect(server.addr, "r1").await;
    wait_for_connections(&server.rooms, 1).await;

    assert_eq!(server.rooms.close_all().await, 1);

    let closed = tokio::time::timeout(DEADLINE, async {
        while let Some(message) = client.next().await {
            match message {
                Ok(Message::Close(_)) | Err(_) => return true,
                Ok(_) => {}
            }
        }
        true
    })
    .await
    .unwrap();
    assert!(closed);
}

#[tokio::test]
async fn test_stalled_client_does_not_delay_siblings() {
    let server = spawn_server(4).await;
    // Never read from; its socket buffers fill up and its queue overflows.
    let _stalled = connect(server.addr, "r1").await;
    let mut healthy = connect(server.addr, "r2").await;
    wait_for_connections(&server.rooms, 2).await;

    let filler = "x".repeat(64 * 1024);
    for i in 0..200 {
        server.notifications.send(format!("{i}:{filler}")).unwrap();
        let got = next_text(&mut healthy).await;
        assert!(got.starts_with(&format!("{i}:")));
    }

    assert_eq!(server.rooms.stats().await.connections, 2);
}
