//! WebSocket streaming API.
//!
//! Every socket runs two loops: a writer task draining the connection's
//! outbound queue into the socket, and a reader loop that only watches for
//! the client going away and answers pings.

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::middleware::AppState;
use crate::rooms::{Connection, ConnectionId, Payload};

/// WebSocket handler for `GET /ws/{room_id}`.
pub async fn streaming_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    debug!(%room_id, "New streaming connection");

    ws.on_upgrade(move |socket| handle_socket(socket, room_id, state))
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, room_id: String, state: AppState) {
    let (sink, stream) = socket.split();

    let (connection, outbound) = Connection::new(state.connection_buffer);
    let connection_id = connection.id();
    state.rooms.join(&room_id, connection).await;

    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let mut writer = tokio::spawn(write_loop(sink, outbound, control_rx, connection_id));

    tokio::select! {
        () = read_loop(stream, control_tx, connection_id) => {}
        _ = &mut writer => {}
    }

    state.rooms.leave(&room_id, connection_id).await;
    writer.abort();

    info!(%room_id, %connection_id, "Streaming connection closed");
}

/// Drain queued notifications and control frames into the socket.
///
/// Ends when the registry drops the connection (after sending a close frame),
/// when the reader goes away, or on the first failed write.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Payload>,
    mut control: mpsc::UnboundedReceiver<Message>,
    connection_id: ConnectionId,
) {
    loop {
        let message = tokio::select! {
            biased;
            frame = control.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            payload = outbound.recv() => match payload {
                Some(payload) => Message::Text(payload.to_string().into()),
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
        };

        if let Err(e) = sink.send(message).await {
            warn!(%connection_id, error = %e, "WebSocket write failed");
            break;
        }
    }
    debug!(%connection_id, "Writer stopped");
}

/// Watch the socket for closure. Client text is ignored.
async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    control: mpsc::UnboundedSender<Message>,
    connection_id: ConnectionId,
) {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Close(_)) => {
                debug!(%connection_id, "Client closed connection");
                break;
            }
            Ok(Message::Ping(data)) => {
                if control.send(Message::Pong(data)).is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                debug!(%connection_id, error = %e, "WebSocket read failed");
                break;
            }
        }
    }
}
