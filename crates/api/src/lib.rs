//! HTTP and websocket layer for jobcast.
//!
//! - **Rooms**: registry of live websocket connections grouped by room
//! - **Fan-out**: policy deciding which rooms receive a notification
//! - **Broadcaster**: relays job outcome notifications into the registry
//! - **Streaming**: `GET /ws/{room_id}` websocket endpoint
//! - **Endpoints**: export submission and health
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod broadcaster;
pub mod endpoints;
pub mod fanout;
pub mod middleware;
pub mod rooms;
pub mod streaming;

use std::path::Path;

use axum::{Router, routing::get};
use tower_http::{services::ServeDir, trace::TraceLayer};

pub use broadcaster::NotificationBroadcaster;
pub use endpoints::router;
pub use fanout::{BroadcastAll, FanoutPolicy, Route};
pub use middleware::AppState;
pub use rooms::{Connection, ConnectionId, FanoutReport, RegistryStats, RoomRegistry};
pub use streaming::streaming_handler;

/// Build the complete application router.
///
/// `/api` carries the JSON endpoints, `/ws/{room_id}` the websocket stream
/// and `/public` the generated artifacts in `public_dir`.
pub fn build_router(state: AppState, public_dir: impl AsRef<Path>) -> Router {
    let api = router().layer(middleware::timeout_layer());

    Router::new()
        .nest("/api", api)
        .route("/ws/{room_id}", get(streaming_handler))
        .nest_service("/public", ServeDir::new(public_dir))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors_layer())
        .with_state(state)
}
