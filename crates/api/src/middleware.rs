//! Shared application state and HTTP layers.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use jobcast_common::IdGenerator;
use jobcast_queue::WorkQueue;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};

use crate::rooms::RoomRegistry;

/// Default outbound queue capacity per websocket connection.
pub const DEFAULT_CONNECTION_BUFFER: usize = 64;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    /// Producer side of the work queue.
    pub queue: Arc<dyn WorkQueue>,
    /// Live websocket connections by room.
    pub rooms: Arc<RoomRegistry>,
    /// Outbound queue capacity for each new connection.
    pub connection_buffer: usize,
    /// Task id generator.
    pub id_gen: IdGenerator,
}

impl AppState {
    /// Create state with a fresh room registry.
    #[must_use]
    pub fn new(queue: Arc<dyn WorkQueue>) -> Self {
        Self {
            queue,
            rooms: Arc::new(RoomRegistry::new()),
            connection_buffer: DEFAULT_CONNECTION_BUFFER,
            id_gen: IdGenerator::new(),
        }
    }

    /// Use an existing room registry.
    #[must_use]
    pub fn with_rooms(mut self, rooms: Arc<RoomRegistry>) -> Self {
        self.rooms = rooms;
        self
    }

    /// Set the per-connection outbound queue capacity.
    #[must_use]
    pub const fn with_connection_buffer(mut self, buffer: usize) -> Self {
        self.connection_buffer = buffer;
        self
    }
}

/// Permissive CORS for browser clients served from other origins.
#[must_use]
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Request timeout for plain HTTP routes.
///
/// Not applied to websocket routes, whose connections are long-lived.
#[must_use]
pub fn timeout_layer() -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(30))
}
