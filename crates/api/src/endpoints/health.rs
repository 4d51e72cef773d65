//! Health check endpoint.

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::middleware::AppState;

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub rooms: usize,
    pub connections: usize,
}

/// Liveness plus current websocket counts.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.rooms.stats().await;
    Json(HealthResponse {
        status: "ok",
        rooms: stats.rooms,
        connections: stats.connections,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health))
}
