//! API endpoints.

#![allow(missing_docs)]

mod exports;
mod health;

use axum::Router;

use crate::middleware::AppState;

pub use exports::ExportAccepted;
pub use health::HealthResponse;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/exports", exports::router())
        .nest("/health", health::router())
}
