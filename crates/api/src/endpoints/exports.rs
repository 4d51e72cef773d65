//! Export job submission.

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use chrono::{DateTime, Utc};
use jobcast_common::AppResult;
use jobcast_queue::JobMessage;
use serde::Serialize;
use tracing::info;

use crate::middleware::AppState;

/// Response for an accepted export request.
#[derive(Debug, Serialize)]
pub struct ExportAccepted {
    pub task_id: String,
    pub status: &'static str,
    pub message: &'static str,
    pub time: DateTime<Utc>,
}

/// Queue a new export job.
async fn create_export(
    State(state): State<AppState>,
) -> AppResult<(StatusCode, Json<ExportAccepted>)> {
    let task_id = state.id_gen.generate();
    let job = JobMessage::generate_export(task_id.as_str());

    state.queue.enqueue(&job).await?;

    info!(%task_id, "Export job queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(ExportAccepted {
            task_id,
            status: "processing",
            message: "Export started, the result will be pushed over the websocket",
            time: Utc::now(),
        }),
    ))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(create_export))
}
