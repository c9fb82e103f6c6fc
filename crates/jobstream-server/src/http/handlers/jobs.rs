//! Request/acknowledge job handler.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde_json::Value;
use tracing::info;

use crate::http::responses::{AckResponse, ApiError};
use crate::state::AppState;

/// Run one job to completion and acknowledge it.
///
/// The response is sent only after the job finishes. The job itself runs on
/// the blocking thread pool, so other requests (health checks included) are
/// still served meanwhile; the pool size bounds how many acknowledge-mode
/// jobs can run at once.
pub async fn train(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<AckResponse>, ApiError> {
    let Json(raw) = body.map_err(|e| ApiError::InvalidJson {
        message: e.body_text(),
    })?;

    let ack = state.service.run_acknowledged(raw).await?;
    info!(
        job_id = %ack.job_id,
        elapsed_ms = ack.elapsed_ms,
        "Job acknowledged"
    );
    Ok(Json(ack.into()))
}
