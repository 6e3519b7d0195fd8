use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use tracing::{debug, warn};

use postpulse_core::event::{RecordOutcome, ViewPayload};

use crate::{error::AppError, state::AppState};

/// `POST /api/views`: record one page view.
///
/// The response is the same `202 {"ok":true}` whether the view was stored,
/// deduplicated, or lost to a storage error; only malformed input is
/// rejected with 400.
#[tracing::instrument(skip(state, payload))]
pub async fn record_view(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ViewPayload>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;
    let input = payload.into_input()?;

    match state.store.record_page_view(&input).await {
        Ok(RecordOutcome::Recorded { new_visitor }) => {
            debug!(session_id = %input.session_id, path = %input.path, new_visitor, "Page view recorded");
        }
        Ok(RecordOutcome::Deduplicated) => {
            debug!(session_id = %input.session_id, path = %input.path, "Page view deduplicated");
        }
        Err(e) => {
            warn!(session_id = %input.session_id, path = %input.path, error = %e, "Failed to record page view");
        }
    }

    Ok((StatusCode::ACCEPTED, Json(json!({ "ok": true }))))
}
