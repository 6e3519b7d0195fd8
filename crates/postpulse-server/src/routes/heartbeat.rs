use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use tracing::{debug, warn};

use postpulse_core::event::HeartbeatPayload;

use crate::{error::AppError, geo::extract_client_ip, state::AppState};

/// `POST /api/heartbeat`: refresh a session's presence record.
///
/// When the client sends no location at all and a GeoIP database is loaded,
/// the location is looked up from the forwarded client IP. Storage errors
/// are logged and still acknowledged with `202`.
#[tracing::instrument(skip(state, headers, payload))]
pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<HeartbeatPayload>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;
    let mut input = payload.into_input()?;

    if input.geo.is_empty() {
        if let (Some(geo), Some(ip)) = (state.geo.as_ref(), extract_client_ip(&headers)) {
            if let Some(found) = geo.lookup(&ip) {
                input.geo = found;
            }
        }
    }

    match state.store.heartbeat(&input).await {
        Ok(outcome) => {
            debug!(session_id = %input.session_id, path = %input.current_path, ?outcome, "Heartbeat handled");
        }
        Err(e) => {
            warn!(session_id = %input.session_id, error = %e, "Failed to record heartbeat");
        }
    }

    Ok((StatusCode::ACCEPTED, Json(json!({ "ok": true }))))
}
