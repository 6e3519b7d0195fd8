use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use postpulse_core::content::ContentEntry;

use crate::{error::AppError, scheduler::backfill::start_backfill, state::AppState};

/// `POST /api/admin/backfill`: start a fresh backfill run.
///
/// Answers immediately; chunks are processed by the background worker.
#[tracing::instrument(skip(state))]
pub async fn start_backfill_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let message = start_backfill(&state).await?;
    Ok(Json(json!({ "data": { "message": message } })))
}

/// `GET /api/admin/backfill`: the checkpoint of the last or current run.
#[tracing::instrument(skip(state))]
pub async fn backfill_status(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let checkpoint = state.store.backfill_status().await?;
    Ok(Json(json!({ "data": checkpoint })))
}

/// `POST /api/admin/cleanup`: run the stale-session sweep now.
#[tracing::instrument(skip(state))]
pub async fn cleanup(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let deleted = state.store.cleanup_stale_sessions().await?;
    info!(deleted, "Manual stale-session sweep");
    Ok(Json(json!({ "data": { "deleted": deleted } })))
}

/// `POST /api/admin/aggregates/reset`: empty all three counters.
///
/// Stats stay correct meanwhile because the reader falls back to direct
/// counts; a backfill brings the counters back.
#[tracing::instrument(skip(state))]
pub async fn reset_aggregates(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    state.store.reset_aggregates().await?;
    info!("Aggregate counters reset");
    Ok(Json(json!({ "data": { "ok": true } })))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentSyncRequest {
    pub entries: Vec<ContentEntry>,
    #[serde(default)]
    pub prune: bool,
}

/// `PUT /api/admin/content`: sync the published content catalog.
#[tracing::instrument(skip(state, payload))]
pub async fn sync_content(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ContentSyncRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload?;
    if req.entries.iter().any(|e| e.slug.trim().is_empty()) {
        return Err(AppError::BadRequest {
            message: "slug must not be empty".to_string(),
            field: Some("slug"),
        });
    }
    let synced = state.store.sync_content(&req.entries, req.prune).await?;
    Ok(Json(json!({ "data": { "synced": synced } })))
}
