//! Backfill work queue.
//!
//! Each queued [`BackfillStep`] is one chunk. The worker runs it, and while
//! the run is still in progress queues the step that follows, so a long
//! backfill never holds the database lock for more than one chunk at a time
//! and live traffic interleaves between chunks.
//!
//! Steps carry the run they were queued for. Starting a new run supersedes
//! the old one, and its leftover steps are dropped instead of racing the new
//! chain for the checkpoint row.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use postpulse_core::analytics::{BackfillStatus, BackfillStep};

use crate::state::{AppState, BackfillJob};

pub const NOTHING_TO_BACKFILL: &str = "No page views to backfill";
pub const BACKFILL_STARTED: &str = "Backfill started";

/// Reset the checkpoint and queue the first chunk of a fresh run.
///
/// Any run still queued is superseded.
pub async fn start_backfill(state: &AppState) -> anyhow::Result<&'static str> {
    if !state.store.has_page_views().await? {
        info!("Backfill requested on an empty event log");
        return Ok(NOTHING_TO_BACKFILL);
    }
    let run = state.next_backfill_run();
    state.store.begin_backfill().await?;
    state.enqueue_backfill_job(BackfillJob {
        run,
        step: BackfillStep::from_start(),
    })?;
    info!(run, "Backfill started");
    Ok(BACKFILL_STARTED)
}

/// Re-queue a run a previous process left `in_progress`.
///
/// Returns whether a step was queued.
pub async fn resume_backfill(state: &AppState) -> anyhow::Result<bool> {
    let Some(checkpoint) = state.store.backfill_status().await? else {
        return Ok(false);
    };
    let Some(step) = checkpoint.resume_step()? else {
        return Ok(false);
    };
    info!(
        processed = step.total_processed,
        cursor = ?checkpoint.cursor,
        "Resuming interrupted backfill"
    );
    state.enqueue_backfill(step)?;
    Ok(true)
}

/// Run queued backfill chunks until the queue closes.
///
/// A failed chunk marks the checkpoint `failed` and ends that run; it is not
/// retried. Only the first call takes the queue; later calls return at once.
pub async fn run_backfill_worker(state: Arc<AppState>) {
    let Some(mut rx) = state.take_backfill_receiver().await else {
        warn!("Backfill worker already running");
        return;
    };
    info!("Backfill worker started");

    while let Some(BackfillJob { run, step }) = rx.recv().await {
        if run != state.current_backfill_run() {
            debug!(run, "Dropping step of a superseded backfill run");
            continue;
        }
        match state.store.backfill_chunk(&step).await {
            Ok(progress) => {
                if let Some(next) = progress.next {
                    if let Err(e) = state.enqueue_backfill_job(BackfillJob { run, step: next }) {
                        error!(error = %e, "Failed to queue next backfill chunk");
                    }
                } else if progress.status == BackfillStatus::Complete {
                    info!(
                        processed = progress.processed,
                        unique_sessions = progress.unique_sessions,
                        "Backfill complete"
                    );
                }
            }
            Err(e) => {
                error!(error = %e, processed = step.total_processed, "Backfill chunk failed");
                if run != state.current_backfill_run() {
                    continue;
                }
                if let Err(mark) = state.store.fail_backfill(&e.to_string()).await {
                    error!(error = %mark, "Failed to record backfill failure");
                }
            }
        }
    }
}
