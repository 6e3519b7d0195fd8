use std::sync::Arc;

use tracing::{debug, error, info};

use crate::state::AppState;

pub mod backfill;

/// One pass of the stale-session sweep. Returns the number of sessions removed.
pub async fn sweep_once(state: &Arc<AppState>) -> anyhow::Result<usize> {
    let deleted = state.store.cleanup_stale_sessions().await?;
    if deleted > 0 {
        info!(deleted, "Stale sessions removed");
    } else {
        debug!("No stale sessions");
    }
    Ok(deleted)
}

/// Sweep stale presence rows every `cleanup_interval_secs`.
///
/// The first tick fires immediately, so sessions left over from before a
/// restart are cleared at startup.
pub async fn run_cleanup_loop(state: Arc<AppState>) {
    let period = state.config.cleanup_interval();
    info!(
        interval_seconds = period.as_secs(),
        "Stale-session sweep started"
    );
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if let Err(err) = sweep_once(&state).await {
            error!(error = %err, "stale-session sweep failed");
        }
    }
}
