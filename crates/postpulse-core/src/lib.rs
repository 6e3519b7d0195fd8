pub mod analytics;
pub mod config;
pub mod content;
pub mod error;
pub mod event;
pub mod visitor;

use std::time::Duration;

/// A repeat view of the same path by the same session inside this window is
/// not recorded again.
pub const PAGE_VIEW_DEDUP_WINDOW: Duration = Duration::from_secs(30 * 60);

/// Heartbeats arriving this soon after the stored `last_seen` are dropped so
/// several tabs of one session never race to patch the same row.
pub const HEARTBEAT_DEDUP_WINDOW: Duration = Duration::from_secs(20);

/// A session with no heartbeat for this long is no longer active and is
/// removed by the stale-session sweep.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// Number of raw events processed per backfill chunk.
pub const BACKFILL_CHUNK_SIZE: usize = 500;

/// Upper bound on the seen-session ids carried from one backfill chunk to
/// the next.
pub const BACKFILL_SEEN_SESSIONS_CAP: usize = 10_000;

/// Convert a window constant to whole milliseconds for timestamp arithmetic.
pub fn window_ms(window: Duration) -> i64 {
    i64::try_from(window.as_millis()).unwrap_or(i64::MAX)
}
