//! Chunked, resumable population of the aggregate counters from the raw log.
//!
//! The server drives this one chunk at a time through its work queue. Each
//! chunk's counter inserts and the checkpoint row commit together, so the
//! checkpoint never claims progress that was not made.

use anyhow::Result;
use chrono::{DateTime, Utc};
use duckdb::{Connection, OptionalExt};
use tracing::info;

use postpulse_core::analytics::{
    BackfillCheckpoint, BackfillCursor, BackfillProgress, BackfillStatus, BackfillStep,
    SeenSessions,
};
use postpulse_core::event::PageViewEvent;
use postpulse_core::{BACKFILL_CHUNK_SIZE, BACKFILL_SEEN_SESSIONS_CAP};

use crate::aggregates::{insert_if_absent, Counter};
use crate::backend::to_ms;
use crate::DuckDbBackend;

const CHECKPOINT_ID: &str = "current";

impl DuckDbBackend {
    /// Reset the checkpoint to a fresh in-progress run starting at `now`.
    pub async fn begin_backfill_at(&self, now: DateTime<Utc>) -> Result<()> {
        let now_ms = to_ms(now);
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO backfill_checkpoint \
                 (id, status, cursor, processed, unique_sessions, seen_session_ids, \
                  started_at, updated_at, error) \
             VALUES (?1, 'in_progress', NULL, 0, 0, '[]', ?2, ?2, NULL) \
             ON CONFLICT (id) DO UPDATE SET \
                 status = EXCLUDED.status, cursor = EXCLUDED.cursor, \
                 processed = EXCLUDED.processed, unique_sessions = EXCLUDED.unique_sessions, \
                 seen_session_ids = EXCLUDED.seen_session_ids, \
                 started_at = EXCLUDED.started_at, updated_at = EXCLUDED.updated_at, \
                 error = EXCLUDED.error",
            duckdb::params![CHECKPOINT_ID, now_ms],
        )?;
        Ok(())
    }

    /// Process up to [`BACKFILL_CHUNK_SIZE`] events after `step.cursor`.
    ///
    /// Every event goes into the per-path and total counters; a session not
    /// yet in the carried seen set also goes into the unique-visitor counter.
    /// All inserts are idempotent, so replaying a chunk (or the whole log)
    /// never changes the final counts.
    pub async fn backfill_chunk_at(
        &self,
        step: &BackfillStep,
        now: DateTime<Utc>,
    ) -> Result<BackfillProgress> {
        self.backfill_chunk_capped_at(step, BACKFILL_SEEN_SESSIONS_CAP, now)
            .await
    }

    /// [`Self::backfill_chunk_at`] with an explicit bound on the seen-session
    /// ids carried into the next step.
    pub async fn backfill_chunk_capped_at(
        &self,
        step: &BackfillStep,
        seen_cap: usize,
        now: DateTime<Utc>,
    ) -> Result<BackfillProgress> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let mut page = fetch_page(&tx, step.cursor.as_ref(), BACKFILL_CHUNK_SIZE + 1)?;
        let has_more = page.len() > BACKFILL_CHUNK_SIZE;
        page.truncate(BACKFILL_CHUNK_SIZE);

        let mut seen = SeenSessions::from_ids(step.seen_session_ids.clone());
        for event in &page {
            insert_if_absent(&tx, Counter::ViewsByPath, event)?;
            insert_if_absent(&tx, Counter::TotalViews, event)?;
            if seen.insert(&event.session_id) {
                insert_if_absent(&tx, Counter::UniqueVisitors, event)?;
            }
        }

        let processed = step.total_processed + page.len() as u64;
        let unique_sessions = seen.len() as u64;
        let last_cursor = page
            .last()
            .map(|e| BackfillCursor {
                timestamp: e.timestamp,
                id: e.id.clone(),
            })
            .or_else(|| step.cursor.clone());

        let progress = if has_more {
            let carried = seen.carry_forward(seen_cap);
            BackfillProgress {
                status: BackfillStatus::InProgress,
                processed,
                unique_sessions,
                cursor: last_cursor.clone(),
                next: Some(BackfillStep {
                    cursor: last_cursor,
                    total_processed: processed,
                    seen_session_ids: carried,
                }),
            }
        } else {
            BackfillProgress {
                status: BackfillStatus::Complete,
                processed,
                unique_sessions,
                cursor: None,
                next: None,
            }
        };

        let carried_ids = progress
            .next
            .as_ref()
            .map(|n| n.seen_session_ids.as_slice())
            .unwrap_or_default();
        write_checkpoint(&tx, &progress, carried_ids, to_ms(now))?;
        tx.commit()?;

        info!(
            status = progress.status.as_str(),
            processed = progress.processed,
            unique_sessions = progress.unique_sessions,
            chunk = page.len(),
            "Backfill chunk processed"
        );
        Ok(progress)
    }

    /// Mark the current run failed. The chain stops; a new
    /// `begin_backfill` restarts from the beginning of the log.
    pub async fn fail_backfill_at(&self, error: &str, now: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE backfill_checkpoint SET status = 'failed', error = ?2, updated_at = ?3 \
             WHERE id = ?1",
            duckdb::params![CHECKPOINT_ID, error, to_ms(now)],
        )?;
        Ok(())
    }

    pub async fn backfill_status(&self) -> Result<Option<BackfillCheckpoint>> {
        let conn = self.conn.lock().await;
        let row = conn
            .prepare(
                "SELECT status, cursor, processed, unique_sessions, seen_session_ids, \
                        started_at, updated_at, error \
                 FROM backfill_checkpoint WHERE id = ?1",
            )?
            .query_row(duckdb::params![CHECKPOINT_ID], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, Option<String>>(7)?,
                ))
            })
            .optional()?;

        let Some((status, cursor, processed, unique, seen, started_at, updated_at, error)) = row
        else {
            return Ok(None);
        };
        let status = BackfillStatus::parse(&status)
            .ok_or_else(|| anyhow::anyhow!("unknown backfill status '{status}'"))?;
        let seen_session_ids: Vec<String> = serde_json::from_str(&seen)?;

        Ok(Some(BackfillCheckpoint {
            status,
            cursor,
            processed: processed.max(0) as u64,
            unique_sessions: unique.max(0) as u64,
            seen_session_ids,
            started_at,
            updated_at,
            error,
        }))
    }
}

/// Events strictly after `cursor` in `(ts, id)` order.
fn fetch_page(
    conn: &Connection,
    cursor: Option<&BackfillCursor>,
    limit: usize,
) -> Result<Vec<PageViewEvent>> {
    let limit = limit as i64;

    let mut events = Vec::new();
    match cursor {
        None => {
            let mut stmt = conn.prepare(
                "SELECT id, path, page_type, session_id, ts FROM page_views \
                 ORDER BY ts, id LIMIT ?1",
            )?;
            for row in stmt.query_map(duckdb::params![limit], map_event)? {
                events.push(row?);
            }
        }
        Some(c) => {
            let mut stmt = conn.prepare(
                "SELECT id, path, page_type, session_id, ts FROM page_views \
                 WHERE ts > ?1 OR (ts = ?1 AND id > ?2) \
                 ORDER BY ts, id LIMIT ?3",
            )?;
            for row in stmt.query_map(duckdb::params![c.timestamp, c.id, limit], map_event)? {
                events.push(row?);
            }
        }
    }
    Ok(events)
}

pub(crate) fn map_event(row: &duckdb::Row<'_>) -> duckdb::Result<PageViewEvent> {
    Ok(PageViewEvent {
        id: row.get(0)?,
        path: row.get(1)?,
        page_type: row.get(2)?,
        session_id: row.get(3)?,
        timestamp: row.get(4)?,
    })
}

fn write_checkpoint(
    conn: &Connection,
    progress: &BackfillProgress,
    carried_ids: &[String],
    now_ms: i64,
) -> Result<()> {
    let cursor = progress.cursor.as_ref().map(|c| c.to_string());
    let seen = serde_json::to_string(carried_ids)?;
    conn.execute(
        "INSERT INTO backfill_checkpoint \
             (id, status, cursor, processed, unique_sessions, seen_session_ids, \
              started_at, updated_at, error) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, NULL) \
         ON CONFLICT (id) DO UPDATE SET \
             status = EXCLUDED.status, cursor = EXCLUDED.cursor, \
             processed = EXCLUDED.processed, unique_sessions = EXCLUDED.unique_sessions, \
             seen_session_ids = EXCLUDED.seen_session_ids, \
             updated_at = EXCLUDED.updated_at, error = NULL",
        duckdb::params![
            CHECKPOINT_ID,
            progress.status.as_str(),
            cursor,
            progress.processed as i64,
            progress.unique_sessions as i64,
            seen,
            now_ms
        ],
    )?;
    Ok(())
}
