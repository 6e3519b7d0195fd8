use anyhow::Result;
use chrono::{DateTime, Utc};
use duckdb::OptionalExt;
use tracing::debug;

use postpulse_core::event::{PageViewEvent, PageViewInput, RecordOutcome};
use postpulse_core::{window_ms, PAGE_VIEW_DEDUP_WINDOW};

use crate::aggregates::{insert_if_absent, Counter};
use crate::backend::to_ms;
use crate::backfill::map_event;
use crate::DuckDbBackend;

impl DuckDbBackend {
    /// Record one page view as of `now`.
    ///
    /// Skipped when the same session viewed the same path less than 30
    /// minutes ago. Otherwise the event row is written first, then the
    /// per-path and total counters, then the unique-visitor counter if this
    /// is the session's first event on any path. All of it commits as one
    /// transaction.
    pub async fn record_page_view_at(
        &self,
        input: &PageViewInput,
        now: DateTime<Utc>,
    ) -> Result<RecordOutcome> {
        let now_ms = to_ms(now);
        let cutoff = now_ms - window_ms(PAGE_VIEW_DEDUP_WINDOW);

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let latest_for_path: Option<i64> = tx
            .prepare_cached(
                "SELECT ts FROM page_views WHERE session_id = ?1 AND path = ?2 \
                 ORDER BY ts DESC LIMIT 1",
            )?
            .query_row(duckdb::params![input.session_id, input.path], |row| {
                row.get(0)
            })
            .optional()?;

        if latest_for_path.is_some_and(|ts| ts > cutoff) {
            debug!(
                session_id = %input.session_id,
                path = %input.path,
                "Page view inside dedup window, skipped"
            );
            return Ok(RecordOutcome::Deduplicated);
        }

        let new_visitor = if latest_for_path.is_some() {
            false
        } else {
            let prior: i64 = tx
                .prepare_cached("SELECT COUNT(*) FROM page_views WHERE session_id = ?1")?
                .query_row(duckdb::params![input.session_id], |row| row.get(0))?;
            prior == 0
        };

        let event = PageViewEvent {
            id: uuid::Uuid::new_v4().to_string(),
            path: input.path.clone(),
            page_type: input.page_type.clone(),
            session_id: input.session_id.clone(),
            timestamp: now_ms,
        };
        tx.execute(
            "INSERT INTO page_views (id, path, page_type, session_id, ts) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            duckdb::params![
                event.id,
                event.path,
                event.page_type,
                event.session_id,
                event.timestamp
            ],
        )?;

        insert_if_absent(&tx, Counter::ViewsByPath, &event)?;
        insert_if_absent(&tx, Counter::TotalViews, &event)?;
        if new_visitor {
            insert_if_absent(&tx, Counter::UniqueVisitors, &event)?;
        }

        tx.commit()?;
        debug!(
            session_id = %event.session_id,
            path = %event.path,
            new_visitor,
            "Page view recorded"
        );
        Ok(RecordOutcome::Recorded { new_visitor })
    }

    /// `true` if the raw log holds at least one event.
    pub async fn has_page_views(&self) -> Result<bool> {
        let conn = self.conn.lock().await;
        let any: Option<String> = conn
            .prepare("SELECT id FROM page_views LIMIT 1")?
            .query_row([], |row| row.get(0))
            .optional()?;
        Ok(any.is_some())
    }

    /// Raw events for one session, oldest first.
    pub async fn page_views_for_session(&self, session_id: &str) -> Result<Vec<PageViewEvent>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, path, page_type, session_id, ts FROM page_views \
             WHERE session_id = ?1 ORDER BY ts, id",
        )?;
        let rows = stmt.query_map(duckdb::params![session_id], map_event)?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }
}
