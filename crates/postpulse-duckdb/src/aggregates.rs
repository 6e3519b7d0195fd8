//! Incrementally maintained exact counters over the page-view log.
//!
//! Each counter is a table whose primary key is the dedup identity of one
//! counted unit:
//!
//! | counter        | identity                         |
//! |----------------|----------------------------------|
//! | views by path  | `(path, ts, event id)`           |
//! | total views    | `(ts, event id)`                 |
//! | unique visitors| `session_id`                     |
//!
//! Inserting the same event twice is therefore a no-op, which is what lets
//! live recording and the backfill overlap freely.

use std::collections::HashMap;

use anyhow::Result;
use duckdb::Connection;

use postpulse_core::event::PageViewEvent;

use crate::DuckDbBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    ViewsByPath,
    TotalViews,
    UniqueVisitors,
}

/// Count `event` in `counter` unless it is already counted.
///
/// Returns `true` when a new unit was added. Callers pass either a plain
/// connection or a transaction (which derefs to one).
pub(crate) fn insert_if_absent(
    conn: &Connection,
    counter: Counter,
    event: &PageViewEvent,
) -> Result<bool> {
    let exists: i64 = match counter {
        Counter::ViewsByPath => conn
            .prepare_cached(
                "SELECT COUNT(*) FROM agg_views_by_path \
                 WHERE namespace = ?1 AND sort_key = ?2 AND event_id = ?3",
            )?
            .query_row(
                duckdb::params![event.path, event.timestamp, event.id],
                |row| row.get(0),
            )?,
        Counter::TotalViews => conn
            .prepare_cached(
                "SELECT COUNT(*) FROM agg_total_views WHERE sort_key = ?1 AND event_id = ?2",
            )?
            .query_row(duckdb::params![event.timestamp, event.id], |row| row.get(0))?,
        Counter::UniqueVisitors => conn
            .prepare_cached("SELECT COUNT(*) FROM agg_unique_visitors WHERE session_id = ?1")?
            .query_row(duckdb::params![event.session_id], |row| row.get(0))?,
    };
    if exists > 0 {
        return Ok(false);
    }

    match counter {
        Counter::ViewsByPath => conn.execute(
            "INSERT OR IGNORE INTO agg_views_by_path (namespace, sort_key, event_id) \
             VALUES (?1, ?2, ?3)",
            duckdb::params![event.path, event.timestamp, event.id],
        )?,
        Counter::TotalViews => conn.execute(
            "INSERT OR IGNORE INTO agg_total_views (sort_key, event_id) VALUES (?1, ?2)",
            duckdb::params![event.timestamp, event.id],
        )?,
        Counter::UniqueVisitors => conn.execute(
            "INSERT OR IGNORE INTO agg_unique_visitors (session_id, first_event_id, sort_key) \
             VALUES (?1, ?2, ?3)",
            duckdb::params![event.session_id, event.id, event.timestamp],
        )?,
    };
    Ok(true)
}

/// Current value of `counter`. `namespace` scopes `ViewsByPath` to one path
/// and is ignored by the unscoped counters.
pub(crate) fn count(conn: &Connection, counter: Counter, namespace: Option<&str>) -> Result<u64> {
    let n: i64 = match (counter, namespace) {
        (Counter::ViewsByPath, Some(path)) => conn
            .prepare_cached("SELECT COUNT(*) FROM agg_views_by_path WHERE namespace = ?1")?
            .query_row(duckdb::params![path], |row| row.get(0))?,
        (Counter::ViewsByPath, None) => conn
            .prepare_cached("SELECT COUNT(*) FROM agg_views_by_path")?
            .query_row([], |row| row.get(0))?,
        (Counter::TotalViews, _) => conn
            .prepare_cached("SELECT COUNT(*) FROM agg_total_views")?
            .query_row([], |row| row.get(0))?,
        (Counter::UniqueVisitors, _) => conn
            .prepare_cached("SELECT COUNT(*) FROM agg_unique_visitors")?
            .query_row([], |row| row.get(0))?,
    };
    Ok(n.max(0) as u64)
}

/// Per-path counter values for every namespace in one pass.
pub(crate) fn counts_by_path(conn: &Connection) -> Result<HashMap<String, u64>> {
    let mut stmt =
        conn.prepare("SELECT namespace, COUNT(*) FROM agg_views_by_path GROUP BY namespace")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    let mut out = HashMap::new();
    for row in rows {
        let (path, n) = row?;
        out.insert(path, n.max(0) as u64);
    }
    Ok(out)
}

impl DuckDbBackend {
    /// Count `event` in `counter` if absent. See [`Counter`].
    pub async fn aggregate_insert(&self, counter: Counter, event: &PageViewEvent) -> Result<bool> {
        let conn = self.conn.lock().await;
        insert_if_absent(&conn, counter, event)
    }

    pub async fn aggregate_count(&self, counter: Counter, namespace: Option<&str>) -> Result<u64> {
        let conn = self.conn.lock().await;
        count(&conn, counter, namespace)
    }

    /// Empty all three counters. The raw log is untouched; a backfill
    /// repopulates the counters and the stats reader covers the gap meanwhile.
    pub async fn reset_aggregates(&self) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute_batch(
            "DELETE FROM agg_views_by_path;
             DELETE FROM agg_total_views;
             DELETE FROM agg_unique_visitors;",
        )?;
        tx.commit()?;
        tracing::info!("Aggregate counters reset");
        Ok(())
    }
}
