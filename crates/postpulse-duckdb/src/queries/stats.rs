use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use chrono::{DateTime, Utc};
use duckdb::Connection;

use postpulse_core::analytics::{reconcile, PageStat, StatsSnapshot};

use crate::aggregates::{count, counts_by_path, Counter};
use crate::backend::to_ms;
use crate::content::load_catalog;
use crate::queries::active::active_summary;
use crate::DuckDbBackend;

/// Counts recomputed straight from the raw log.
struct DirectCounts {
    total: u64,
    unique_sessions: u64,
    tracking_since: Option<i64>,
    by_path: BTreeMap<String, u64>,
}

fn direct_counts(conn: &Connection) -> Result<DirectCounts> {
    let (total, unique_sessions, tracking_since): (i64, i64, Option<i64>) = conn
        .prepare("SELECT COUNT(*), COUNT(DISTINCT session_id), MIN(ts) FROM page_views")?
        .query_row([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;

    let mut stmt = conn.prepare("SELECT path, COUNT(*) FROM page_views GROUP BY path")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    let mut by_path = BTreeMap::new();
    for row in rows {
        let (path, n) = row?;
        by_path.insert(path, n.max(0) as u64);
    }

    Ok(DirectCounts {
        total: total.max(0) as u64,
        unique_sessions: unique_sessions.max(0) as u64,
        tracking_since,
        by_path,
    })
}

/// Build the stats snapshot as of `now`.
///
/// Every view count is `max(aggregate, direct)`: the counters may lag the
/// log until a backfill completes, the direct scan never does. The scan is
/// linear in the log size, acceptable at a personal site's event volume.
pub async fn get_stats_inner(db: &DuckDbBackend, now: DateTime<Utc>) -> Result<StatsSnapshot> {
    let conn = db.conn.lock().await;

    let active = active_summary(&conn, to_ms(now))?;
    let direct = direct_counts(&conn)?;

    let total_aggregate = count(&conn, Counter::TotalViews, None)?;
    let unique_aggregate = count(&conn, Counter::UniqueVisitors, None)?;
    let path_aggregates: HashMap<String, u64> = counts_by_path(&conn)?;

    let catalog = load_catalog(&conn)?;

    let mut page_stats: Vec<PageStat> = direct
        .by_path
        .iter()
        .map(|(path, direct_views)| {
            let aggregate_views = path_aggregates.get(path).copied().unwrap_or(0);
            let label = catalog.label_for(path);
            PageStat {
                path: path.clone(),
                title: label.title,
                page_type: label.page_type,
                views: reconcile(aggregate_views, *direct_views),
            }
        })
        .collect();
    page_stats.sort_by(|a, b| b.views.cmp(&a.views).then_with(|| a.path.cmp(&b.path)));

    Ok(StatsSnapshot {
        active_visitors: active.active_visitors,
        active_by_path: active.by_path,
        total_page_views: reconcile(total_aggregate, direct.total),
        unique_visitors: reconcile(unique_aggregate, direct.unique_sessions),
        published_posts: catalog.published_posts(),
        published_pages: catalog.published_pages(),
        tracking_since: direct.tracking_since,
        page_stats,
        visitor_locations: active.locations,
    })
}

impl DuckDbBackend {
    pub async fn get_stats_at(&self, now: DateTime<Utc>) -> Result<StatsSnapshot> {
        get_stats_inner(self, now).await
    }
}
