use std::collections::HashMap;

use anyhow::Result;
use duckdb::Connection;

use postpulse_core::analytics::{ActivePathCount, VisitorLocation};

use crate::session::active_sessions_since;

pub(crate) struct ActiveSummary {
    pub active_visitors: u64,
    /// Sorted by count descending, then path.
    pub by_path: Vec<ActivePathCount>,
    /// Only sessions carrying both coordinates.
    pub locations: Vec<VisitorLocation>,
}

/// Presence rows with a heartbeat inside the session timeout.
pub(crate) fn active_summary(conn: &Connection, now_ms: i64) -> Result<ActiveSummary> {
    let sessions = active_sessions_since(conn, now_ms)?;

    let mut counts: HashMap<&str, u64> = HashMap::new();
    for s in &sessions {
        *counts.entry(s.current_path.as_str()).or_default() += 1;
    }
    let mut by_path: Vec<ActivePathCount> = counts
        .into_iter()
        .map(|(path, count)| ActivePathCount {
            path: path.to_string(),
            count,
        })
        .collect();
    by_path.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.path.cmp(&b.path)));

    let locations = sessions
        .iter()
        .filter_map(|s| match (s.latitude, s.longitude) {
            (Some(latitude), Some(longitude)) => Some(VisitorLocation {
                latitude,
                longitude,
                city: s.city.clone(),
                country: s.country.clone(),
            }),
            _ => None,
        })
        .collect();

    Ok(ActiveSummary {
        active_visitors: sessions.len() as u64,
        by_path,
        locations,
    })
}
