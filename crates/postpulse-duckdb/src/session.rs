use anyhow::Result;
use chrono::{DateTime, Utc};
use duckdb::{Connection, OptionalExt};
use tracing::{debug, info};

use postpulse_core::event::{ActiveSession, HeartbeatInput, HeartbeatOutcome};
use postpulse_core::{window_ms, HEARTBEAT_DEDUP_WINDOW, SESSION_TIMEOUT};

use crate::backend::to_ms;
use crate::DuckDbBackend;

impl DuckDbBackend {
    /// Upsert the presence row for `input.session_id` as of `now`.
    ///
    /// A row seen less than 20 s ago is left alone even if the path changed,
    /// so concurrent heartbeats from several tabs collapse to one write.
    /// On update only the provided geo fields are overwritten.
    pub async fn heartbeat_at(
        &self,
        input: &HeartbeatInput,
        now: DateTime<Utc>,
    ) -> Result<HeartbeatOutcome> {
        let now_ms = to_ms(now);
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let last_seen: Option<i64> = tx
            .prepare_cached("SELECT last_seen FROM active_sessions WHERE session_id = ?1")?
            .query_row(duckdb::params![input.session_id], |row| row.get(0))
            .optional()?;

        let geo = &input.geo;
        let outcome = match last_seen {
            Some(seen) if now_ms - seen < window_ms(HEARTBEAT_DEDUP_WINDOW) => {
                debug!(session_id = %input.session_id, "Heartbeat inside window, skipped");
                return Ok(HeartbeatOutcome::Skipped);
            }
            Some(_) => {
                tx.execute(
                    "UPDATE active_sessions SET \
                         current_path = ?2, \
                         last_seen = ?3, \
                         city = COALESCE(CAST(?4 AS VARCHAR), city), \
                         country = COALESCE(CAST(?5 AS VARCHAR), country), \
                         latitude = COALESCE(CAST(?6 AS DOUBLE), latitude), \
                         longitude = COALESCE(CAST(?7 AS DOUBLE), longitude) \
                     WHERE session_id = ?1",
                    duckdb::params![
                        input.session_id,
                        input.current_path,
                        now_ms,
                        geo.city,
                        geo.country,
                        geo.latitude,
                        geo.longitude
                    ],
                )?;
                HeartbeatOutcome::Updated
            }
            None => {
                tx.execute(
                    "INSERT INTO active_sessions \
                         (session_id, current_path, last_seen, city, country, latitude, longitude) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    duckdb::params![
                        input.session_id,
                        input.current_path,
                        now_ms,
                        geo.city,
                        geo.country,
                        geo.latitude,
                        geo.longitude
                    ],
                )?;
                HeartbeatOutcome::Created
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    /// Delete sessions with no heartbeat for longer than the session timeout.
    /// Returns how many were removed.
    pub async fn cleanup_stale_sessions_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = to_ms(now) - window_ms(SESSION_TIMEOUT);
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let stale: i64 = tx
            .prepare("SELECT COUNT(*) FROM active_sessions WHERE last_seen < ?1")?
            .query_row(duckdb::params![cutoff], |row| row.get(0))?;
        if stale > 0 {
            tx.execute(
                "DELETE FROM active_sessions WHERE last_seen < ?1",
                duckdb::params![cutoff],
            )?;
        }
        tx.commit()?;
        if stale > 0 {
            info!(deleted = stale, "Stale sessions removed");
        }
        Ok(stale.max(0) as usize)
    }

    /// Look up one presence row.
    pub async fn get_active_session(&self, session_id: &str) -> Result<Option<ActiveSession>> {
        let conn = self.conn.lock().await;
        let session = conn
            .prepare(
                "SELECT session_id, current_path, last_seen, city, country, latitude, longitude \
                 FROM active_sessions WHERE session_id = ?1",
            )?
            .query_row(duckdb::params![session_id], map_session)
            .optional()?;
        Ok(session)
    }
}

fn map_session(row: &duckdb::Row<'_>) -> duckdb::Result<ActiveSession> {
    Ok(ActiveSession {
        session_id: row.get(0)?,
        current_path: row.get(1)?,
        last_seen: row.get(2)?,
        city: row.get(3)?,
        country: row.get(4)?,
        latitude: row.get(5)?,
        longitude: row.get(6)?,
    })
}

/// Sessions whose last heartbeat is newer than `now_ms - SESSION_TIMEOUT`.
pub(crate) fn active_sessions_since(conn: &Connection, now_ms: i64) -> Result<Vec<ActiveSession>> {
    let cutoff = now_ms - window_ms(SESSION_TIMEOUT);
    let mut stmt = conn.prepare(
        "SELECT session_id, current_path, last_seen, city, country, latitude, longitude \
         FROM active_sessions WHERE last_seen > ?1",
    )?;
    let rows = stmt.query_map(duckdb::params![cutoff], map_session)?;
    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(row?);
    }
    Ok(sessions)
}
