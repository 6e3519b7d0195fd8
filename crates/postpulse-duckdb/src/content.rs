use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use chrono::{DateTime, Utc};
use duckdb::Connection;
use tracing::info;

use postpulse_core::content::{ContentCatalog, ContentEntry, ContentKind};

use crate::backend::to_ms;
use crate::DuckDbBackend;

impl DuckDbBackend {
    /// Upsert catalog entries by slug.
    ///
    /// Duplicate slugs in `entries` collapse to the last one. With `prune`
    /// set, stored slugs absent from `entries` are deleted so the catalog
    /// mirrors the content pipeline exactly. Returns the number of entries
    /// written.
    pub async fn sync_content_at(
        &self,
        entries: &[ContentEntry],
        prune: bool,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let by_slug: BTreeMap<&str, &ContentEntry> =
            entries.iter().map(|e| (e.slug.as_str(), e)).collect();
        let now_ms = to_ms(now);

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let mut pruned = 0usize;
        if prune {
            let keep: HashSet<&str> = by_slug.keys().copied().collect();
            let stored: Vec<String> = {
                let mut stmt = tx.prepare("SELECT slug FROM content")?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                rows.collect::<Result<_, _>>()?
            };
            for slug in stored.iter().filter(|s| !keep.contains(s.as_str())) {
                tx.execute("DELETE FROM content WHERE slug = ?1", duckdb::params![slug])?;
                pruned += 1;
            }
        }

        for entry in by_slug.values() {
            tx.execute(
                "INSERT INTO content (slug, title, kind, published, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT (slug) DO UPDATE SET \
                     title = EXCLUDED.title, kind = EXCLUDED.kind, \
                     published = EXCLUDED.published, updated_at = EXCLUDED.updated_at",
                duckdb::params![
                    entry.slug,
                    entry.title,
                    entry.kind.as_str(),
                    entry.published,
                    now_ms
                ],
            )?;
        }

        tx.commit()?;
        info!(synced = by_slug.len(), pruned, "Content catalog synced");
        Ok(by_slug.len())
    }
}

/// Load the whole catalog; unpublished rows are filtered by [`ContentCatalog`].
pub(crate) fn load_catalog(conn: &Connection) -> Result<ContentCatalog> {
    let mut stmt = conn.prepare("SELECT slug, title, kind, published FROM content")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, bool>(3)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (slug, title, kind, published) = row?;
        let Some(kind) = ContentKind::parse(&kind) else {
            tracing::warn!(slug = %slug, kind = %kind, "Skipping content row with unknown kind");
            continue;
        };
        entries.push(ContentEntry {
            slug,
            title,
            kind,
            published,
        });
    }
    Ok(ContentCatalog::from_entries(entries))
}
