/// DuckDB initialization SQL.
///
/// Executed once at database open time via `Connection::execute_batch`.
/// All statements use `IF NOT EXISTS` so they are safe to re-run on every
/// startup.
///
/// Every timestamp column is BIGINT Unix milliseconds so window arithmetic
/// is exact integer comparison.
///
/// IMPORTANT:
///   - Always set an explicit memory limit; the DuckDB default (80% of
///     system RAM) is not acceptable for a server process.
///   - `active_sessions` deliberately has no secondary index. Its rows are
///     updated in place on every heartbeat and the table only ever holds
///     the sessions of the last few minutes.
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

-- ===========================================
-- PAGE VIEWS (raw event log, append-only)
-- ===========================================
CREATE TABLE IF NOT EXISTS page_views (
    id              VARCHAR PRIMARY KEY,           -- UUID v4
    path            VARCHAR NOT NULL,
    page_type       VARCHAR NOT NULL,              -- 'home' | 'stats' | 'blog' | 'page' | ...
    session_id      VARCHAR NOT NULL,
    ts              BIGINT NOT NULL                -- Unix ms
);
-- Dedup lookup: latest view of (session, path)
CREATE INDEX IF NOT EXISTS idx_page_views_session_path
    ON page_views(session_id, path, ts DESC);
-- Backfill keyset pagination + tracking-since
CREATE INDEX IF NOT EXISTS idx_page_views_ts_id
    ON page_views(ts, id);

-- ===========================================
-- ACTIVE SESSIONS (presence, one row per session)
-- ===========================================
CREATE TABLE IF NOT EXISTS active_sessions (
    session_id      VARCHAR PRIMARY KEY,
    current_path    VARCHAR NOT NULL,
    last_seen       BIGINT NOT NULL,               -- Unix ms
    city            VARCHAR,
    country         VARCHAR,
    latitude        DOUBLE,
    longitude       DOUBLE
);

-- ===========================================
-- AGGREGATE COUNTERS
-- ===========================================
-- Each row is one counted unit. The primary key is the dedup identity, so
-- an insert of an already-counted event is a no-op.
CREATE TABLE IF NOT EXISTS agg_views_by_path (
    namespace       VARCHAR NOT NULL,              -- path
    sort_key        BIGINT NOT NULL,               -- event ts
    event_id        VARCHAR NOT NULL,
    PRIMARY KEY (namespace, sort_key, event_id)
);
CREATE TABLE IF NOT EXISTS agg_total_views (
    sort_key        BIGINT NOT NULL,
    event_id        VARCHAR NOT NULL,
    PRIMARY KEY (sort_key, event_id)
);
CREATE TABLE IF NOT EXISTS agg_unique_visitors (
    session_id      VARCHAR PRIMARY KEY,
    first_event_id  VARCHAR NOT NULL,
    sort_key        BIGINT NOT NULL
);

-- ===========================================
-- CONTENT CATALOG (published posts/pages, for titles)
-- ===========================================
CREATE TABLE IF NOT EXISTS content (
    slug            VARCHAR PRIMARY KEY,
    title           VARCHAR NOT NULL,
    kind            VARCHAR NOT NULL,              -- 'post' | 'page'
    published       BOOLEAN NOT NULL DEFAULT true,
    updated_at      BIGINT NOT NULL
);

-- ===========================================
-- BACKFILL CHECKPOINT (single row, id = 'current')
-- ===========================================
CREATE TABLE IF NOT EXISTS backfill_checkpoint (
    id                  VARCHAR PRIMARY KEY,
    status              VARCHAR NOT NULL,          -- 'in_progress' | 'complete' | 'failed'
    cursor              VARCHAR,                   -- '<ts>:<id>' of the last processed event
    processed           BIGINT NOT NULL,
    unique_sessions     BIGINT NOT NULL,
    seen_session_ids    VARCHAR NOT NULL,          -- JSON array, capped
    started_at          BIGINT NOT NULL,
    updated_at          BIGINT NOT NULL,
    error               VARCHAR
);
"#
    )
}
