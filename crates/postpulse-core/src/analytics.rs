//! Analytics store abstraction.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::content::ContentEntry;
use crate::error::CoreError;
use crate::event::{HeartbeatInput, HeartbeatOutcome, PageViewInput, RecordOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivePathCount {
    pub path: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageStat {
    pub path: String,
    pub title: String,
    pub page_type: String,
    pub views: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitorLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// Everything the public stats page renders, read in one call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub active_visitors: u64,
    pub active_by_path: Vec<ActivePathCount>,
    pub total_page_views: u64,
    pub unique_visitors: u64,
    pub published_posts: u64,
    pub published_pages: u64,
    /// Unix milliseconds of the earliest recorded view.
    pub tracking_since: Option<i64>,
    pub page_stats: Vec<PageStat>,
    pub visitor_locations: Vec<VisitorLocation>,
}

/// Pick the value to report for a counter that may lag the raw event log.
///
/// The aggregate is cheap but can be behind until a backfill finishes; the
/// direct recount is always complete. Neither can exceed the truth, so the
/// larger of the two is the best available answer.
pub fn reconcile(aggregate: u64, direct: u64) -> u64 {
    aggregate.max(direct)
}

/// Keyset position in the raw event log, ordered by `(timestamp, id)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BackfillCursor {
    pub timestamp: i64,
    pub id: String,
}

impl fmt::Display for BackfillCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.timestamp, self.id)
    }
}

impl FromStr for BackfillCursor {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ts, id) = s
            .split_once(':')
            .ok_or_else(|| CoreError::InvalidCursor(s.to_string()))?;
        let timestamp = ts
            .parse()
            .map_err(|_| CoreError::InvalidCursor(s.to_string()))?;
        if id.is_empty() {
            return Err(CoreError::InvalidCursor(s.to_string()));
        }
        Ok(Self {
            timestamp,
            id: id.to_string(),
        })
    }
}

/// One unit of backfill work: where to resume and what has been seen so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackfillStep {
    /// `None` starts from the beginning of the log.
    pub cursor: Option<BackfillCursor>,
    pub total_processed: u64,
    pub seen_session_ids: Vec<String>,
}

impl BackfillStep {
    pub fn from_start() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackfillStatus {
    InProgress,
    Complete,
    Failed,
}

impl BackfillStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackfillStatus::InProgress => "in_progress",
            BackfillStatus::Complete => "complete",
            BackfillStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "in_progress" => Some(BackfillStatus::InProgress),
            "complete" => Some(BackfillStatus::Complete),
            "failed" => Some(BackfillStatus::Failed),
            _ => None,
        }
    }
}

/// Result of running one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct BackfillProgress {
    pub status: BackfillStatus,
    pub processed: u64,
    pub unique_sessions: u64,
    pub cursor: Option<BackfillCursor>,
    /// The step to enqueue next; `None` once the log is exhausted.
    pub next: Option<BackfillStep>,
}

/// Durable record of the current or most recent backfill run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackfillCheckpoint {
    pub status: BackfillStatus,
    pub cursor: Option<String>,
    pub processed: u64,
    pub unique_sessions: u64,
    #[serde(skip)]
    pub seen_session_ids: Vec<String>,
    pub started_at: i64,
    pub updated_at: i64,
    pub error: Option<String>,
}

impl BackfillCheckpoint {
    /// Rebuild the step that continues this run, if it is still in progress.
    pub fn resume_step(&self) -> Result<Option<BackfillStep>, CoreError> {
        if self.status != BackfillStatus::InProgress {
            return Ok(None);
        }
        let cursor = self.cursor.as_deref().map(str::parse).transpose()?;
        Ok(Some(BackfillStep {
            cursor,
            total_processed: self.processed,
            seen_session_ids: self.seen_session_ids.clone(),
        }))
    }
}

/// Insertion-ordered set of session ids seen during a backfill run.
///
/// Only the most recently added ids survive [`SeenSessions::carry_forward`],
/// which bounds what is handed from one chunk to the next. A session that has
/// fallen out of the carried window looks new again; the unique-visitor insert
/// it triggers is idempotent, so only the run's reported session count can
/// drift.
#[derive(Debug, Clone, Default)]
pub struct SeenSessions {
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl SeenSessions {
    pub fn from_ids(ids: Vec<String>) -> Self {
        let mut seen = Self::default();
        for id in ids {
            seen.insert(&id);
        }
        seen
    }

    /// Returns `true` if `session_id` was not already present.
    pub fn insert(&mut self, session_id: &str) -> bool {
        if self.members.contains(session_id) {
            return false;
        }
        self.members.insert(session_id.to_string());
        self.order.push_back(session_id.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The `cap` most recently added ids, oldest first.
    pub fn carry_forward(&self, cap: usize) -> Vec<String> {
        let skip = self.order.len().saturating_sub(cap);
        self.order.iter().skip(skip).cloned().collect()
    }
}

/// Storage interface for every analytics operation.
///
/// The DuckDB backend is the only implementation today; handlers and the
/// background workers depend on this trait so the store can be swapped.
#[async_trait]
pub trait AnalyticsStore: Send + Sync + 'static {
    async fn record_page_view(&self, input: &PageViewInput) -> anyhow::Result<RecordOutcome>;

    async fn heartbeat(&self, input: &HeartbeatInput) -> anyhow::Result<HeartbeatOutcome>;

    async fn get_stats(&self) -> anyhow::Result<StatsSnapshot>;

    async fn cleanup_stale_sessions(&self) -> anyhow::Result<usize>;

    async fn has_page_views(&self) -> anyhow::Result<bool>;

    /// Reset the durable checkpoint to a fresh in-progress run.
    async fn begin_backfill(&self) -> anyhow::Result<()>;

    async fn backfill_chunk(&self, step: &BackfillStep) -> anyhow::Result<BackfillProgress>;

    async fn fail_backfill(&self, error: &str) -> anyhow::Result<()>;

    async fn backfill_status(&self) -> anyhow::Result<Option<BackfillCheckpoint>>;

    async fn reset_aggregates(&self) -> anyhow::Result<()>;

    async fn sync_content(&self, entries: &[ContentEntry], prune: bool) -> anyhow::Result<usize>;

    async fn ping(&self) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconcile_takes_the_larger_value() {
        assert_eq!(reconcile(3, 7), 7);
        assert_eq!(reconcile(7, 7), 7);
        assert_eq!(reconcile(9, 2), 9);
    }

    #[test]
    fn cursor_round_trips_through_display() {
        let cursor = BackfillCursor {
            timestamp: 1_700_000_000_123,
            id: "2f1c:odd-id".to_string(),
        };
        let parsed: BackfillCursor = cursor.to_string().parse().expect("parse");
        assert_eq!(parsed, cursor);
    }

    #[test]
    fn malformed_cursor_is_rejected() {
        assert!("nonsense".parse::<BackfillCursor>().is_err());
        assert!("abc:id".parse::<BackfillCursor>().is_err());
        assert!("12:".parse::<BackfillCursor>().is_err());
    }

    #[test]
    fn seen_sessions_ignores_repeats() {
        let mut seen = SeenSessions::default();
        assert!(seen.insert("a"));
        assert!(seen.insert("b"));
        assert!(!seen.insert("a"));
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn carry_forward_keeps_most_recent_ids() {
        let mut seen = SeenSessions::from_ids(vec!["a".into(), "b".into()]);
        seen.insert("c");
        seen.insert("d");
        assert_eq!(seen.carry_forward(3), vec!["b", "c", "d"]);
        assert_eq!(seen.carry_forward(10).len(), 4);
    }

    #[test]
    fn ids_evicted_by_the_cap_look_new_again() {
        let mut seen = SeenSessions::default();
        for i in 0..12 {
            seen.insert(&format!("s{i}"));
        }
        let carried = seen.carry_forward(10);
        assert_eq!(carried.first().map(String::as_str), Some("s2"));

        let mut next = SeenSessions::from_ids(carried);
        assert_eq!(next.len(), 10);
        assert!(!next.insert("s11"));
        assert!(next.insert("s0"));
        assert!(next.insert("s1"));
        assert_eq!(next.len(), 12);
    }

    #[test]
    fn resume_step_only_for_in_progress_runs() {
        let mut checkpoint = BackfillCheckpoint {
            status: BackfillStatus::InProgress,
            cursor: Some("42:evt".to_string()),
            processed: 500,
            unique_sessions: 12,
            seen_session_ids: vec!["s1".to_string()],
            started_at: 1,
            updated_at: 2,
            error: None,
        };
        let step = checkpoint.resume_step().expect("ok").expect("in progress");
        assert_eq!(step.total_processed, 500);
        assert_eq!(step.cursor.map(|c| c.timestamp), Some(42));

        checkpoint.status = BackfillStatus::Complete;
        assert_eq!(checkpoint.resume_step().expect("ok"), None);
    }
}
