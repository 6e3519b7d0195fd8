use async_trait::async_trait;
use chrono::Utc;

use postpulse_core::analytics::{
    AnalyticsStore, BackfillCheckpoint, BackfillProgress, BackfillStep, StatsSnapshot,
};
use postpulse_core::content::ContentEntry;
use postpulse_core::event::{HeartbeatInput, HeartbeatOutcome, PageViewInput, RecordOutcome};

use crate::DuckDbBackend;

#[async_trait]
impl AnalyticsStore for DuckDbBackend {
    async fn record_page_view(&self, input: &PageViewInput) -> anyhow::Result<RecordOutcome> {
        self.record_page_view_at(input, Utc::now()).await
    }

    async fn heartbeat(&self, input: &HeartbeatInput) -> anyhow::Result<HeartbeatOutcome> {
        self.heartbeat_at(input, Utc::now()).await
    }

    async fn get_stats(&self) -> anyhow::Result<StatsSnapshot> {
        self.get_stats_at(Utc::now()).await
    }

    async fn cleanup_stale_sessions(&self) -> anyhow::Result<usize> {
        self.cleanup_stale_sessions_at(Utc::now()).await
    }

    async fn has_page_views(&self) -> anyhow::Result<bool> {
        DuckDbBackend::has_page_views(self).await
    }

    async fn begin_backfill(&self) -> anyhow::Result<()> {
        self.begin_backfill_at(Utc::now()).await
    }

    async fn backfill_chunk(&self, step: &BackfillStep) -> anyhow::Result<BackfillProgress> {
        self.backfill_chunk_at(step, Utc::now()).await
    }

    async fn fail_backfill(&self, error: &str) -> anyhow::Result<()> {
        self.fail_backfill_at(error, Utc::now()).await
    }

    async fn backfill_status(&self) -> anyhow::Result<Option<BackfillCheckpoint>> {
        DuckDbBackend::backfill_status(self).await
    }

    async fn reset_aggregates(&self) -> anyhow::Result<()> {
        DuckDbBackend::reset_aggregates(self).await
    }

    async fn sync_content(&self, entries: &[ContentEntry], prune: bool) -> anyhow::Result<usize> {
        self.sync_content_at(entries, prune, Utc::now()).await
    }

    async fn ping(&self) -> anyhow::Result<()> {
        DuckDbBackend::ping(self).await
    }
}
