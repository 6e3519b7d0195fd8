use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use postpulse_core::analytics::{AnalyticsStore, BackfillStep};
use postpulse_core::config::Config;
use postpulse_duckdb::DuckDbBackend;

use crate::geo::GeoLookup;

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
pub struct AppState {
    /// Storage behind the analytics trait; `DuckDbBackend` in production.
    pub store: Arc<dyn AnalyticsStore>,

    /// Parsed configuration, loaded once at startup from environment variables.
    pub config: Arc<Config>,

    /// `None` when no GeoIP database is configured or it failed to load.
    pub geo: Option<Arc<GeoLookup>>,

    /// Work queue feeding the backfill worker one chunk step at a time.
    backfill_tx: mpsc::UnboundedSender<BackfillJob>,

    /// Taken exactly once by [`crate::scheduler::backfill::run_backfill_worker`].
    backfill_rx: Mutex<Option<mpsc::UnboundedReceiver<BackfillJob>>>,

    /// Bumped by every fresh start; jobs from older runs are dropped.
    backfill_run: AtomicU64,
}

/// A queued chunk step and the run it belongs to.
#[derive(Debug, Clone)]
pub struct BackfillJob {
    pub run: u64,
    pub step: BackfillStep,
}

impl AppState {
    /// Construct a new `AppState` wrapping the given backend and config.
    ///
    /// The GeoIP database is opened here from `config.geoip_path`.
    pub fn new(db: DuckDbBackend, config: Config) -> Self {
        let geo = GeoLookup::open(&config.geoip_path).map(Arc::new);
        Self::with_store(Arc::new(db), config, geo)
    }

    pub fn with_store(
        store: Arc<dyn AnalyticsStore>,
        config: Config,
        geo: Option<Arc<GeoLookup>>,
    ) -> Self {
        let (backfill_tx, backfill_rx) = mpsc::unbounded_channel();
        Self {
            store,
            config: Arc::new(config),
            geo,
            backfill_tx,
            backfill_rx: Mutex::new(Some(backfill_rx)),
            backfill_run: AtomicU64::new(0),
        }
    }

    /// Queue a backfill chunk step for the current run.
    pub fn enqueue_backfill(&self, step: BackfillStep) -> anyhow::Result<()> {
        self.enqueue_backfill_job(BackfillJob {
            run: self.current_backfill_run(),
            step,
        })
    }

    pub(crate) fn enqueue_backfill_job(&self, job: BackfillJob) -> anyhow::Result<()> {
        self.backfill_tx
            .send(job)
            .map_err(|_| anyhow::anyhow!("backfill queue closed"))
    }

    pub fn current_backfill_run(&self) -> u64 {
        self.backfill_run.load(Ordering::SeqCst)
    }

    /// Supersede whatever run is queued; returns the new run number.
    pub(crate) fn next_backfill_run(&self) -> u64 {
        self.backfill_run.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) async fn take_backfill_receiver(
        &self,
    ) -> Option<mpsc::UnboundedReceiver<BackfillJob>> {
        self.backfill_rx.lock().await.take()
    }
}
