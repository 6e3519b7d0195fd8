use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use postpulse_server::config::{AuthMode, Config};
use postpulse_server::scheduler::{self, backfill};
use postpulse_server::state::AppState;

/// `postpulse health`: liveness probe for Docker HEALTHCHECK.
///
/// Calls `GET http://localhost:$POSTPULSE_PORT/health`.
/// Exits 0 if the server responds with HTTP 200, exits 1 otherwise.
fn run_health_check() -> ! {
    let port = std::env::var("POSTPULSE_PORT").unwrap_or_else(|_| "3000".to_string());
    let url = format!("http://localhost:{}/health", port);
    match ureq::get(&url).call() {
        Ok(resp) if resp.status() == 200 => std::process::exit(0),
        _ => std::process::exit(1),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(|s| s.as_str()) == Some("health") {
        run_health_check();
    }
    // Structured JSON logging. Level controlled via RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("postpulse=info".parse()?),
        )
        .json()
        .init();

    let cfg = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    std::fs::create_dir_all(&cfg.data_dir)?;
    let db = postpulse_duckdb::DuckDbBackend::open(&cfg.db_path(), &cfg.duckdb_memory_limit)?;

    match &cfg.auth_mode {
        AuthMode::Token(_) => info!("Admin routes require a bearer token"),
        AuthMode::None => {
            warn!("POSTPULSE_ADMIN_TOKEN unset; admin routes are open")
        }
    }

    let state = Arc::new(AppState::new(db, cfg.clone()));

    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            backfill::run_backfill_worker(state).await;
        });
    }

    if cfg.backfill_resume {
        match backfill::resume_backfill(&state).await {
            Ok(true) => {}
            Ok(false) => info!("No interrupted backfill to resume"),
            Err(e) => warn!(error = %e, "Could not resume backfill"),
        }
    }

    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            scheduler::run_cleanup_loop(state).await;
        });
    }

    let addr = format!("0.0.0.0:{}", cfg.port);
    let app = postpulse_server::app::build_app(Arc::clone(&state));

    info!(port = cfg.port, "postpulse listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}
