use std::sync::Arc;

use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{auth::require_admin, routes, state::AppState};

/// Construct the Axum [`Router`] with all routes and middleware attached.
///
/// Middleware is applied in outer-to-inner order (outermost runs first on
/// request, last on response):
///
/// 1. `CorsLayer`: the tracker runs in visitors' browsers on the site's own
///    origin(s), listed in `POSTPULSE_CORS_ORIGINS` (any origin when empty).
/// 2. `TraceLayer`: structured request/response logging via `tracing`.
/// 3. `CompressionLayer`: gzip for the stats payload.
///
/// `/api/admin/*` additionally sits behind [`require_admin`].
pub fn build_app(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route(
            "/api/admin/backfill",
            post(routes::admin::start_backfill_handler).get(routes::admin::backfill_status),
        )
        .route("/api/admin/cleanup", post(routes::admin::cleanup))
        .route(
            "/api/admin/aggregates/reset",
            post(routes::admin::reset_aggregates),
        )
        .route("/api/admin/content", put(routes::admin::sync_content))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_admin,
        ));

    Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/views", post(routes::views::record_view))
        .route("/api/heartbeat", post(routes::heartbeat::heartbeat))
        .route("/api/stats", get(routes::stats::get_stats))
        .merge(admin)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    if allowed.is_empty() {
        base.allow_origin(Any)
    } else {
        base.allow_origin(AllowOrigin::list(allowed))
    }
}
