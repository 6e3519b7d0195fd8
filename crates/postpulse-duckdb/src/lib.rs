pub mod aggregates;
pub mod analytics_impl;
pub mod backend;
pub mod backfill;
pub mod content;
pub mod pageviews;
pub mod queries;
pub mod schema;
pub mod session;

pub use aggregates::Counter;
pub use backend::DuckDbBackend;

/// Re-export the `duckdb` crate so consumers (especially tests) can use
/// `postpulse_duckdb::duckdb::params!` without an extra dependency.
pub use duckdb;
