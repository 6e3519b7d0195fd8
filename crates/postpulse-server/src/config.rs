/// Re-export `Config` from `postpulse-core` for use within this crate.
///
/// Environment parsing lives in the core crate so integration tests can
/// build a `Config` without the server.
pub use postpulse_core::config::{AuthMode, Config};
