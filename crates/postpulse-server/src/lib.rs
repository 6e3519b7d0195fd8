pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod geo;
pub mod routes;
pub mod scheduler;
pub mod state;
