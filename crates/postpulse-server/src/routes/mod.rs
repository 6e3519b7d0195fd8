pub mod admin;
pub mod health;
pub mod heartbeat;
pub mod stats;
pub mod views;
