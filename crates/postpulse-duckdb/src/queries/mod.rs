pub mod active;
pub mod stats;
