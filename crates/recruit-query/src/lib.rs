pub mod config;
pub mod error;
pub mod queries;
pub mod telemetry;
