pub mod config;
pub mod engine;
pub mod feeds;
pub mod models;
pub mod monitor;
pub mod signals;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod fixtures;
