//! Remedy Swarm
//!
//! Outer surfaces for the remedy coordination engine: TOML configuration,
//! a process-backed checker, process- and HTTP-backed fixing agents,
//! console and JSON reports, and the CLI entry point in `main.rs`.

pub mod adapters;
pub mod app;
pub mod config;
pub mod report;
pub mod telemetry;

pub use config::{LogFormat, SwarmConfig};
