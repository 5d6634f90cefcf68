//! sightline server — a small instrumented web service.
//!
//! Demonstrates how the process-wide telemetry layer (`sl-telemetry`) is
//! wired into an axum server: periodic metric export is started once at
//! boot, the collector is injected into handler state, and each
//! instrumented route records one counter increment and exactly one
//! duration sample per request.

pub mod config;
pub mod routes;
pub mod server;
pub mod shutdown;

pub use config::ServerConfig;
pub use routes::{router, AppState};
pub use shutdown::ShutdownSignal;
