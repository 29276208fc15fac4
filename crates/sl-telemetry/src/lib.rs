//! Observability for sluice services.
//!
//! - **Logging**: human-readable or JSON output via `tracing-subscriber`
//! - **Metrics**: counters, gauges and histograms with Prometheus export,
//!   plus helpers for the coordinator's own metric families
//! - **Middleware**: axum layers for request metrics and `x-request-id`
//!   correlation

pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod tracing_setup;
