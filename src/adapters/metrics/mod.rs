//! Metrics and Monitoring Adapters
//!
//! Prometheus telemetry for fetches, sections and cycles, plus the axum
//! server exposing /live, /ready, /report and /metrics in serve mode.

pub mod health;
pub mod prometheus;

pub use health::{ReportFeed, ReportServer, ServerState};
pub use prometheus::MetricsRegistry;
