//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (JSON-RPC, HTTP, Prometheus, axum). Each
//! sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `chain`: read-only contract calls via alloy-rs
//! - `http`: shared reqwest transport with pacing
//! - `graphql`: lending-market and portfolio GraphQL providers
//! - `rest`: vault REST endpoints
//! - `metrics`: Prometheus telemetry and the report server
//! - `registry`: source kind to adapter dispatch

pub mod chain;
pub mod graphql;
pub mod http;
pub mod metrics;
pub mod registry;
pub mod rest;

pub use registry::AdapterRegistry;
