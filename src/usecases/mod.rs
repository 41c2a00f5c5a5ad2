//! Use Cases Layer - Aggregation Workflow
//!
//! Orchestrates adapters through the ports to turn configured sources into
//! one `EcosystemReport` per cycle.
//!
//! Use cases:
//! - `Orchestrator`: concurrent fan-out with retry and a global deadline
//! - `Normalizer`: per-shape decoding and same-entity merge
//! - `ReportAssembler`: section composition and derived figures
//! - `AggregationCycle` / `Aggregator`: the per-cycle state machine

pub mod assembler;
pub mod cycle;
pub mod normalizer;
pub mod orchestrator;

pub use assembler::{ReportAssembler, ReportLayout};
pub use cycle::{AggregationCycle, Aggregator};
pub use normalizer::{NormalizedBatch, Normalizer};
pub use orchestrator::{Orchestrator, RetryPolicy};
