//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces the aggregation use cases require from the
//! outside world. Adapters implement these traits; tests substitute
//! mocks and fakes.
//!
//! Port categories:
//! - `SourceAdapter`: one fetch per source, failures as values
//! - `ChainReader`: raw read-only `eth_call`
//! - `HttpTransport`: HTTP request/reply exchange
//! - `Telemetry`: fetch, section and cycle instrumentation

pub mod chain_reader;
pub mod http_transport;
pub mod source_adapter;
pub mod telemetry;

pub use chain_reader::ChainReader;
pub use http_transport::{HttpMethod, HttpReply, HttpRequest, HttpTransport};
pub use source_adapter::SourceAdapter;
pub use telemetry::{NoopTelemetry, Telemetry};
