//! GraphQL Adapters - Lending Market and Portfolio Providers
//!
//! - `queries`: document catalogue keyed by response shape
//! - `envelope`: status and `errors` classification
//! - `adapter`: the `SourceAdapter` for both GraphQL source kinds

pub mod adapter;
pub mod envelope;
pub mod queries;

pub use adapter::GraphQlAdapter;
