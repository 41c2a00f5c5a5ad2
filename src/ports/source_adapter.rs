//! Source Adapter Port - Uniform Fetch Interface
//!
//! Every provider family (on-chain reader, lending-market GraphQL,
//! portfolio GraphQL, vault REST) answers the same question: given a
//! `SourceSpec`, produce one `Observation`. Failures are values, never
//! errors or panics crossing this boundary.

use async_trait::async_trait;

use crate::domain::observation::Observation;
use crate::domain::source::SourceSpec;

/// Translates one provider-specific query into an `Observation`.
///
/// Implementations apply their own fixed timeout, perform at most one
/// remote read per call and never retry; retry policy belongs to the
/// orchestrator.
#[async_trait]
pub trait SourceAdapter: Send + Sync + 'static {
  /// Query the source described by `spec`.
  async fn fetch(&self, spec: &SourceSpec) -> Observation;
}
