//! Telemetry Port - Aggregation Instrumentation
//!
//! Use cases report fetch outcomes, section statuses and cycle timings
//! through this trait; the Prometheus adapter implements it and tests use
//! the no-op.

use std::time::Duration;

use crate::domain::report::{SectionName, SourceTally};
use crate::domain::source::SourceKind;

/// Receives aggregation events.
pub trait Telemetry: Send + Sync + 'static {
  /// One fetch attempt finished. `outcome` is `ok` or a `FetchError` label.
  fn record_fetch(&self, kind: SourceKind, outcome: &str, elapsed: Duration);

  /// A section was assembled.
  fn record_section(&self, section: SectionName, ok: bool);

  /// A cycle completed.
  fn record_cycle(&self, elapsed: Duration, tally: &SourceTally);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
  fn record_fetch(&self, _kind: SourceKind, _outcome: &str, _elapsed: Duration) {}

  fn record_section(&self, _section: SectionName, _ok: bool) {}

  fn record_cycle(&self, _elapsed: Duration, _tally: &SourceTally) {}
}
