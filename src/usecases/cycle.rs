//! Aggregation Cycle - Fetch, Normalize, Assemble
//!
//! One `AggregationCycle` walks `Idle → Fetching → Normalizing →
//! Assembling → Done` exactly once and yields one `EcosystemReport`.
//! Observations and metrics live only inside `execute`; nothing is carried
//! into the next cycle. `Aggregator` holds the long-lived pieces (sources,
//! adapters, normalizer, assembler) and starts a fresh cycle per call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::adapters::registry::AdapterRegistry;
use crate::config::AppConfig;
use crate::domain::cycle::{CycleError, CyclePhase, PhaseTracker};
use crate::domain::report::EcosystemReport;
use crate::domain::source::SourceSpec;
use crate::ports::telemetry::Telemetry;

use super::assembler::{ReportAssembler, ReportLayout};
use super::normalizer::Normalizer;
use super::orchestrator::{Orchestrator, RetryPolicy};

/// A single Idle→Done run.
#[derive(Debug)]
pub struct AggregationCycle {
  id: Uuid,
  tracker: PhaseTracker,
}

impl Default for AggregationCycle {
  fn default() -> Self {
    Self::new()
  }
}

impl AggregationCycle {
  pub fn new() -> Self {
    Self {
      id: Uuid::new_v4(),
      tracker: PhaseTracker::new(),
    }
  }

  pub const fn id(&self) -> Uuid {
    self.id
  }

  pub const fn phase(&self) -> CyclePhase {
    self.tracker.phase()
  }

  /// Run every phase in order. Consumes the cycle, so a finished cycle
  /// cannot be re-entered.
  #[instrument(skip_all, fields(cycle = %self.id))]
  pub async fn execute(
    mut self,
    orchestrator: &Orchestrator,
    normalizer: &Normalizer,
    assembler: &ReportAssembler,
    specs: &[SourceSpec],
  ) -> Result<EcosystemReport, CycleError> {
    self.tracker.advance(CyclePhase::Fetching)?;
    let observations = orchestrator.run(specs).await;

    self.tracker.advance(CyclePhase::Normalizing)?;
    let batch = normalizer.normalize(&observations);
    drop(observations);

    self.tracker.advance(CyclePhase::Assembling)?;
    let report = assembler.assemble(self.id, &batch, Utc::now());

    self.tracker.advance(CyclePhase::Done)?;
    Ok(report)
  }
}

/// Long-lived wiring; each `run_cycle` call is an independent cycle.
pub struct Aggregator {
  specs: Vec<SourceSpec>,
  orchestrator: Orchestrator,
  normalizer: Normalizer,
  assembler: ReportAssembler,
  telemetry: Arc<dyn Telemetry>,
}

impl Aggregator {
  pub fn new(
    specs: Vec<SourceSpec>,
    registry: AdapterRegistry,
    policy: RetryPolicy,
    global_deadline: Duration,
    layout: ReportLayout,
    telemetry: Arc<dyn Telemetry>,
  ) -> Self {
    Self {
      normalizer: Normalizer::new(&specs),
      orchestrator: Orchestrator::new(registry, policy, global_deadline, Arc::clone(&telemetry)),
      assembler: ReportAssembler::new(layout),
      specs,
      telemetry,
    }
  }

  /// Build from validated configuration.
  pub fn from_config(config: &AppConfig, registry: AdapterRegistry, telemetry: Arc<dyn Telemetry>) -> Result<Self> {
    let specs = config.source_specs()?;
    let layout = ReportLayout::from_specs(&specs, &config.report.base_token, &config.report.staked_token);
    Ok(Self::new(
      specs,
      registry,
      config.orchestrator.retry_policy(),
      config.orchestrator.global_deadline(),
      layout,
      telemetry,
    ))
  }

  pub fn specs(&self) -> &[SourceSpec] {
    &self.specs
  }

  /// Run one fresh cycle and record its telemetry.
  pub async fn run_cycle(&self) -> Result<EcosystemReport, CycleError> {
    let started = Instant::now();
    let report = AggregationCycle::new()
      .execute(&self.orchestrator, &self.normalizer, &self.assembler, &self.specs)
      .await?;

    for (section, status) in report.section_results() {
      self.telemetry.record_section(section, status.is_ok());
    }
    let elapsed = started.elapsed();
    self.telemetry.record_cycle(elapsed, &report.sources);

    info!(
      cycle = %report.cycle_id,
      sources = report.sources.total,
      ok = report.sources.ok,
      failed = report.sources.failed,
      rejected = report.sources.rejected,
      failed_sections = ?report.failed_sections(),
      elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
      "Aggregation cycle complete"
    );
    Ok(report)
  }
}
