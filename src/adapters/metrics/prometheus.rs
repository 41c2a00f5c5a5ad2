//! Prometheus Metrics Registry - Aggregation Observability
//!
//! Implements the `Telemetry` port: fetch outcomes and latency per source
//! kind, section health, cycle duration and source tallies. The text
//! exposition is served by the report server under `/metrics`.

use std::time::Duration;

use prometheus::{
    Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec,
    Opts, Registry, TextEncoder,
};

use crate::domain::report::{SectionName, SourceTally};
use crate::domain::source::SourceKind;
use crate::ports::telemetry::Telemetry;

/// Centralized Prometheus metrics for the aggregator.
///
/// All metrics follow the naming convention `lvlusd_monitor_*`.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Fetch attempts by source kind and outcome.
    pub fetch_attempts: IntCounterVec,
    /// Fetch latency histogram (seconds) by source kind.
    pub fetch_latency: HistogramVec,
    /// Section status (1 = ok, 0 = failed).
    pub section_ok: GaugeVec,
    /// Last cycle duration in seconds.
    pub cycle_seconds: Gauge,
    /// Completed cycles.
    pub cycles_total: IntCounter,
    /// Sources per outcome in the last cycle.
    pub sources: IntGaugeVec,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let fetch_attempts = IntCounterVec::new(
            Opts::new("lvlusd_monitor_fetch_attempts_total", "Source fetch attempts by outcome"),
            &["kind", "outcome"],
        )?;

        let fetch_latency = HistogramVec::new(
            HistogramOpts::new("lvlusd_monitor_fetch_latency_seconds", "Source fetch latency")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["kind"],
        )?;

        let section_ok = GaugeVec::new(
            Opts::new(
                "lvlusd_monitor_section_ok",
                "Report section status (1=ok, 0=failed)",
            ),
            &["section"],
        )?;

        let cycle_seconds = Gauge::new(
            "lvlusd_monitor_cycle_seconds",
            "Duration of the last aggregation cycle",
        )?;

        let cycles_total = IntCounter::new(
            "lvlusd_monitor_cycles_total",
            "Completed aggregation cycles",
        )?;

        let sources = IntGaugeVec::new(
            Opts::new("lvlusd_monitor_sources", "Sources per outcome in the last cycle"),
            &["outcome"],
        )?;

        registry.register(Box::new(fetch_attempts.clone()))?;
        registry.register(Box::new(fetch_latency.clone()))?;
        registry.register(Box::new(section_ok.clone()))?;
        registry.register(Box::new(cycle_seconds.clone()))?;
        registry.register(Box::new(cycles_total.clone()))?;
        registry.register(Box::new(sources.clone()))?;

        Ok(Self {
            registry,
            fetch_attempts,
            fetch_latency,
            section_ok,
            cycle_seconds,
            cycles_total,
            sources,
        })
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl Telemetry for MetricsRegistry {
    fn record_fetch(&self, kind: SourceKind, outcome: &str, elapsed: Duration) {
        let kind = kind.to_string();
        self.fetch_attempts.with_label_values(&[&kind, outcome]).inc();
        self.fetch_latency
            .with_label_values(&[&kind])
            .observe(elapsed.as_secs_f64());
    }

    fn record_section(&self, section: SectionName, ok: bool) {
        self.section_ok
            .with_label_values(&[section.as_str()])
            .set(if ok { 1.0 } else { 0.0 });
    }

    fn record_cycle(&self, elapsed: Duration, tally: &SourceTally) {
        self.cycle_seconds.set(elapsed.as_secs_f64());
        self.cycles_total.inc();
        for (outcome, count) in [
            ("ok", tally.ok),
            ("failed", tally.failed),
            ("rejected", tally.rejected),
        ] {
            self.sources
                .with_label_values(&[outcome])
                .set(i64::try_from(count).unwrap_or(i64::MAX));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_recorded_series() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.record_fetch(SourceKind::GraphQlMarket, "ok", Duration::from_millis(120));
        metrics.record_section(SectionName::LendingSituation, true);
        metrics.record_cycle(
            Duration::from_secs(2),
            &SourceTally { total: 3, ok: 2, failed: 1, rejected: 0 },
        );

        let text = metrics.render().unwrap();
        assert!(text.contains("lvlusd_monitor_fetch_attempts_total{kind=\"graphql_market\",outcome=\"ok\"} 1"));
        assert!(text.contains("lvlusd_monitor_section_ok{section=\"LendingSituation\"} 1"));
        assert!(text.contains("lvlusd_monitor_sources{outcome=\"failed\"} 1"));
    }
}
