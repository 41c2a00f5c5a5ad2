//! Metrics Normalizer - Observation to Metric Decoding and Merge
//!
//! Each successful observation is decoded by the rule for its query shape
//! into unit-scaled metrics plus entity descriptors. Metrics describing the
//! same entity and metric name are merged: the most recently fetched value
//! wins, every contributing source stays in `provenance`, and the losing
//! values are kept as `superseded`. Failed observations contribute nothing.
//!
//! The merge ranks by `(fetched_at, source_id, value)`, so the result does
//! not depend on observation order.

mod euler;
mod lending;
mod onchain;
mod portfolio;
pub mod values;

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use crate::domain::entity::{EntityDescriptor, EntityInfo};
use crate::domain::metric::Metric;
use crate::domain::observation::{FetchError, Observation, ObservationStatus};
use crate::domain::report::SourceTally;
use crate::domain::source::{ResponseShape, SourceId, SourceQuery, SourceSpec, Unit};

/// Collects one observation's decoded output.
pub(crate) struct Sink<'a> {
  spec: &'a SourceSpec,
  fetched_at: DateTime<Utc>,
  metrics: Vec<Metric>,
  descriptors: Vec<EntityDescriptor>,
}

impl<'a> Sink<'a> {
  fn new(spec: &'a SourceSpec, fetched_at: DateTime<Utc>) -> Self {
    Self {
      spec,
      fetched_at,
      metrics: Vec::new(),
      descriptors: Vec::new(),
    }
  }

  /// Record a metric; absent values produce nothing.
  pub(crate) fn metric(&mut self, entity: &str, name: &str, value: Option<Decimal>, unit: Unit) {
    if let Some(value) = value {
      self.metrics.push(Metric::new(
        self.spec.section,
        entity,
        name,
        value,
        unit,
        &self.spec.id,
        self.fetched_at,
      ));
    }
  }

  pub(crate) fn describe(&mut self, entity: &str, info: EntityInfo) {
    self
      .descriptors
      .push(EntityDescriptor::new(entity, info, &self.spec.id, self.fetched_at));
  }

  pub(crate) const fn spec(&self) -> &SourceSpec {
    self.spec
  }
}

type MetricKey = (String, String);

/// Normalized output of one cycle.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
  metrics: BTreeMap<MetricKey, Metric>,
  descriptors: BTreeMap<String, EntityDescriptor>,
  /// Per-cycle source outcome counts.
  pub tally: SourceTally,
}

impl NormalizedBatch {
  /// All merged metrics ordered by entity, then name.
  pub fn metrics(&self) -> impl Iterator<Item = &Metric> {
    self.metrics.values()
  }

  pub fn into_metrics(self) -> Vec<Metric> {
    self.metrics.into_values().collect()
  }

  pub fn metric(&self, entity: &str, name: &str) -> Option<&Metric> {
    self.metrics.get(&(entity.to_string(), name.to_string()))
  }

  /// Metrics of one entity, ordered by name.
  pub fn entity_metrics<'s>(&'s self, entity: &'s str) -> impl Iterator<Item = &'s Metric> + 's {
    self
      .metrics
      .range((entity.to_string(), String::new())..)
      .take_while(move |((e, _), _)| e == entity)
      .map(|(_, m)| m)
  }

  pub fn has_metrics(&self, entity: &str) -> bool {
    self.entity_metrics(entity).next().is_some()
  }

  pub fn descriptor(&self, entity: &str) -> Option<&EntityDescriptor> {
    self.descriptors.get(entity)
  }

  pub fn descriptors(&self) -> impl Iterator<Item = &EntityDescriptor> {
    self.descriptors.values()
  }

  pub fn is_empty(&self) -> bool {
    self.metrics.is_empty()
  }

  fn merge_metric(&mut self, incoming: Metric) {
    match self.metrics.entry((incoming.entity.clone(), incoming.name.clone())) {
      Entry::Vacant(slot) => {
        slot.insert(incoming);
      }
      Entry::Occupied(mut slot) => {
        let current = slot.get_mut();
        let mut provenance = std::mem::take(&mut current.provenance);
        provenance.extend(incoming.provenance.iter().cloned());
        let mut superseded = std::mem::take(&mut current.superseded);
        superseded.extend(incoming.superseded.iter().cloned());

        if incoming.rank() > current.rank() {
          superseded.push(current.as_superseded());
          *current = incoming;
        } else {
          superseded.push(incoming.as_superseded());
        }

        provenance.sort();
        provenance.dedup();
        superseded.sort_by(|a, b| {
          (a.fetched_at, &a.source_id, a.value).cmp(&(b.fetched_at, &b.source_id, b.value))
        });
        superseded.dedup();
        current.provenance = provenance;
        current.superseded = superseded;
        if current.has_disagreement() {
          debug!(entity = %current.entity, metric = %current.name, "Sources disagree");
        }
      }
    }
  }

  fn merge_descriptor(&mut self, incoming: EntityDescriptor) {
    match self.descriptors.entry(incoming.entity.clone()) {
      Entry::Vacant(slot) => {
        slot.insert(incoming);
      }
      Entry::Occupied(mut slot) => {
        let current = slot.get_mut();
        let mut provenance = std::mem::take(&mut current.provenance);
        provenance.extend(incoming.provenance.iter().cloned());
        if incoming.rank() > current.rank() {
          *current = incoming;
        }
        provenance.sort();
        provenance.dedup();
        current.provenance = provenance;
      }
    }
  }
}

/// Decodes and merges a cycle's observations.
pub struct Normalizer {
  specs: HashMap<SourceId, SourceSpec>,
}

impl Normalizer {
  pub fn new(specs: &[SourceSpec]) -> Self {
    Self {
      specs: specs.iter().map(|s| (s.id.clone(), s.clone())).collect(),
    }
  }

  /// Decode every successful observation and merge the results.
  #[instrument(skip_all, fields(observations = observations.len()))]
  pub fn normalize(&self, observations: &[Observation]) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();
    batch.tally.total = observations.len();

    for observation in observations {
      let ObservationStatus::Ok { payload } = &observation.status else {
        batch.tally.failed += 1;
        continue;
      };

      let Some(spec) = self.specs.get(&observation.source_id) else {
        warn!(source = %observation.source_id, "Observation for unknown source ignored");
        batch.tally.rejected += 1;
        continue;
      };

      match decode(spec, payload, observation.fetched_at) {
        Ok(sink) => {
          batch.tally.ok += 1;
          for metric in sink.metrics {
            batch.merge_metric(metric);
          }
          for descriptor in sink.descriptors {
            batch.merge_descriptor(descriptor);
          }
        }
        Err(FetchError::Decode(detail)) => {
          error!(source = %spec.id, kind = %spec.kind, detail = %detail, "response schema mismatch");
          batch.tally.rejected += 1;
        }
        Err(reason) => {
          warn!(source = %spec.id, error = %reason, "Observation rejected");
          batch.tally.rejected += 1;
        }
      }
    }

    batch
  }
}

/// Apply the decoding rule for the spec's query shape.
fn decode<'a>(spec: &'a SourceSpec, payload: &Value, fetched_at: DateTime<Utc>) -> Result<Sink<'a>, FetchError> {
  let mut sink = Sink::new(spec, fetched_at);
  match &spec.query {
    SourceQuery::Contract(_) => onchain::decode(&mut sink, payload)?,
    SourceQuery::GraphQl(query) => match query.shape {
      ResponseShape::MarketByKey => lending::decode_market(&mut sink, payload)?,
      ResponseShape::VaultAllocation => lending::decode_vault(&mut sink, payload)?,
      ResponseShape::Portfolio => portfolio::decode(&mut sink, payload, &query.page_limits)?,
      ResponseShape::EulerVault => return Err(unsupported(spec)),
    },
    SourceQuery::Rest(query) => match query.shape {
      ResponseShape::EulerVault => euler::decode(&mut sink, payload, query.decimals)?,
      _ => return Err(unsupported(spec)),
    },
  }
  Ok(sink)
}

fn unsupported(spec: &SourceSpec) -> FetchError {
  FetchError::Provider(format!("no decoding rule for source {} ({})", spec.id, spec.kind))
}

/// Parse a payload fragment into a typed shape.
pub(crate) fn parse<T: serde::de::DeserializeOwned>(value: &Value, what: &str) -> Result<T, FetchError> {
  T::deserialize(value).map_err(|e| FetchError::Decode(format!("{what}: {e}")))
}
