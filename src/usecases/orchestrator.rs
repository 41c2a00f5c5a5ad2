//! Aggregation Orchestrator - Concurrent Fan-out with Retry and Deadline
//!
//! Dispatches every configured source to its adapter concurrently, retries
//! transport-level failures with exponential backoff and bounds the whole
//! fan-out with a global deadline. Always returns exactly one observation
//! per input spec, in input order:
//! 1. Sources whose kind has no adapter fail immediately (provider error)
//! 2. Each remaining source runs in its own task, isolated from panics
//! 3. Sources still running at the deadline are cancelled and recorded as
//!    `DeadlineExceeded`

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{error, info, instrument, warn};

use crate::adapters::registry::AdapterRegistry;
use crate::domain::observation::{FetchError, Observation};
use crate::domain::source::SourceSpec;
use crate::ports::source_adapter::SourceAdapter;
use crate::ports::telemetry::Telemetry;

/// Backoff policy applied to retryable (transport) failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Retries after the first attempt, so a source is fetched at most
  /// `max_retries + 1` times. The default of two retries gives the
  /// 200ms and 800ms backoff pair.
  pub max_retries: u32,
  /// Delay before the first retry.
  pub base_delay: Duration,
  /// Growth factor between consecutive delays.
  pub multiplier: u32,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 2,
      base_delay: Duration::from_millis(200),
      multiplier: 4,
    }
  }
}

impl RetryPolicy {
  /// Delay before retry number `retry` (1-based): `base * multiplier^(retry-1)`.
  pub fn delay_for(&self, retry: u32) -> Duration {
    let factor = self.multiplier.saturating_pow(retry.saturating_sub(1));
    self.base_delay.saturating_mul(factor)
  }
}

/// Fans out one aggregation cycle's fetches.
pub struct Orchestrator {
  /// Adapter per source kind.
  registry: AdapterRegistry,
  /// Retry policy.
  policy: RetryPolicy,
  /// Wall-clock bound for the whole fan-out.
  global_deadline: Duration,
  /// Fetch instrumentation.
  telemetry: Arc<dyn Telemetry>,
}

impl Orchestrator {
  pub fn new(
    registry: AdapterRegistry,
    policy: RetryPolicy,
    global_deadline: Duration,
    telemetry: Arc<dyn Telemetry>,
  ) -> Self {
    Self {
      registry,
      policy,
      global_deadline,
      telemetry,
    }
  }

  /// Fetch every source; one observation per spec, matched by position
  /// and `source_id`.
  #[instrument(skip_all, fields(sources = specs.len()))]
  pub async fn run(&self, specs: &[SourceSpec]) -> Vec<Observation> {
    let deadline = Instant::now() + self.global_deadline;
    let mut slots: Vec<Option<Observation>> = vec![None; specs.len()];
    let mut tasks = JoinSet::new();

    for (index, spec) in specs.iter().enumerate() {
      let Some(adapter) = self.registry.get(spec.kind) else {
        warn!(source = %spec.id, kind = %spec.kind, "No adapter registered for source kind");
        slots[index] = Some(Observation::failed(
          spec.id.clone(),
          FetchError::Provider(format!("no adapter registered for kind {}", spec.kind)),
        ));
        continue;
      };

      let spec = spec.clone();
      let policy = self.policy;
      let telemetry = Arc::clone(&self.telemetry);
      tasks.spawn(async move {
        let observation = AssertUnwindSafe(fetch_with_retry(adapter.as_ref(), &spec, policy, telemetry.as_ref()))
          .catch_unwind()
          .await
          .unwrap_or_else(|_| {
            error!(source = %spec.id, "Adapter panicked");
            Observation::failed(spec.id.clone(), FetchError::Provider("adapter panicked".into()))
          });
        (index, observation)
      });
    }

    loop {
      match timeout_at(deadline, tasks.join_next()).await {
        Ok(Some(Ok((index, observation)))) => slots[index] = Some(observation),
        Ok(Some(Err(e))) => warn!(error = %e, "Fetch task ended abnormally"),
        Ok(None) => break,
        Err(_) => {
          warn!(pending = tasks.len(), "Global deadline exceeded, cancelling remaining fetches");
          tasks.abort_all();
          break;
        }
      }
    }

    let observations: Vec<Observation> = slots
      .into_iter()
      .zip(specs)
      .map(|(slot, spec)| slot.unwrap_or_else(|| Observation::failed(spec.id.clone(), FetchError::DeadlineExceeded)))
      .collect();

    let ok = observations.iter().filter(|o| o.is_ok()).count();
    if ok == 0 && !observations.is_empty() {
      warn!("No source reachable this cycle");
    }
    info!(ok, failed = observations.len() - ok, "Fan-out complete");

    observations
  }
}

/// Run one source through the retry policy.
///
/// Only `FetchError::Transport` is retried; every other failure is stable
/// within a cycle and returned at once.
pub async fn fetch_with_retry(
  adapter: &dyn SourceAdapter,
  spec: &SourceSpec,
  policy: RetryPolicy,
  telemetry: &dyn Telemetry,
) -> Observation {
  let mut attempt = 0;
  loop {
    attempt += 1;
    let started = Instant::now();
    let mut observation = adapter.fetch(spec).await;
    observation.source_id.clone_from(&spec.id);

    let outcome = observation.error().map_or("ok", FetchError::label);
    telemetry.record_fetch(spec.kind, outcome, started.elapsed());

    match observation.error() {
      Some(reason) if reason.is_retryable() && attempt <= policy.max_retries => {
        let delay = policy.delay_for(attempt);
        warn!(
          source = %spec.id,
          attempt,
          delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
          error = %reason,
          "Transport failure, retrying"
        );
        sleep(delay).await;
      }
      Some(FetchError::Decode(detail)) => {
        error!(source = %spec.id, detail = %detail, "response schema mismatch");
        return observation.with_attempts(attempt);
      }
      Some(reason) => {
        warn!(source = %spec.id, attempts = attempt, error = %reason, "Source failed");
        return observation.with_attempts(attempt);
      }
      None => return observation.with_attempts(attempt),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_backoff_schedule() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.delay_for(1), Duration::from_millis(200));
    assert_eq!(policy.delay_for(2), Duration::from_millis(800));
    assert_eq!(policy.max_retries, 2);
  }

  #[test]
  fn test_backoff_saturates() {
    let policy = RetryPolicy {
      max_retries: 100,
      base_delay: Duration::from_secs(1),
      multiplier: 10,
    };
    assert!(policy.delay_for(64) >= Duration::from_secs(1));
  }
}
