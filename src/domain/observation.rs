//! Observations and the fetch error taxonomy.
//!
//! An `Observation` is the raw result of querying one source at one instant.
//! Adapters never let errors escape: every failure is folded into
//! `ObservationStatus::Failed` carrying a classified `FetchError`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::source::{SourceId, Unit};

/// Classified reason a fetch did not produce usable data.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FetchError {
    /// Network failure or timeout. The only retryable class.
    #[error("transport error: {0}")]
    Transport(String),

    /// Well-formed response signalling an application-level failure.
    #[error("provider error: {0}")]
    Provider(String),

    /// Response shape did not match the expected schema.
    #[error("decode error: {0}")]
    Decode(String),

    /// The orchestrator's global deadline elapsed first.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl FetchError {
    /// Whether the orchestrator may retry after this error.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Short label for logs and metric labels.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Provider(_) => "provider",
            Self::Decode(_) => "decode",
            Self::DeadlineExceeded => "deadline",
        }
    }
}

/// Outcome of a single fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ObservationStatus {
    /// Fetch succeeded; the payload is opaque until normalized.
    Ok {
        /// Provider payload.
        payload: serde_json::Value,
    },
    /// Fetch failed.
    Failed {
        /// Why.
        reason: FetchError,
    },
}

/// Raw result of querying one source at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Source that produced it.
    pub source_id: SourceId,
    /// When the final attempt completed.
    pub fetched_at: DateTime<Utc>,
    /// Attempts made (1 when no retry happened).
    pub attempts: u32,
    /// Success payload or failure reason.
    pub status: ObservationStatus,
}

impl Observation {
    /// Successful observation stamped now.
    pub fn ok(source_id: impl Into<SourceId>, payload: serde_json::Value) -> Self {
        Self {
            source_id: source_id.into(),
            fetched_at: Utc::now(),
            attempts: 1,
            status: ObservationStatus::Ok { payload },
        }
    }

    /// Failed observation stamped now.
    pub fn failed(source_id: impl Into<SourceId>, reason: FetchError) -> Self {
        Self {
            source_id: source_id.into(),
            fetched_at: Utc::now(),
            attempts: 1,
            status: ObservationStatus::Failed { reason },
        }
    }

    /// Override the fetch timestamp.
    #[must_use]
    pub fn at(mut self, fetched_at: DateTime<Utc>) -> Self {
        self.fetched_at = fetched_at;
        self
    }

    /// Record how many attempts were made.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub const fn is_ok(&self) -> bool {
        matches!(self.status, ObservationStatus::Ok { .. })
    }

    /// Payload if the fetch succeeded.
    pub const fn payload(&self) -> Option<&serde_json::Value> {
        match &self.status {
            ObservationStatus::Ok { payload } => Some(payload),
            ObservationStatus::Failed { .. } => None,
        }
    }

    /// Failure reason if the fetch failed.
    pub const fn error(&self) -> Option<&FetchError> {
        match &self.status {
            ObservationStatus::Ok { .. } => None,
            ObservationStatus::Failed { reason } => Some(reason),
        }
    }
}

/// One bound, scaled return value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractReading {
    pub metric: String,
    pub unit: Unit,
    /// Raw base-unit integer as decimal text.
    pub raw: String,
    pub decimals: u32,
    /// `raw / 10^decimals`.
    pub value: Decimal,
}

/// Payload of a successful on-chain observation.
///
/// Values are scaled before they are wrapped, so no later stage sees
/// base-unit integers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractPayload {
    pub entity: String,
    pub address: String,
    pub signature: String,
    pub readings: Vec<ContractReading>,
}
