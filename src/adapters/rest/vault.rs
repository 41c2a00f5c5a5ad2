//! Vault REST Adapter
//!
//! One GET against a vault endpoint returning a JSON object keyed by vault
//! address. The entry for the configured vault becomes the payload; the
//! bigint-encoded amounts are left for the normalizer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::adapters::http::status_error;
use crate::domain::observation::{FetchError, Observation};
use crate::domain::source::{SourceQuery, SourceSpec};
use crate::ports::http_transport::{HttpRequest, HttpTransport};
use crate::ports::source_adapter::SourceAdapter;

/// `SourceAdapter` for `RestVault` sources.
pub struct RestVaultAdapter<T: HttpTransport> {
  transport: Arc<T>,
  timeout: Duration,
}

impl<T: HttpTransport> RestVaultAdapter<T> {
  pub const fn new(transport: Arc<T>, timeout: Duration) -> Self {
    Self { transport, timeout }
  }

  async fn get(&self, spec: &SourceSpec) -> Result<Value, FetchError> {
    if !matches!(spec.query, SourceQuery::Rest(_)) {
      return Err(FetchError::Provider(format!("source {} is not a REST query", spec.id)));
    }

    let reply = tokio::time::timeout(self.timeout, self.transport.send(HttpRequest::get(spec.endpoint.clone())))
      .await
      .map_err(|_| FetchError::Transport(format!("timed out after {:?}", self.timeout)))??;

    if reply.status != 200 {
      return Err(status_error(&reply));
    }

    let body: Value = serde_json::from_str(&reply.body)
      .map_err(|e| FetchError::Decode(format!("response is not JSON: {e}")))?;
    vault_entry(&body, &spec.entity)
  }
}

/// Entry for `vault` in a body keyed by address (case-insensitive).
fn vault_entry(body: &Value, vault: &str) -> Result<Value, FetchError> {
  let entries = body
    .as_object()
    .ok_or_else(|| FetchError::Decode("vault response is not an object".into()))?;

  entries
    .iter()
    .find(|(address, _)| address.eq_ignore_ascii_case(vault))
    .map(|(_, entry)| entry.clone())
    .ok_or_else(|| FetchError::Provider(format!("vault {vault} not found")))
}

#[async_trait]
impl<T: HttpTransport> SourceAdapter for RestVaultAdapter<T> {
  #[instrument(skip(self, spec), fields(source = %spec.id))]
  async fn fetch(&self, spec: &SourceSpec) -> Observation {
    match self.get(spec).await {
      Ok(entry) => Observation::ok(spec.id.clone(), entry),
      Err(reason) => {
        warn!(error = %reason, "Vault request failed");
        Observation::failed(spec.id.clone(), reason)
      }
    }
    .at(Utc::now())
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn test_vault_entry_lookup_ignores_case() {
    let body = json!({"0xF2ec2d8fE1351bAFF31643855C0f4D1E63Bd1ce4": {"totalCash": "__bigint__1"}});
    let entry = vault_entry(&body, "0xf2ec2d8fe1351baff31643855c0f4d1e63bd1ce4").unwrap();
    assert_eq!(entry["totalCash"], "__bigint__1");
    assert!(matches!(vault_entry(&body, "0x00"), Err(FetchError::Provider(_))));
    assert!(matches!(vault_entry(&json!([]), "0x00"), Err(FetchError::Decode(_))));
  }
}
