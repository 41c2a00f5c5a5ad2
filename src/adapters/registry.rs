//! Adapter Registry - Source Kind Dispatch
//!
//! Maps each `SourceKind` to the adapter serving it. The orchestrator looks
//! adapters up by the kind tag of each spec, so adding a provider family
//! means registering one more adapter, not touching control flow.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::domain::source::SourceKind;
use crate::ports::chain_reader::ChainReader;
use crate::ports::http_transport::HttpTransport;
use crate::ports::source_adapter::SourceAdapter;

use super::chain::{OnChainAdapter, RpcPool};
use super::graphql::GraphQlAdapter;
use super::http::{HttpClientConfig, ReqwestTransport};
use super::rest::RestVaultAdapter;

/// Kind-keyed adapter table.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
  adapters: HashMap<SourceKind, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register (or replace) the adapter for `kind`.
  #[must_use]
  pub fn with(mut self, kind: SourceKind, adapter: Arc<dyn SourceAdapter>) -> Self {
    self.adapters.insert(kind, adapter);
    self
  }

  pub fn get(&self, kind: SourceKind) -> Option<Arc<dyn SourceAdapter>> {
    self.adapters.get(&kind).cloned()
  }

  pub fn kinds(&self) -> Vec<SourceKind> {
    let mut kinds: Vec<SourceKind> = self.adapters.keys().copied().collect();
    kinds.sort();
    kinds
  }

  /// Register every built-in adapter over the given chain reader and
  /// HTTP transport. GraphQL and REST adapters share the transport.
  pub fn standard<R, T>(reader: R, transport: Arc<T>, timeout: Duration) -> Self
  where
    R: ChainReader,
    T: HttpTransport,
  {
    let graphql: Arc<dyn SourceAdapter> = Arc::new(GraphQlAdapter::new(Arc::clone(&transport), timeout));
    Self::new()
      .with(SourceKind::OnChainContract, Arc::new(OnChainAdapter::new(reader, timeout)))
      .with(SourceKind::GraphQlMarket, Arc::clone(&graphql))
      .with(SourceKind::GraphQlPortfolio, graphql)
      .with(SourceKind::RestVault, Arc::new(RestVaultAdapter::new(transport, timeout)))
  }

  /// Production wiring: the shared alloy provider pool and a reqwest
  /// transport.
  pub fn connect(pool: Arc<RpcPool>, http: &HttpClientConfig, timeout: Duration) -> Result<Self> {
    let transport = Arc::new(ReqwestTransport::new(http)?);
    Ok(Self::standard(pool, transport, timeout))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_connect_registers_every_kind() {
    let pool = Arc::new(RpcPool::new());
    let registry = AdapterRegistry::connect(pool, &HttpClientConfig::default(), Duration::from_secs(5)).unwrap();
    assert_eq!(
      registry.kinds(),
      vec![
        SourceKind::OnChainContract,
        SourceKind::GraphQlMarket,
        SourceKind::GraphQlPortfolio,
        SourceKind::RestVault,
      ]
    );
  }
}
