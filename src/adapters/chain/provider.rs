//! JSON-RPC Provider Pool - alloy-rs 0.9 Connection Management
//!
//! Keeps one alloy HTTP provider per RPC endpoint, built on first use and
//! shared by every on-chain source pointing at that endpoint. The pool is
//! constructed explicitly by the caller and scoped to its owner, so tests
//! and concurrent cycles never share a hidden global connection.
//!
//! `ProviderBuilder::new().on_http()` returns a transport-specific type;
//! it is boxed and stored as `dyn Provider` so the pool's API stays free
//! of alloy's generic filler types.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy::primitives::{Address, Bytes};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::transports::{RpcError, TransportError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::domain::observation::FetchError;
use crate::ports::chain_reader::ChainReader;

type SharedProvider = Arc<dyn Provider + Send + Sync>;

/// Pool of read-only RPC providers keyed by endpoint URL.
#[derive(Default)]
pub struct RpcPool {
    providers: Mutex<HashMap<String, SharedProvider>>,
}

impl RpcPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider for `endpoint`, connecting on first use.
    fn provider(&self, endpoint: &str) -> Result<SharedProvider, FetchError> {
        let mut providers = self
            .providers
            .lock()
            .map_err(|_| FetchError::Transport("provider pool lock poisoned".into()))?;

        if let Some(existing) = providers.get(endpoint) {
            return Ok(Arc::clone(existing));
        }

        let url = endpoint
            .parse()
            .map_err(|e| FetchError::Provider(format!("invalid RPC URL: {e}")))?;
        let provider: SharedProvider = Arc::new(ProviderBuilder::new().on_http(url).boxed());
        providers.insert(endpoint.to_string(), Arc::clone(&provider));
        debug!(pooled = providers.len(), "Opened RPC provider");
        Ok(provider)
    }

    /// Number of distinct endpoints connected so far.
    pub fn len(&self) -> usize {
        self.providers.lock().map_or(0, |p| p.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Confirm `endpoint` serves the expected chain.
    ///
    /// Used once at startup; a mismatch is a configuration error.
    #[instrument(skip(self))]
    pub async fn verify_chain(&self, endpoint: &str, expected_chain_id: u64) -> Result<()> {
        let provider = self.provider(endpoint).map_err(anyhow::Error::new)?;
        let chain_id = provider
            .get_chain_id()
            .await
            .context("Failed to query chain ID")?;

        if chain_id != expected_chain_id {
            anyhow::bail!("Expected chain_id={expected_chain_id}, endpoint reports {chain_id}");
        }

        info!(chain_id, "Connected to JSON-RPC endpoint");
        Ok(())
    }
}

#[async_trait]
impl ChainReader for RpcPool {
    async fn call(&self, endpoint: &str, to: &str, calldata: Vec<u8>) -> Result<Vec<u8>, FetchError> {
        let address: Address = to
            .parse()
            .map_err(|e| FetchError::Provider(format!("invalid contract address {to}: {e}")))?;
        let provider = self.provider(endpoint)?;

        let request = TransactionRequest::default()
            .to(address)
            .input(Bytes::from(calldata).into());

        let returned = provider.call(&request).await.map_err(classify)?;
        Ok(returned.to_vec())
    }
}

/// Map an alloy transport error onto the fetch taxonomy.
///
/// JSON-RPC error responses (reverts, unknown methods, rate limits) are
/// provider errors; unparseable replies are decode errors; anything that
/// kept a reply from arriving is transport.
fn classify(err: TransportError) -> FetchError {
    match err {
        RpcError::ErrorResp(payload) => {
            FetchError::Provider(format!("rpc error {}: {}", payload.code, payload.message))
        }
        RpcError::DeserError { err, .. } => FetchError::Decode(format!("rpc reply: {err}")),
        RpcError::NullResp => FetchError::Decode("rpc returned null".into()),
        other => FetchError::Transport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_address_is_provider_error() {
        let pool = RpcPool::new();
        let err = pool
            .call("http://127.0.0.1:1", "not-an-address", vec![0x18, 0x16, 0x0d, 0xdd])
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Provider(_)));
    }

    #[test]
    fn test_providers_are_pooled_per_endpoint() {
        let pool = RpcPool::new();
        assert!(pool.is_empty());
        pool.provider("http://127.0.0.1:8545").unwrap();
        pool.provider("http://127.0.0.1:8545").unwrap();
        pool.provider("http://127.0.0.1:8546").unwrap();
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_invalid_url_is_provider_error() {
        let pool = RpcPool::new();
        assert!(matches!(pool.provider("not a url"), Err(FetchError::Provider(_))));
    }
}
