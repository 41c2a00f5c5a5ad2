//! Chain Reader Port - Read-only JSON-RPC Calls
//!
//! The on-chain adapter encodes calldata and decodes return data itself;
//! this port only moves bytes to a contract via `eth_call` and back.

use async_trait::async_trait;

use crate::domain::observation::FetchError;

/// Executes a read-only `eth_call` against a JSON-RPC endpoint.
#[async_trait]
pub trait ChainReader: Send + Sync + 'static {
  /// Call `to` with `calldata` at the latest block and return the raw
  /// return data.
  async fn call(&self, endpoint: &str, to: &str, calldata: Vec<u8>) -> Result<Vec<u8>, FetchError>;
}

#[async_trait]
impl<R: ChainReader + ?Sized> ChainReader for std::sync::Arc<R> {
  async fn call(&self, endpoint: &str, to: &str, calldata: Vec<u8>) -> Result<Vec<u8>, FetchError> {
    (**self).call(endpoint, to, calldata).await
  }
}
