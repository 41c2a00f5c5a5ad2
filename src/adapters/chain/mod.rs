//! Chain Adapters - Read-only Contract Access
//!
//! Provides on-chain reads via alloy-rs 0.9 for:
//! - JSON-RPC provider pooling per endpoint
//! - `uint256` / `uint256[]` view calls with decimal scaling

pub mod contract_reader;
pub mod provider;

pub use contract_reader::OnChainAdapter;
pub use provider::RpcPool;
