//! REST Adapters - Vault Endpoints

pub mod vault;

pub use vault::RestVaultAdapter;
