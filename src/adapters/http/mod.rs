//! HTTP Adapters - Shared Provider Transport
//!
//! One reqwest client serves every off-chain provider; GraphQL and REST
//! adapters depend on the `HttpTransport` port, not on this type.

pub mod client;
pub mod status;

pub use client::{HttpClientConfig, ReqwestTransport};
pub use status::status_error;
