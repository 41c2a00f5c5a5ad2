//! Source specifications.
//!
//! A `SourceSpec` identifies one queryable provider: which adapter family
//! serves it, where it lives, which report section it feeds, and the
//! data-described query to send. Specs are built once from configuration
//! and never mutated afterwards.

use serde::{Deserialize, Serialize};

use super::report::SectionName;

/// Stable string key identifying one configured source.
pub type SourceId = String;

/// Adapter family that serves a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Read-only `eth_call` against a JSON-RPC endpoint.
    OnChainContract,
    /// Lending-market GraphQL provider (markets, vaults).
    #[serde(rename = "graphql_market")]
    GraphQlMarket,
    /// Portfolio / position GraphQL provider.
    #[serde(rename = "graphql_portfolio")]
    GraphQlPortfolio,
    /// Vault REST endpoint returning bigint-encoded JSON.
    RestVault,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OnChainContract => write!(f, "on_chain_contract"),
            Self::GraphQlMarket => write!(f, "graphql_market"),
            Self::GraphQlPortfolio => write!(f, "graphql_portfolio"),
            Self::RestVault => write!(f, "rest_vault"),
        }
    }
}

/// Unit a normalized value is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    /// US dollars.
    Usd,
    /// Whole tokens of the entity's asset (already decimal-scaled).
    Token,
    /// Percentage points (25 means 25%).
    Percent,
}

/// ABI return type of a contract view function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
    /// A single `uint256`.
    Uint256,
    /// A dynamic `uint256[]`.
    Uint256Array,
}

/// Binds one returned `uint256` to a named metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputBinding {
    /// Metric name the scaled value is reported under.
    pub metric: String,
    /// Token decimal count used to scale the raw integer.
    pub decimals: u32,
    /// Unit of the scaled value.
    pub unit: Unit,
}

/// A read-only contract call: function selector plus `uint256` arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCall {
    /// Contract address (hex, checksummed or not).
    pub address: String,
    /// Canonical function signature, e.g. `totalSupply()`.
    pub signature: String,
    /// Decimal `uint256` arguments, in order.
    pub args: Vec<String>,
    /// Declared return type.
    pub returns: ReturnKind,
    /// One binding per returned element.
    pub outputs: Vec<OutputBinding>,
}

/// Response shapes understood by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseShape {
    /// `marketByUniqueKey` lending-market query.
    MarketByKey,
    /// `vaultByAddress` allocation query.
    VaultAllocation,
    /// `portfolioV2` app-balance query.
    Portfolio,
    /// Euler classic vault REST payload.
    EulerVault,
}

impl ResponseShape {
    /// The source kind that serves this shape.
    pub const fn kind(self) -> SourceKind {
        match self {
            Self::MarketByKey | Self::VaultAllocation => SourceKind::GraphQlMarket,
            Self::Portfolio => SourceKind::GraphQlPortfolio,
            Self::EulerVault => SourceKind::RestVault,
        }
    }
}

/// Reference to an API key held outside the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyRef {
    /// Header the key is sent in.
    pub header: String,
    /// Environment variable holding the key.
    pub env: String,
}

/// A GraphQL document plus its variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQlQuery {
    /// Expected response shape.
    pub shape: ResponseShape,
    /// GraphQL document text.
    pub document: String,
    /// Query variables.
    pub variables: serde_json::Map<String, serde_json::Value>,
    /// Optional API key reference.
    pub auth: Option<ApiKeyRef>,
    /// `first: N` page limits in document order (outermost list first).
    #[serde(default)]
    pub page_limits: Vec<usize>,
}

/// A plain GET against a REST endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestQuery {
    /// Expected response shape.
    pub shape: ResponseShape,
    /// Decimal count of the base-unit integers in the payload.
    pub decimals: u32,
}

/// Provider-specific query parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceQuery {
    /// On-chain view call.
    Contract(ContractCall),
    /// GraphQL request.
    #[serde(rename = "graphql")]
    GraphQl(GraphQlQuery),
    /// REST GET.
    Rest(RestQuery),
}

impl SourceQuery {
    /// Source kind implied by this query.
    pub const fn kind(&self) -> SourceKind {
        match self {
            Self::Contract(_) => SourceKind::OnChainContract,
            Self::GraphQl(q) => q.shape.kind(),
            Self::Rest(q) => q.shape.kind(),
        }
    }
}

/// One queryable provider. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Stable key.
    pub id: SourceId,
    /// Adapter family.
    pub kind: SourceKind,
    /// Report section this source feeds.
    pub section: SectionName,
    /// Entity the source reports on (symbol, address or market key).
    pub entity: String,
    /// Human-readable label for the entity.
    pub label: Option<String>,
    /// RPC URL, GraphQL endpoint or REST URL.
    pub endpoint: String,
    /// Query parameters.
    pub query: SourceQuery,
}

impl SourceSpec {
    /// Display label, falling back to the entity key.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_kind_mapping() {
        assert_eq!(ResponseShape::MarketByKey.kind(), SourceKind::GraphQlMarket);
        assert_eq!(ResponseShape::VaultAllocation.kind(), SourceKind::GraphQlMarket);
        assert_eq!(ResponseShape::Portfolio.kind(), SourceKind::GraphQlPortfolio);
        assert_eq!(ResponseShape::EulerVault.kind(), SourceKind::RestVault);
    }

    #[test]
    fn test_source_kind_serde_names() {
        let json = serde_json::to_string(&SourceKind::GraphQlMarket).unwrap();
        assert_eq!(json, "\"graphql_market\"");
        let kind: SourceKind = serde_json::from_str("\"on_chain_contract\"").unwrap();
        assert_eq!(kind, SourceKind::OnChainContract);
    }
}
