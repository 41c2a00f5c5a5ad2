//! Entity descriptors.
//!
//! Metrics carry numbers; descriptors carry the descriptive fields the
//! report needs alongside them (asset symbols, reward entries, position
//! labels). Each decoded response produces a closed set of descriptor
//! variants keyed by the same entity key as its metrics.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::source::SourceId;

/// A reward stream attached to a market or vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardEntry {
    /// Reward token symbol.
    pub asset: String,
    /// Supply-side APR in percent.
    pub supply_apr_pct: Option<Decimal>,
    /// Borrow-side APR in percent.
    pub borrow_apr_pct: Option<Decimal>,
}

/// Descriptive fields of a lending market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketInfo {
    /// Human-readable market name.
    pub label: String,
    /// Collateral asset symbol (idle markets have none).
    pub collateral_asset: Option<String>,
    /// Loan asset symbol.
    pub loan_asset: String,
    /// Active reward streams.
    pub rewards: Vec<RewardEntry>,
    /// Provider warnings as `type:level`.
    pub warnings: Vec<String>,
}

/// Descriptive fields of a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultInfo {
    pub name: String,
    pub symbol: String,
    /// Underlying asset symbol.
    pub asset: String,
    /// Vault-level reward streams.
    pub rewards: Vec<RewardEntry>,
}

/// One vault allocation into a market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationInfo {
    /// Owning vault entity.
    pub vault: String,
    /// Target market entity.
    pub market: String,
    /// `collateral/loan` pair label.
    pub pair: String,
    /// Collateral symbol, used for diversification.
    pub collateral_asset: Option<String>,
    /// Whether the allocation is enabled.
    pub enabled: bool,
}

/// A portfolio position line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionInfo {
    /// Owning portfolio entity.
    pub portfolio: String,
    pub app: String,
    pub app_slug: String,
    pub network: String,
    /// `app-token` or `contract-position`.
    pub position_type: String,
    pub address: String,
    pub symbol: Option<String>,
    pub label: Option<String>,
    /// Token grouping for contract positions (SUPPLIED, CLAIMABLE, ...).
    pub meta_type: Option<String>,
}

/// Portfolio-level descriptive fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioInfo {
    pub label: String,
    /// Whether any edge list hit the query's page limit.
    pub truncated: bool,
}

/// Closed set of descriptor variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityInfo {
    Market(MarketInfo),
    Vault(VaultInfo),
    Allocation(AllocationInfo),
    Position(PositionInfo),
    Portfolio(PortfolioInfo),
    /// Plain labelled entity (tokens, pools, reserves).
    Labelled { label: String },
}

/// Descriptor plus the bookkeeping needed to merge it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub entity: String,
    pub info: EntityInfo,
    pub provenance: Vec<SourceId>,
    /// Source whose descriptor won the merge.
    pub reported_by: SourceId,
    pub observed_at: DateTime<Utc>,
}

impl EntityDescriptor {
    pub fn new(entity: impl Into<String>, info: EntityInfo, source_id: &str, observed_at: DateTime<Utc>) -> Self {
        Self {
            entity: entity.into(),
            info,
            provenance: vec![source_id.to_string()],
            reported_by: source_id.to_string(),
            observed_at,
        }
    }

    /// Merge precedence: fresher first, then greater source id.
    pub fn rank(&self) -> (DateTime<Utc>, &str) {
        (self.observed_at, self.reported_by.as_str())
    }

    pub fn label(&self) -> &str {
        match &self.info {
            EntityInfo::Market(m) => &m.label,
            EntityInfo::Vault(v) => &v.name,
            EntityInfo::Allocation(a) => &a.pair,
            EntityInfo::Position(p) => p.label.as_deref().unwrap_or(&p.app),
            EntityInfo::Portfolio(p) => &p.label,
            EntityInfo::Labelled { label } => label,
        }
    }
}
