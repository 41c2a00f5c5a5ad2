//! Ecosystem report model.
//!
//! The report is the root aggregate of one aggregation cycle. Every section
//! carries its own `SectionResult`, so a failed section never prevents the
//! others from being populated. Once built the report is immutable.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::RewardEntry;
use super::metric::Figure;
use super::source::SourceId;

/// Named grouping of the final report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionName {
    SupplyInfo,
    CollateralComposition,
    LendingSituation,
    PoolBalances,
    MarketSnapshots,
}

impl SectionName {
    pub const ALL: [Self; 5] = [
        Self::SupplyInfo,
        Self::CollateralComposition,
        Self::LendingSituation,
        Self::PoolBalances,
        Self::MarketSnapshots,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SupplyInfo => "SupplyInfo",
            Self::CollateralComposition => "CollateralComposition",
            Self::LendingSituation => "LendingSituation",
            Self::PoolBalances => "PoolBalances",
            Self::MarketSnapshots => "MarketSnapshots",
        }
    }
}

impl std::fmt::Display for SectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-section outcome: data or an explicit failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SectionResult<T> {
    Ok { data: T },
    Failed { reason: String },
}

impl<T> SectionResult<T> {
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub const fn data(&self) -> Option<&T> {
        match self {
            Self::Ok { data } => Some(data),
            Self::Failed { .. } => None,
        }
    }

    /// Status without the payload.
    pub fn status(&self) -> SectionStatus {
        match self {
            Self::Ok { .. } => SectionStatus::Ok,
            Self::Failed { reason } => SectionStatus::Failed {
                reason: reason.clone(),
            },
        }
    }
}

/// Section status as exposed in `section_results`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SectionStatus {
    Ok,
    Failed { reason: String },
}

impl SectionStatus {
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

// ────────────────────────────────────────────
// Section payloads
// ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSupply {
    pub token: String,
    pub total_supply: Figure,
}

/// Token supplies and the staked/base supply ratio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyInfo {
    pub tokens: Vec<TokenSupply>,
    /// Staked token supply as a percentage of base token supply.
    pub staked_share_pct: Figure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionLine {
    pub entity: String,
    pub app: String,
    pub network: String,
    pub position_type: String,
    pub symbol: Option<String>,
    pub label: Option<String>,
    pub meta_type: Option<String>,
    pub balance_usd: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSummary {
    pub app: String,
    pub network: String,
    pub positions: usize,
    pub total_usd: Figure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaTypeSummary {
    pub meta_type: String,
    pub positions: usize,
    pub total_usd: Figure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub entity: String,
    pub label: String,
    pub total_value_usd: Figure,
    /// Positions sorted by USD balance, largest first.
    pub positions: Vec<PositionLine>,
    pub apps: Vec<AppSummary>,
    pub meta_types: Vec<MetaTypeSummary>,
    pub claimable: Vec<PositionLine>,
    pub claimable_total_usd: Figure,
    /// A page limit was reached; more positions may exist.
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralComposition {
    pub portfolios: Vec<PortfolioSummary>,
}

/// Supply/borrow/liquidity view of one lending entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LendingLine {
    pub entity: String,
    pub label: String,
    pub supply: Figure,
    pub borrow: Figure,
    pub available_liquidity: Figure,
    pub utilization_pct: Figure,
    pub supply_apy_pct: Figure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationLine {
    pub market: String,
    pub pair: String,
    pub enabled: bool,
    pub supply_usd: Figure,
    pub allocation_pct: Figure,
    pub supply_cap: Figure,
    pub market_supply_apy_pct: Figure,
    pub market_utilization_pct: Figure,
}

/// Concentration statistics over a vault's allocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diversification {
    pub markets: usize,
    pub collateral_types: Vec<String>,
    pub largest_allocation_pct: Decimal,
    pub top3_allocation_pct: Decimal,
    /// Herfindahl-Hirschman index on a 0..1 scale.
    pub herfindahl_index: Decimal,
    /// `1 - herfindahl_index`.
    pub diversification_score: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSummary {
    pub entity: String,
    pub name: String,
    pub symbol: String,
    pub asset: String,
    pub total_assets: Figure,
    pub total_assets_usd: Figure,
    pub apy_pct: Figure,
    pub net_apy_pct: Figure,
    pub fee_pct: Figure,
    pub rewards: Vec<RewardEntry>,
    /// Sorted by allocation percentage, largest first.
    pub allocations: Vec<AllocationLine>,
    pub total_allocated_usd: Figure,
    pub allocated_pct: Figure,
    pub diversification: Option<Diversification>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LendingSituation {
    pub lines: Vec<LendingLine>,
    pub vaults: Vec<VaultSummary>,
    pub total_supply_usd: Figure,
    pub total_borrow_usd: Figure,
    pub total_liquidity_usd: Figure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmount {
    pub token: String,
    pub amount: Figure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolLine {
    pub pool: String,
    pub label: String,
    pub balances: Vec<TokenAmount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolBalances {
    pub pools: Vec<PoolLine>,
}

/// Per-market view, rebuilt every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub key: String,
    pub label: String,
    pub collateral_asset: Option<String>,
    pub loan_asset: String,
    pub lltv_pct: Figure,
    pub supply_assets: Figure,
    pub supply_usd: Figure,
    pub borrow_assets: Figure,
    pub borrow_usd: Figure,
    pub liquidity_assets: Figure,
    pub liquidity_usd: Figure,
    pub collateral_usd: Figure,
    pub supply_apy_pct: Figure,
    pub borrow_apy_pct: Figure,
    pub utilization_pct: Figure,
    pub fee_pct: Figure,
    pub rewards: Vec<RewardEntry>,
    pub warnings: Vec<String>,
    pub provenance: Vec<SourceId>,
}

/// How many sources answered this cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTally {
    pub total: usize,
    pub ok: usize,
    pub failed: usize,
    /// Fetched fine but could not be decoded.
    pub rejected: usize,
}

/// Root aggregate handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcosystemReport {
    pub cycle_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub sources: SourceTally,
    pub supply_info: SectionResult<SupplyInfo>,
    pub collateral_composition: SectionResult<CollateralComposition>,
    pub lending_situation: SectionResult<LendingSituation>,
    pub pool_balances: SectionResult<PoolBalances>,
    pub market_snapshots: SectionResult<Vec<MarketSnapshot>>,
}

impl EcosystemReport {
    /// Section name → status mapping.
    pub fn section_results(&self) -> BTreeMap<SectionName, SectionStatus> {
        BTreeMap::from([
            (SectionName::SupplyInfo, self.supply_info.status()),
            (
                SectionName::CollateralComposition,
                self.collateral_composition.status(),
            ),
            (SectionName::LendingSituation, self.lending_situation.status()),
            (SectionName::PoolBalances, self.pool_balances.status()),
            (SectionName::MarketSnapshots, self.market_snapshots.status()),
        ])
    }

    /// Market snapshots, empty when the section failed.
    pub fn snapshots(&self) -> &[MarketSnapshot] {
        self.market_snapshots.data().map_or(&[], Vec::as_slice)
    }

    pub fn failed_sections(&self) -> Vec<SectionName> {
        self.section_results()
            .into_iter()
            .filter(|(_, status)| !status.is_ok())
            .map(|(name, _)| name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_result_status() {
        let ok: SectionResult<u8> = SectionResult::Ok { data: 1 };
        let failed: SectionResult<u8> = SectionResult::Failed {
            reason: "no data".into(),
        };
        assert!(ok.status().is_ok());
        assert_eq!(
            failed.status(),
            SectionStatus::Failed {
                reason: "no data".into()
            }
        );
        assert_eq!(failed.data(), None);
    }

    #[test]
    fn test_section_name_serde() {
        let json = serde_json::to_string(&SectionName::LendingSituation).unwrap();
        assert_eq!(json, "\"lending_situation\"");
        assert_eq!(SectionName::LendingSituation.to_string(), "LendingSituation");
    }
}
