//! Report Assembler - Normalized Metrics to EcosystemReport
//!
//! Builds the five report sections from one cycle's `NormalizedBatch`.
//! Each section is judged on its own: it is `Ok` when at least one of the
//! entities configured for it produced a metric, `Failed` otherwise with
//! the list of entities that produced nothing. Derived figures (supply
//! ratio, liquidity, utilization, allocation shares) are computed only
//! from known operands and are otherwise reported absent with a reason.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::domain::entity::{AllocationInfo, EntityDescriptor, EntityInfo, MarketInfo, PositionInfo, VaultInfo};
use crate::domain::metric::{Figure, Metric, names};
use crate::domain::report::{
  AllocationLine, AppSummary, CollateralComposition, Diversification, EcosystemReport, LendingLine,
  LendingSituation, MarketSnapshot, MetaTypeSummary, PoolBalances, PoolLine, PortfolioSummary, PositionLine,
  SectionName, SectionResult, SupplyInfo, TokenAmount, TokenSupply, VaultSummary,
};
use crate::domain::scaling::{checked_sum, ratio_percent};
use crate::domain::source::{ResponseShape, SourceQuery, SourceSpec, Unit};

use super::normalizer::NormalizedBatch;

/// Claimable rewards at or below this USD balance are dust.
const CLAIMABLE_DUST_USD: Decimal = dec!(0.01);
const CLAIMABLE: &str = "CLAIMABLE";
const ZERO_DENOMINATOR: &str = "denominator is zero";
const SUM_OVERFLOW: &str = "sum out of range";

/// An entity a section expects data for.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Expected {
  entity: String,
  label: String,
}

/// Which entities each section expects, derived from the source list.
#[derive(Debug, Clone, Default)]
pub struct ReportLayout {
  expected: BTreeMap<SectionName, Vec<Expected>>,
  base_token: String,
  staked_token: String,
}

impl ReportLayout {
  /// Group source entities by section. Market and vault queries also feed
  /// `MarketSnapshots`.
  pub fn from_specs(specs: &[SourceSpec], base_token: &str, staked_token: &str) -> Self {
    let mut layout = Self {
      expected: BTreeMap::new(),
      base_token: base_token.to_string(),
      staked_token: staked_token.to_string(),
    };
    for spec in specs {
      layout.expect(spec.section, spec);
      let lending_query = matches!(
        &spec.query,
        SourceQuery::GraphQl(q) if matches!(q.shape, ResponseShape::MarketByKey | ResponseShape::VaultAllocation)
      );
      if lending_query {
        layout.expect(SectionName::MarketSnapshots, spec);
      }
    }
    layout
  }

  fn expect(&mut self, section: SectionName, spec: &SourceSpec) {
    let entries = self.expected.entry(section).or_default();
    if !entries.iter().any(|e| e.entity == spec.entity) {
      entries.push(Expected {
        entity: spec.entity.clone(),
        label: spec.display_label().to_string(),
      });
    }
  }

  fn expected(&self, section: SectionName) -> &[Expected] {
    self.expected.get(&section).map_or(&[], Vec::as_slice)
  }
}

/// Composes `EcosystemReport`s.
#[derive(Debug, Clone)]
pub struct ReportAssembler {
  layout: ReportLayout,
}

impl ReportAssembler {
  pub const fn new(layout: ReportLayout) -> Self {
    Self { layout }
  }

  /// Build the report for one cycle. Never fails: sections without data
  /// are marked `Failed`.
  #[instrument(skip_all, fields(cycle = %cycle_id))]
  pub fn assemble(&self, cycle_id: Uuid, batch: &NormalizedBatch, now: DateTime<Utc>) -> EcosystemReport {
    let snapshots = market_snapshots(batch);
    let market_snapshots = if snapshots.is_empty() {
      SectionResult::Failed {
        reason: self.missing_reason(SectionName::MarketSnapshots, batch),
      }
    } else {
      SectionResult::Ok { data: snapshots }
    };

    let report = EcosystemReport {
      cycle_id,
      generated_at: now,
      sources: batch.tally,
      supply_info: self.section(SectionName::SupplyInfo, batch, || self.supply_info(batch)),
      collateral_composition: self.section(SectionName::CollateralComposition, batch, || {
        collateral_composition(batch)
      }),
      lending_situation: self.section(SectionName::LendingSituation, batch, || lending_situation(batch)),
      pool_balances: self.section(SectionName::PoolBalances, batch, || self.pool_balances(batch)),
      market_snapshots,
    };
    debug!(failed = ?report.failed_sections(), "Report assembled");
    report
  }

  fn section<T>(&self, section: SectionName, batch: &NormalizedBatch, build: impl FnOnce() -> T) -> SectionResult<T> {
    let populated = self
      .layout
      .expected(section)
      .iter()
      .any(|e| batch.has_metrics(&e.entity));
    if populated {
      SectionResult::Ok { data: build() }
    } else {
      SectionResult::Failed {
        reason: self.missing_reason(section, batch),
      }
    }
  }

  fn missing_reason(&self, section: SectionName, batch: &NormalizedBatch) -> String {
    let expected = self.layout.expected(section);
    if expected.is_empty() {
      return "no sources configured".to_string();
    }
    let missing: Vec<&str> = expected
      .iter()
      .filter(|e| !batch.has_metrics(&e.entity))
      .map(|e| e.label.as_str())
      .collect();
    format!("no data from: {}", missing.join(", "))
  }

  fn supply_info(&self, batch: &NormalizedBatch) -> SupplyInfo {
    let supply_of = |entity: &str| figure(batch.metric(entity, names::TOTAL_SUPPLY), "supply not reported");

    let tokens = self
      .layout
      .expected(SectionName::SupplyInfo)
      .iter()
      .map(|e| TokenSupply {
        token: e.label.clone(),
        total_supply: supply_of(&e.entity),
      })
      .collect();

    let base = supply_of(&self.layout.base_token);
    let staked = supply_of(&self.layout.staked_token);
    let staked_share_pct = if base.is_known() && staked.is_known() {
      Figure::derive(&staked, &base, Unit::Percent, ZERO_DENOMINATOR, ratio_percent)
    } else {
      Figure::absent(format!(
        "needs {} and {} supply",
        self.layout.staked_token, self.layout.base_token
      ))
    };

    SupplyInfo {
      tokens,
      staked_share_pct,
    }
  }

  fn pool_balances(&self, batch: &NormalizedBatch) -> PoolBalances {
    let pools = self
      .layout
      .expected(SectionName::PoolBalances)
      .iter()
      .filter(|e| batch.has_metrics(&e.entity))
      .map(|e| PoolLine {
        pool: e.entity.clone(),
        label: batch
          .descriptor(&e.entity)
          .map_or_else(|| e.label.clone(), |d| d.label().to_string()),
        balances: batch
          .entity_metrics(&e.entity)
          .map(|m| TokenAmount {
            token: m.name.clone(),
            amount: m.figure(),
          })
          .collect(),
      })
      .collect();
    PoolBalances { pools }
  }
}

// ────────────────────────────────────────────
// Figure helpers
// ────────────────────────────────────────────

fn figure(metric: Option<&Metric>, reason: &str) -> Figure {
  metric.map_or_else(|| Figure::absent(reason), Metric::figure)
}

fn first_known(batch: &NormalizedBatch, entity: &str, candidates: &[&str]) -> Figure {
  candidates
    .iter()
    .find_map(|name| batch.metric(entity, name))
    .map_or_else(|| Figure::absent("not reported"), Metric::figure)
}

fn same_unit(a: &Figure, b: &Figure) -> bool {
  a.unit().is_some() && a.unit() == b.unit()
}

/// Sum of the known USD figures; absent when there are none or the sum
/// does not fit a `Decimal`.
fn total_usd<'f>(figures: impl Iterator<Item = &'f Figure>) -> Figure {
  let mut sum = Some(Decimal::ZERO);
  let mut provenance = BTreeSet::new();
  let mut any = false;
  for figure in figures.filter(|f| f.unit() == Some(Unit::Usd)) {
    if let Some(value) = figure.value() {
      sum = sum.and_then(|s| s.checked_add(value));
      provenance.extend(figure.provenance().iter().cloned());
      any = true;
    }
  }
  match sum {
    _ if !any => Figure::absent("no USD figures reported"),
    Some(value) => Figure::Known {
      value,
      unit: Unit::Usd,
      provenance: provenance.into_iter().collect(),
    },
    None => Figure::absent(SUM_OVERFLOW),
  }
}

/// USD total of a group of position lines.
fn positions_usd(batch: &NormalizedBatch, lines: &[&PositionLine]) -> Figure {
  let balances: Vec<Figure> = lines
    .iter()
    .filter_map(|line| batch.metric(&line.entity, names::BALANCE_USD))
    .map(Metric::figure)
    .collect();
  total_usd(balances.iter())
}

// ────────────────────────────────────────────
// LendingSituation
// ────────────────────────────────────────────

fn lending_line(batch: &NormalizedBatch, entity: &str) -> LendingLine {
  let usd = batch.metric(entity, names::SUPPLY_USD).is_some();
  let (supply_names, borrow_name, liquidity_name) = if usd {
    (&[names::SUPPLY_USD][..], names::BORROW_USD, names::LIQUIDITY_USD)
  } else {
    (&[names::SUPPLY_ASSETS, names::TOTAL_SUPPLY][..], names::BORROW_ASSETS, names::LIQUIDITY_ASSETS)
  };

  let supply = first_known(batch, entity, supply_names);
  let borrow = first_known(batch, entity, &[borrow_name]);

  let available_liquidity = batch.metric(entity, liquidity_name).map_or_else(
    || {
      if same_unit(&supply, &borrow) {
        Figure::derive(&supply, &borrow, supply.unit().unwrap_or(Unit::Token), "not derivable", |s, b| {
          s.checked_sub(b)
        })
      } else {
        Figure::absent("needs supply and borrow")
      }
    },
    Metric::figure,
  );

  let utilization_pct = batch.metric(entity, names::UTILIZATION_PCT).map_or_else(
    || {
      if same_unit(&supply, &borrow) {
        Figure::derive(&borrow, &supply, Unit::Percent, ZERO_DENOMINATOR, ratio_percent)
      } else {
        Figure::absent("needs supply and borrow")
      }
    },
    Metric::figure,
  );

  LendingLine {
    entity: entity.to_string(),
    label: batch
      .descriptor(entity)
      .map_or_else(|| entity.to_string(), |d| d.label().to_string()),
    supply,
    borrow,
    available_liquidity,
    utilization_pct,
    supply_apy_pct: figure(batch.metric(entity, names::SUPPLY_APY_PCT), "not reported"),
  }
}

fn allocation_line(batch: &NormalizedBatch, entity: &str, info: &AllocationInfo, total_usd: &Figure) -> AllocationLine {
  let supply_usd = figure(batch.metric(entity, names::ALLOCATION_USD), "not reported");
  let allocation_pct = if total_usd.is_known() {
    Figure::derive(&supply_usd, total_usd, Unit::Percent, ZERO_DENOMINATOR, ratio_percent)
  } else {
    Figure::absent("vault total not reported")
  };
  AllocationLine {
    market: info.market.clone(),
    pair: info.pair.clone(),
    enabled: info.enabled,
    supply_usd,
    allocation_pct,
    supply_cap: figure(batch.metric(entity, names::SUPPLY_CAP), "not reported"),
    market_supply_apy_pct: figure(batch.metric(&info.market, names::SUPPLY_APY_PCT), "not reported"),
    market_utilization_pct: figure(batch.metric(&info.market, names::UTILIZATION_PCT), "not reported"),
  }
}

/// Concentration over allocation shares, largest first. `None` without
/// shares or when the index does not fit a `Decimal`.
fn diversification(lines: &[AllocationLine], allocations: &[&AllocationInfo]) -> Option<Diversification> {
  let shares: Vec<Decimal> = lines.iter().filter_map(|l| l.allocation_pct.value()).collect();
  if shares.is_empty() {
    return None;
  }
  let herfindahl_index = checked_sum(
    shares
      .iter()
      .map(|&pct| {
        let fraction = pct / dec!(100);
        fraction.checked_mul(fraction)
      })
      .collect::<Option<Vec<Decimal>>>()?,
  )?;
  let top3_allocation_pct = checked_sum(shares.iter().take(3).copied())?;
  let collateral_types: BTreeSet<String> = allocations
    .iter()
    .filter_map(|a| a.collateral_asset.clone())
    .collect();

  Some(Diversification {
    markets: lines.len(),
    collateral_types: collateral_types.into_iter().collect(),
    largest_allocation_pct: shares[0],
    top3_allocation_pct,
    herfindahl_index,
    diversification_score: Decimal::ONE.checked_sub(herfindahl_index)?,
  })
}

fn vault_summary(batch: &NormalizedBatch, descriptor: &EntityDescriptor, info: &VaultInfo) -> VaultSummary {
  let entity = descriptor.entity.as_str();
  let total_assets_usd = figure(batch.metric(entity, names::TOTAL_ASSETS_USD), "not reported");

  let allocations: Vec<(&str, &AllocationInfo)> = batch
    .descriptors()
    .filter_map(|d| match &d.info {
      EntityInfo::Allocation(a) if a.vault == entity => Some((d.entity.as_str(), a)),
      _ => None,
    })
    .collect();

  let mut lines: Vec<(AllocationLine, &AllocationInfo)> = allocations
    .iter()
    .map(|(key, a)| (allocation_line(batch, key, a, &total_assets_usd), *a))
    .collect();
  lines.sort_by(|(a, _), (b, _)| {
    b.allocation_pct
      .value()
      .cmp(&a.allocation_pct.value())
      .then_with(|| a.market.cmp(&b.market))
  });
  let (lines, infos): (Vec<AllocationLine>, Vec<&AllocationInfo>) = lines.into_iter().unzip();

  let total_allocated_usd = total_usd(lines.iter().map(|l| &l.supply_usd));
  let allocated_pct = if total_allocated_usd.is_known() && total_assets_usd.is_known() {
    Figure::derive(&total_allocated_usd, &total_assets_usd, Unit::Percent, ZERO_DENOMINATOR, ratio_percent)
  } else {
    Figure::absent("needs allocation and vault totals")
  };

  VaultSummary {
    entity: entity.to_string(),
    name: info.name.clone(),
    symbol: info.symbol.clone(),
    asset: info.asset.clone(),
    total_assets: figure(batch.metric(entity, names::TOTAL_ASSETS), "not reported"),
    apy_pct: figure(batch.metric(entity, names::APY_PCT), "not reported"),
    net_apy_pct: figure(batch.metric(entity, names::NET_APY_PCT), "not reported"),
    fee_pct: figure(batch.metric(entity, names::FEE_PCT), "not reported"),
    rewards: info.rewards.clone(),
    diversification: diversification(&lines, &infos),
    allocations: lines,
    total_allocated_usd,
    allocated_pct,
    total_assets_usd,
  }
}

fn lending_situation(batch: &NormalizedBatch) -> LendingSituation {
  let entities: BTreeSet<&str> = batch
    .metrics()
    .filter(|m| m.section == SectionName::LendingSituation)
    .map(|m| m.entity.as_str())
    .collect();

  let lines: Vec<LendingLine> = entities
    .into_iter()
    .filter(|entity| {
      !matches!(
        batch.descriptor(entity).map(|d| &d.info),
        Some(EntityInfo::Vault(_) | EntityInfo::Allocation(_))
      )
    })
    .map(|entity| lending_line(batch, entity))
    .collect();

  let vaults = batch
    .descriptors()
    .filter_map(|d| match &d.info {
      EntityInfo::Vault(info) if batch.has_metrics(&d.entity) => Some(vault_summary(batch, d, info)),
      _ => None,
    })
    .collect();

  LendingSituation {
    total_supply_usd: total_usd(lines.iter().map(|l| &l.supply)),
    total_borrow_usd: total_usd(lines.iter().map(|l| &l.borrow)),
    total_liquidity_usd: total_usd(lines.iter().map(|l| &l.available_liquidity)),
    lines,
    vaults,
  }
}

// ────────────────────────────────────────────
// CollateralComposition
// ────────────────────────────────────────────

fn position_line(batch: &NormalizedBatch, entity: &str, info: &PositionInfo) -> Option<PositionLine> {
  let balance = batch.metric(entity, names::BALANCE_USD)?;
  Some(PositionLine {
    entity: entity.to_string(),
    app: info.app.clone(),
    network: info.network.clone(),
    position_type: info.position_type.clone(),
    symbol: info.symbol.clone(),
    label: info.label.clone(),
    meta_type: info.meta_type.clone(),
    balance_usd: balance.value,
  })
}

fn portfolio_summary(entity: &str, label: &str, truncated: bool, batch: &NormalizedBatch) -> PortfolioSummary {
  let mut positions: Vec<PositionLine> = batch
    .descriptors()
    .filter_map(|d| match &d.info {
      EntityInfo::Position(p) if p.portfolio == entity => position_line(batch, &d.entity, p),
      _ => None,
    })
    .collect();
  positions.sort_by(|a, b| b.balance_usd.cmp(&a.balance_usd).then_with(|| a.entity.cmp(&b.entity)));

  let mut apps: BTreeMap<(String, String), Vec<&PositionLine>> = BTreeMap::new();
  let mut meta_types: BTreeMap<String, Vec<&PositionLine>> = BTreeMap::new();
  for line in &positions {
    apps.entry((line.app.clone(), line.network.clone())).or_default().push(line);
    if let Some(meta_type) = &line.meta_type {
      meta_types.entry(meta_type.clone()).or_default().push(line);
    }
  }

  let mut apps: Vec<AppSummary> = apps
    .into_iter()
    .map(|((app, network), lines)| AppSummary {
      app,
      network,
      positions: lines.len(),
      total_usd: positions_usd(batch, &lines),
    })
    .collect();
  apps.sort_by(|a, b| {
    b.total_usd
      .value()
      .cmp(&a.total_usd.value())
      .then_with(|| a.app.cmp(&b.app))
  });

  let meta_types = meta_types
    .into_iter()
    .map(|(meta_type, lines)| MetaTypeSummary {
      meta_type,
      positions: lines.len(),
      total_usd: positions_usd(batch, &lines),
    })
    .collect();

  let claimable: Vec<PositionLine> = positions
    .iter()
    .filter(|p| p.meta_type.as_deref() == Some(CLAIMABLE) && p.balance_usd > CLAIMABLE_DUST_USD)
    .cloned()
    .collect();
  let claimable_total_usd = if claimable.is_empty() {
    Figure::Known {
      value: Decimal::ZERO,
      unit: Unit::Usd,
      provenance: Vec::new(),
    }
  } else {
    positions_usd(batch, &claimable.iter().collect::<Vec<_>>())
  };

  PortfolioSummary {
    entity: entity.to_string(),
    label: label.to_string(),
    total_value_usd: figure(batch.metric(entity, names::TOTAL_VALUE_USD), "not reported"),
    positions,
    apps,
    meta_types,
    claimable,
    claimable_total_usd,
    truncated,
  }
}

fn collateral_composition(batch: &NormalizedBatch) -> CollateralComposition {
  let portfolios = batch
    .descriptors()
    .filter_map(|d| match &d.info {
      EntityInfo::Portfolio(p) => Some(portfolio_summary(&d.entity, &p.label, p.truncated, batch)),
      _ => None,
    })
    .collect();
  CollateralComposition { portfolios }
}

// ────────────────────────────────────────────
// MarketSnapshots
// ────────────────────────────────────────────

fn snapshot(batch: &NormalizedBatch, descriptor: &EntityDescriptor, info: &MarketInfo) -> MarketSnapshot {
  let key = descriptor.entity.as_str();
  let get = |name: &str| figure(batch.metric(key, name), "not reported");

  let mut provenance: BTreeSet<String> = descriptor.provenance.iter().cloned().collect();
  for metric in batch.entity_metrics(key) {
    provenance.extend(metric.provenance.iter().cloned());
  }

  MarketSnapshot {
    key: key.to_string(),
    label: info.label.clone(),
    collateral_asset: info.collateral_asset.clone(),
    loan_asset: info.loan_asset.clone(),
    lltv_pct: get(names::LLTV_PCT),
    supply_assets: get(names::SUPPLY_ASSETS),
    supply_usd: get(names::SUPPLY_USD),
    borrow_assets: get(names::BORROW_ASSETS),
    borrow_usd: get(names::BORROW_USD),
    liquidity_assets: get(names::LIQUIDITY_ASSETS),
    liquidity_usd: get(names::LIQUIDITY_USD),
    collateral_usd: get(names::COLLATERAL_USD),
    supply_apy_pct: get(names::SUPPLY_APY_PCT),
    borrow_apy_pct: get(names::BORROW_APY_PCT),
    utilization_pct: get(names::UTILIZATION_PCT),
    fee_pct: get(names::FEE_PCT),
    rewards: info.rewards.clone(),
    warnings: info.warnings.clone(),
    provenance: provenance.into_iter().collect(),
  }
}

/// One snapshot per market descriptor that has metrics, ordered by key.
fn market_snapshots(batch: &NormalizedBatch) -> Vec<MarketSnapshot> {
  batch
    .descriptors()
    .filter_map(|d| match &d.info {
      EntityInfo::Market(info) if batch.has_metrics(&d.entity) => Some(snapshot(batch, d, info)),
      _ => None,
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use rust_decimal_macros::dec;
  use serde_json::json;

  use super::*;
  use crate::domain::observation::Observation;
  use crate::domain::report::SectionStatus;
  use crate::domain::source::{ContractCall, OutputBinding, ReturnKind, SourceKind};
  use crate::usecases::normalizer::Normalizer;

  fn contract(id: &str, section: SectionName, entity: &str, metric: &str) -> SourceSpec {
    SourceSpec {
      id: id.into(),
      kind: SourceKind::OnChainContract,
      section,
      entity: entity.into(),
      label: Some(entity.into()),
      endpoint: "http://localhost:8545".into(),
      query: SourceQuery::Contract(ContractCall {
        address: "0x0000000000000000000000000000000000000001".into(),
        signature: "totalSupply()".into(),
        args: vec![],
        returns: ReturnKind::Uint256,
        outputs: vec![OutputBinding {
          metric: metric.into(),
          decimals: 18,
          unit: Unit::Token,
        }],
      }),
    }
  }

  fn reading(id: &str, entity: &str, metric: &str, value: Decimal) -> Observation {
    Observation::ok(
      id,
      json!({
        "entity": entity,
        "address": "0x0000000000000000000000000000000000000001",
        "signature": "totalSupply()",
        "readings": [{ "metric": metric, "unit": "token", "raw": "0", "decimals": 18, "value": value }],
      }),
    )
    .at(Utc.timestamp_opt(1_750_000_000, 0).unwrap())
  }

  fn supply_specs() -> Vec<SourceSpec> {
    vec![
      contract("lvlusd-supply", SectionName::SupplyInfo, "lvlUSD", names::TOTAL_SUPPLY),
      contract("slvlusd-supply", SectionName::SupplyInfo, "slvlUSD", names::TOTAL_SUPPLY),
    ]
  }

  fn assemble(specs: &[SourceSpec], observations: &[Observation]) -> EcosystemReport {
    let batch = Normalizer::new(specs).normalize(observations);
    let assembler = ReportAssembler::new(ReportLayout::from_specs(specs, "lvlUSD", "slvlUSD"));
    assembler.assemble(Uuid::nil(), &batch, Utc.timestamp_opt(1_750_000_100, 0).unwrap())
  }

  #[test]
  fn test_staked_share_is_ratio_of_supplies() {
    let report = assemble(
      &supply_specs(),
      &[
        reading("lvlusd-supply", "lvlUSD", names::TOTAL_SUPPLY, dec!(1000000)),
        reading("slvlusd-supply", "slvlUSD", names::TOTAL_SUPPLY, dec!(250000)),
      ],
    );
    let supply = report.supply_info.data().unwrap();
    assert_eq!(supply.staked_share_pct.value(), Some(dec!(25)));
    assert_eq!(supply.staked_share_pct.unit(), Some(Unit::Percent));
    assert_eq!(supply.tokens.len(), 2);
  }

  #[test]
  fn test_staked_share_absent_when_operand_missing() {
    let report = assemble(
      &supply_specs(),
      &[reading("lvlusd-supply", "lvlUSD", names::TOTAL_SUPPLY, dec!(1000000))],
    );
    let supply = report.supply_info.data().unwrap();
    assert!(!supply.staked_share_pct.is_known());
    assert!(!supply.tokens[1].total_supply.is_known());
  }

  #[test]
  fn test_zero_base_supply_is_absent() {
    let report = assemble(
      &supply_specs(),
      &[
        reading("lvlusd-supply", "lvlUSD", names::TOTAL_SUPPLY, Decimal::ZERO),
        reading("slvlusd-supply", "slvlUSD", names::TOTAL_SUPPLY, dec!(5)),
      ],
    );
    let supply = report.supply_info.data().unwrap();
    assert_eq!(supply.staked_share_pct, Figure::absent("denominator is zero"));
  }

  #[test]
  fn test_failed_section_does_not_block_others() {
    let mut specs = supply_specs();
    specs.push(contract("pool", SectionName::PoolBalances, "curve-lvlusd-usdc", "usdc_balance"));
    let report = assemble(
      &specs,
      &[reading("pool", "curve-lvlusd-usdc", "usdc_balance", dec!(12.5))],
    );

    assert_eq!(
      report.section_results()[&SectionName::SupplyInfo],
      SectionStatus::Failed {
        reason: "no data from: lvlUSD, slvlUSD".into()
      }
    );
    let pools = report.pool_balances.data().unwrap();
    assert_eq!(pools.pools[0].balances[0].amount.value(), Some(dec!(12.5)));
    assert_eq!(
      report.section_results()[&SectionName::LendingSituation],
      SectionStatus::Failed {
        reason: "no sources configured".into()
      }
    );
  }

  #[test]
  fn test_liquidity_derived_from_same_unit_operands() {
    let specs = vec![
      contract("aave-supply", SectionName::LendingSituation, "aave-usdc", names::SUPPLY_ASSETS),
      contract("aave-debt", SectionName::LendingSituation, "aave-usdc", names::BORROW_ASSETS),
    ];
    let report = assemble(
      &specs,
      &[
        reading("aave-supply", "aave-usdc", names::SUPPLY_ASSETS, dec!(1000)),
        reading("aave-debt", "aave-usdc", names::BORROW_ASSETS, dec!(600)),
      ],
    );
    let lending = report.lending_situation.data().unwrap();
    let line = &lending.lines[0];
    assert_eq!(line.available_liquidity.value(), Some(dec!(400)));
    assert_eq!(line.utilization_pct.value(), Some(dec!(60)));
    assert_eq!(
      line.available_liquidity.provenance(),
      ["aave-debt".to_string(), "aave-supply".to_string()]
    );
    // Token-denominated lines stay out of USD totals.
    assert!(!lending.total_supply_usd.is_known());
  }

  #[test]
  fn test_liquidity_absent_without_borrow() {
    let specs = vec![contract("aave-supply", SectionName::LendingSituation, "aave-usdc", names::SUPPLY_ASSETS)];
    let report = assemble(&specs, &[reading("aave-supply", "aave-usdc", names::SUPPLY_ASSETS, dec!(1000))]);
    let line = &report.lending_situation.data().unwrap().lines[0];
    assert!(line.supply.is_known());
    assert!(!line.available_liquidity.is_known());
  }

  #[test]
  fn test_diversification_statistics() {
    let info = |market: &str, collateral: &str| AllocationInfo {
      vault: "v".into(),
      market: market.into(),
      pair: format!("{collateral}/USDC"),
      collateral_asset: Some(collateral.into()),
      enabled: true,
    };
    let line = |market: &str, pct: Decimal| AllocationLine {
      market: market.into(),
      pair: String::new(),
      enabled: true,
      supply_usd: Figure::absent("x"),
      allocation_pct: Figure::Known {
        value: pct,
        unit: Unit::Percent,
        provenance: vec![],
      },
      supply_cap: Figure::absent("x"),
      market_supply_apy_pct: Figure::absent("x"),
      market_utilization_pct: Figure::absent("x"),
    };
    let infos = [info("a", "WBTC"), info("b", "cbBTC"), info("c", "WBTC")];
    let refs: Vec<&AllocationInfo> = infos.iter().collect();
    let lines = [line("a", dec!(50)), line("b", dec!(30)), line("c", dec!(20))];

    let stats = diversification(&lines, &refs).unwrap();
    assert_eq!(stats.markets, 3);
    assert_eq!(stats.collateral_types, vec!["WBTC".to_string(), "cbBTC".to_string()]);
    assert_eq!(stats.largest_allocation_pct, dec!(50));
    assert_eq!(stats.top3_allocation_pct, dec!(100));
    assert_eq!(stats.herfindahl_index, dec!(0.38));
    assert_eq!(stats.diversification_score, dec!(0.62));
  }

  #[test]
  fn test_usd_total_overflow_is_absent() {
    let usd = |value: Decimal, source: &str| Figure::Known {
      value,
      unit: Unit::Usd,
      provenance: vec![source.into()],
    };
    let figures = [usd(Decimal::MAX, "a"), usd(dec!(1), "b")];
    assert_eq!(total_usd(figures.iter()), Figure::absent(SUM_OVERFLOW));

    let figures = [usd(dec!(2), "a"), Figure::absent("x"), usd(dec!(3), "b")];
    assert_eq!(total_usd(figures.iter()).value(), Some(dec!(5)));
  }

  #[test]
  fn test_diversification_out_of_range_is_omitted() {
    let line = |market: &str, pct: Decimal| AllocationLine {
      market: market.into(),
      pair: String::new(),
      enabled: true,
      supply_usd: Figure::absent("x"),
      allocation_pct: Figure::Known {
        value: pct,
        unit: Unit::Percent,
        provenance: vec![],
      },
      supply_cap: Figure::absent("x"),
      market_supply_apy_pct: Figure::absent("x"),
      market_utilization_pct: Figure::absent("x"),
    };
    let lines = [line("a", Decimal::MAX), line("b", dec!(1))];
    assert!(diversification(&lines, &[]).is_none());
  }

  #[test]
  fn test_portfolio_groups_carry_usd_totals() {
    let spec = SourceSpec {
      id: "zapper".into(),
      kind: SourceKind::GraphQlPortfolio,
      section: SectionName::CollateralComposition,
      entity: "0xwallet".into(),
      label: Some("treasury".into()),
      endpoint: "https://example.invalid/graphql".into(),
      query: SourceQuery::GraphQl(crate::domain::source::GraphQlQuery {
        shape: ResponseShape::Portfolio,
        document: String::new(),
        variables: serde_json::Map::new(),
        auth: None,
        page_limits: vec![],
      }),
    };
    let payload = json!({
      "portfolioV2": { "appBalances": {
        "totalBalanceUSD": 1500.5,
        "byApp": { "edges": [{ "node": {
          "app": { "displayName": "Aave V3", "slug": "aave-v3" },
          "network": { "name": "Ethereum" },
          "positionBalances": { "edges": [
            { "node": { "type": "app-token", "address": "0xa", "symbol": "aEthUSDC", "balanceUSD": 1000 } },
            { "node": { "type": "contract-position", "address": "0xc", "tokens": [
              { "metaType": "SUPPLIED", "token": { "symbol": "USDC", "balanceUSD": 500 } },
              { "metaType": "CLAIMABLE", "token": { "symbol": "AAVE", "balanceUSD": 0.5 } }
            ] } }
          ] }
        } }] }
      } }
    });
    let specs = [spec];
    let report = assemble(&specs, &[Observation::ok("zapper", payload)]);

    let portfolio = &report.collateral_composition.data().unwrap().portfolios[0];
    assert_eq!(portfolio.apps[0].total_usd.value(), Some(dec!(1500.5)));
    assert_eq!(portfolio.apps[0].total_usd.provenance(), ["zapper".to_string()]);
    assert_eq!(portfolio.claimable_total_usd.value(), Some(dec!(0.5)));
    let supplied = portfolio.meta_types.iter().find(|m| m.meta_type == "SUPPLIED").unwrap();
    assert_eq!(supplied.total_usd.value(), Some(dec!(500)));
  }
}
