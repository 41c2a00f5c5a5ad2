//! Lending-market GraphQL shapes: single markets and vault allocations.
//!
//! Native amounts arrive in the asset's base units and are scaled by the
//! decimals the payload reports for that asset. USD amounts pass through.
//! APY, utilization and fee are fractions and become percentages; LLTV is
//! a WAD fraction (1e18 = 100%).

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::entity::{AllocationInfo, EntityInfo, MarketInfo, RewardEntry, VaultInfo};
use crate::domain::metric::names;
use crate::domain::observation::FetchError;
use crate::domain::scaling::{fraction_to_percent, shift_decimals};
use crate::domain::source::Unit;

use super::values::opt_decimal;
use super::{Sink, parse};

/// WAD has 18 decimals; as a percentage that is 16.
const LLTV_PERCENT_DECIMALS: u32 = 16;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Asset {
  symbol: String,
  #[serde(default)]
  decimals: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RewardAsset {
  symbol: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Reward {
  asset: RewardAsset,
  #[serde(default, deserialize_with = "opt_decimal")]
  supply_apr: Option<Decimal>,
  #[serde(default, deserialize_with = "opt_decimal")]
  borrow_apr: Option<Decimal>,
}

impl Reward {
  fn entry(&self) -> Result<RewardEntry, FetchError> {
    Ok(RewardEntry {
      asset: self.asset.symbol.clone(),
      supply_apr_pct: pct(self.supply_apr)?,
      borrow_apr_pct: pct(self.borrow_apr)?,
    })
  }
}

fn reward_entries(rewards: Option<Vec<Reward>>) -> Result<Vec<RewardEntry>, FetchError> {
  rewards.unwrap_or_default().iter().map(Reward::entry).collect()
}

#[derive(Debug, Deserialize)]
struct Warning {
  #[serde(rename = "type")]
  kind: String,
  level: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketState {
  #[serde(default, deserialize_with = "opt_decimal")]
  collateral_assets: Option<Decimal>,
  #[serde(default, deserialize_with = "opt_decimal")]
  collateral_assets_usd: Option<Decimal>,
  #[serde(default, deserialize_with = "opt_decimal")]
  borrow_assets: Option<Decimal>,
  #[serde(default, deserialize_with = "opt_decimal")]
  borrow_assets_usd: Option<Decimal>,
  #[serde(default, deserialize_with = "opt_decimal")]
  supply_assets: Option<Decimal>,
  #[serde(default, deserialize_with = "opt_decimal")]
  supply_assets_usd: Option<Decimal>,
  #[serde(default, deserialize_with = "opt_decimal")]
  liquidity_assets: Option<Decimal>,
  #[serde(default, deserialize_with = "opt_decimal")]
  liquidity_assets_usd: Option<Decimal>,
  #[serde(default, deserialize_with = "opt_decimal")]
  supply_apy: Option<Decimal>,
  #[serde(default, deserialize_with = "opt_decimal")]
  borrow_apy: Option<Decimal>,
  #[serde(default, deserialize_with = "opt_decimal")]
  fee: Option<Decimal>,
  #[serde(default, deserialize_with = "opt_decimal")]
  utilization: Option<Decimal>,
  #[serde(default)]
  rewards: Option<Vec<Reward>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketNode {
  unique_key: String,
  #[serde(default, deserialize_with = "opt_decimal")]
  lltv: Option<Decimal>,
  loan_asset: Asset,
  #[serde(default)]
  collateral_asset: Option<Asset>,
  #[serde(default)]
  state: Option<MarketState>,
  #[serde(default)]
  warnings: Option<Vec<Warning>>,
}

impl MarketNode {
  fn key(&self) -> String {
    self.unique_key.to_ascii_lowercase()
  }

  fn collateral_symbol(&self) -> Option<String> {
    self.collateral_asset.as_ref().map(|a| a.symbol.clone())
  }

  /// `collateral/loan`, `idle/loan` for markets without collateral.
  fn pair(&self) -> String {
    let collateral = self.collateral_asset.as_ref().map_or("idle", |a| a.symbol.as_str());
    format!("{collateral}/{}", self.loan_asset.symbol)
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketData {
  market_by_unique_key: Option<MarketNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AllocationNode {
  #[serde(default, deserialize_with = "opt_decimal")]
  supply_cap: Option<Decimal>,
  #[serde(default, deserialize_with = "opt_decimal")]
  supply_assets: Option<Decimal>,
  #[serde(default, deserialize_with = "opt_decimal")]
  supply_assets_usd: Option<Decimal>,
  #[serde(default)]
  enabled: bool,
  market: MarketNode,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VaultState {
  #[serde(default, deserialize_with = "opt_decimal")]
  apy: Option<Decimal>,
  #[serde(default, deserialize_with = "opt_decimal")]
  net_apy: Option<Decimal>,
  #[serde(default, deserialize_with = "opt_decimal")]
  total_assets: Option<Decimal>,
  #[serde(default, deserialize_with = "opt_decimal")]
  total_assets_usd: Option<Decimal>,
  #[serde(default, deserialize_with = "opt_decimal")]
  fee: Option<Decimal>,
  #[serde(default)]
  rewards: Option<Vec<Reward>>,
  #[serde(default)]
  allocation: Option<Vec<AllocationNode>>,
}

#[derive(Debug, Deserialize)]
struct VaultNode {
  symbol: String,
  name: String,
  asset: Asset,
  #[serde(default)]
  state: Option<VaultState>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VaultData {
  vault_by_address: Option<VaultNode>,
}

/// Scale a base-unit amount when both the amount and its decimals are known.
fn scaled(amount: Option<Decimal>, decimals: Option<u32>) -> Result<Option<Decimal>, FetchError> {
  match (amount, decimals) {
    (Some(amount), Some(decimals)) => shift_decimals(amount, decimals)
      .map(Some)
      .ok_or_else(|| FetchError::Decode(format!("cannot scale {amount} by {decimals} decimals"))),
    _ => Ok(None),
  }
}

fn pct(fraction: Option<Decimal>) -> Result<Option<Decimal>, FetchError> {
  fraction
    .map(|f| fraction_to_percent(f).ok_or_else(|| FetchError::Decode(format!("fraction {f} out of range"))))
    .transpose()
}

fn emit_market(sink: &mut Sink<'_>, market: MarketNode, label: String) -> Result<(), FetchError> {
  let entity = market.key();
  let collateral_decimals = market.collateral_asset.as_ref().and_then(|a| a.decimals);
  let loan_decimals = market.loan_asset.decimals;
  let collateral_asset = market.collateral_symbol();
  let state = market.state.unwrap_or_default();

  sink.metric(&entity, names::SUPPLY_ASSETS, scaled(state.supply_assets, loan_decimals)?, Unit::Token);
  sink.metric(&entity, names::BORROW_ASSETS, scaled(state.borrow_assets, loan_decimals)?, Unit::Token);
  sink.metric(&entity, names::LIQUIDITY_ASSETS, scaled(state.liquidity_assets, loan_decimals)?, Unit::Token);
  sink.metric(
    &entity,
    names::COLLATERAL_ASSETS,
    scaled(state.collateral_assets, collateral_decimals)?,
    Unit::Token,
  );
  sink.metric(&entity, names::SUPPLY_USD, state.supply_assets_usd, Unit::Usd);
  sink.metric(&entity, names::BORROW_USD, state.borrow_assets_usd, Unit::Usd);
  sink.metric(&entity, names::LIQUIDITY_USD, state.liquidity_assets_usd, Unit::Usd);
  sink.metric(&entity, names::COLLATERAL_USD, state.collateral_assets_usd, Unit::Usd);
  sink.metric(&entity, names::SUPPLY_APY_PCT, pct(state.supply_apy)?, Unit::Percent);
  sink.metric(&entity, names::BORROW_APY_PCT, pct(state.borrow_apy)?, Unit::Percent);
  sink.metric(&entity, names::UTILIZATION_PCT, pct(state.utilization)?, Unit::Percent);
  sink.metric(&entity, names::FEE_PCT, pct(state.fee)?, Unit::Percent);
  sink.metric(
    &entity,
    names::LLTV_PCT,
    market.lltv.and_then(|l| shift_decimals(l, LLTV_PERCENT_DECIMALS)),
    Unit::Percent,
  );

  let info = MarketInfo {
    label,
    collateral_asset,
    loan_asset: market.loan_asset.symbol.clone(),
    rewards: reward_entries(state.rewards)?,
    warnings: market
      .warnings
      .unwrap_or_default()
      .into_iter()
      .map(|w| format!("{}:{}", w.kind, w.level))
      .collect(),
  };
  sink.describe(&entity, EntityInfo::Market(info));
  Ok(())
}

/// `marketByUniqueKey`: one market.
pub(crate) fn decode_market(sink: &mut Sink<'_>, payload: &Value) -> Result<(), FetchError> {
  let data: MarketData = parse(payload, "marketByUniqueKey")?;
  let market = data
    .market_by_unique_key
    .ok_or_else(|| FetchError::Provider("market not found".into()))?;
  let label = sink.spec().label.clone().unwrap_or_else(|| market.pair());
  emit_market(sink, market, label)
}

/// `vaultByAddress`: vault totals, one allocation line per funded market,
/// and each funded market's own state.
pub(crate) fn decode_vault(sink: &mut Sink<'_>, payload: &Value) -> Result<(), FetchError> {
  let data: VaultData = parse(payload, "vaultByAddress")?;
  let vault = data
    .vault_by_address
    .ok_or_else(|| FetchError::Provider("vault not found".into()))?;
  let entity = sink.spec().entity.clone();
  let state = vault.state.unwrap_or_default();

  sink.metric(&entity, names::TOTAL_ASSETS, scaled(state.total_assets, vault.asset.decimals)?, Unit::Token);
  sink.metric(&entity, names::TOTAL_ASSETS_USD, state.total_assets_usd, Unit::Usd);
  sink.metric(&entity, names::APY_PCT, pct(state.apy)?, Unit::Percent);
  sink.metric(&entity, names::NET_APY_PCT, pct(state.net_apy)?, Unit::Percent);
  sink.metric(&entity, names::FEE_PCT, pct(state.fee)?, Unit::Percent);
  sink.describe(
    &entity,
    EntityInfo::Vault(VaultInfo {
      name: vault.name,
      symbol: vault.symbol,
      asset: vault.asset.symbol,
      rewards: reward_entries(state.rewards)?,
    }),
  );

  for allocation in state.allocation.unwrap_or_default() {
    if allocation.supply_assets.is_none_or(|a| a <= Decimal::ZERO) {
      continue;
    }

    let market_key = allocation.market.key();
    let pair = allocation.market.pair();
    let loan_decimals = allocation.market.loan_asset.decimals;
    let allocation_entity = format!("{entity}/{market_key}");

    sink.metric(&allocation_entity, names::ALLOCATION_USD, allocation.supply_assets_usd, Unit::Usd);
    sink.metric(
      &allocation_entity,
      names::SUPPLY_ASSETS,
      scaled(allocation.supply_assets, loan_decimals)?,
      Unit::Token,
    );
    sink.metric(
      &allocation_entity,
      names::SUPPLY_CAP,
      scaled(allocation.supply_cap, loan_decimals)?,
      Unit::Token,
    );
    sink.describe(
      &allocation_entity,
      EntityInfo::Allocation(AllocationInfo {
        vault: entity.clone(),
        market: market_key,
        pair: pair.clone(),
        collateral_asset: allocation.market.collateral_symbol(),
        enabled: allocation.enabled,
      }),
    );
    emit_market(sink, allocation.market, pair)?;
  }
  Ok(())
}
