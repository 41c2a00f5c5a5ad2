//! Portfolio GraphQL shape: per-app position balances of one wallet.
//!
//! Position nodes are a union discriminated by `type`. Nodes that matched
//! no fragment arrive without `type` and are skipped; unknown types are
//! ignored. Contract positions are split by token `metaType`.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::entity::{EntityInfo, PortfolioInfo, PositionInfo};
use crate::domain::metric::names;
use crate::domain::observation::FetchError;
use crate::domain::source::Unit;

use super::values::opt_decimal;
use super::{Sink, parse};

const UNKNOWN_META_TYPE: &str = "UNKNOWN";

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Connection<T> {
  #[serde(default)]
  edges: Vec<Edge<T>>,
}

#[derive(Debug, Deserialize)]
struct Edge<T> {
  node: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct App {
  display_name: String,
  slug: String,
}

#[derive(Debug, Deserialize)]
struct Network {
  name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppBalance {
  app: App,
  network: Network,
  #[serde(default)]
  position_balances: Option<Connection<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppBalances {
  #[serde(rename = "totalBalanceUSD", default, deserialize_with = "opt_decimal")]
  total_balance_usd: Option<Decimal>,
  #[serde(default)]
  by_app: Option<Connection<AppBalance>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PortfolioNode {
  app_balances: AppBalances,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PortfolioData {
  portfolio_v2: Option<PortfolioNode>,
}

#[derive(Debug, Default, Deserialize)]
struct DisplayProps {
  #[serde(default)]
  label: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppTokenPosition {
  address: String,
  #[serde(default)]
  symbol: Option<String>,
  #[serde(rename = "balanceUSD", default, deserialize_with = "opt_decimal")]
  balance_usd: Option<Decimal>,
  #[serde(default)]
  display_props: Option<DisplayProps>,
}

#[derive(Debug, Deserialize)]
struct TokenBalance {
  #[serde(default)]
  symbol: Option<String>,
  #[serde(rename = "balanceUSD", default, deserialize_with = "opt_decimal")]
  balance_usd: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContractToken {
  #[serde(default)]
  meta_type: Option<String>,
  #[serde(default)]
  token: Option<TokenBalance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContractPosition {
  address: String,
  #[serde(rename = "balanceUSD", default, deserialize_with = "opt_decimal")]
  balance_usd: Option<Decimal>,
  #[serde(default)]
  tokens: Option<Vec<ContractToken>>,
  #[serde(default)]
  display_props: Option<DisplayProps>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum PositionNode {
  #[serde(rename = "app-token")]
  AppToken(AppTokenPosition),
  #[serde(rename = "contract-position")]
  ContractPosition(ContractPosition),
  #[serde(other)]
  Other,
}

/// One meta-type group of a contract position.
struct TokenGroup {
  balance_usd: Decimal,
  symbols: Vec<String>,
}

fn group_tokens(tokens: Vec<ContractToken>) -> Result<BTreeMap<String, TokenGroup>, FetchError> {
  let mut groups: BTreeMap<String, TokenGroup> = BTreeMap::new();
  for token in tokens {
    let meta_type = token.meta_type.unwrap_or_else(|| UNKNOWN_META_TYPE.to_string());
    let group = groups.entry(meta_type.clone()).or_insert_with(|| TokenGroup {
      balance_usd: Decimal::ZERO,
      symbols: Vec::new(),
    });
    if let Some(balance) = token.token {
      group.balance_usd = group
        .balance_usd
        .checked_add(balance.balance_usd.unwrap_or_default())
        .ok_or_else(|| FetchError::Decode(format!("{meta_type} token balance out of range")))?;
      group.symbols.extend(balance.symbol);
    }
  }
  Ok(groups)
}

fn reached(len: usize, limit: Option<&usize>) -> bool {
  limit.is_some_and(|&limit| limit > 0 && len >= limit)
}

/// `portfolioV2`: wallet total plus one line per position (or per
/// contract-position token group). `page_limits` are the document's
/// `first: N` values, apps first, positions second.
pub(crate) fn decode(sink: &mut Sink<'_>, payload: &Value, page_limits: &[usize]) -> Result<(), FetchError> {
  let data: PortfolioData = parse(payload, "portfolioV2")?;
  let portfolio = data
    .portfolio_v2
    .ok_or_else(|| FetchError::Provider("portfolio not found".into()))?;
  let wallet = sink.spec().entity.clone();
  let balances = portfolio.app_balances;
  let apps = balances.by_app.map(|c| c.edges).unwrap_or_default();

  let mut truncated = reached(apps.len(), page_limits.first());
  sink.metric(&wallet, names::TOTAL_VALUE_USD, balances.total_balance_usd, Unit::Usd);

  for Edge { node: app } in apps {
    let positions = app.position_balances.map(|c| c.edges).unwrap_or_default();
    truncated |= reached(positions.len(), page_limits.get(1));

    for Edge { node } in positions {
      if node.get("type").is_none() {
        continue;
      }
      let position: PositionNode = parse(&node, "position balance")?;
      let base = |position_type: &str, address: &str| PositionInfo {
        portfolio: wallet.clone(),
        app: app.app.display_name.clone(),
        app_slug: app.app.slug.clone(),
        network: app.network.name.clone(),
        position_type: position_type.to_string(),
        address: address.to_string(),
        symbol: None,
        label: None,
        meta_type: None,
      };

      match position {
        PositionNode::AppToken(token) => {
          let entity = format!("{wallet}:{}:{}:{}", app.network.name, app.app.slug, token.address);
          sink.metric(&entity, names::BALANCE_USD, token.balance_usd, Unit::Usd);
          let info = PositionInfo {
            symbol: token.symbol,
            label: token.display_props.unwrap_or_default().label,
            ..base("app-token", &token.address)
          };
          sink.describe(&entity, EntityInfo::Position(info));
        }
        PositionNode::ContractPosition(contract) => {
          let label = contract.display_props.unwrap_or_default().label;
          let tokens = contract.tokens.unwrap_or_default();
          let prefix = format!("{wallet}:{}:{}:{}", app.network.name, app.app.slug, contract.address);

          if tokens.is_empty() {
            sink.metric(&prefix, names::BALANCE_USD, contract.balance_usd, Unit::Usd);
            let info = PositionInfo {
              label,
              ..base("contract-position", &contract.address)
            };
            sink.describe(&prefix, EntityInfo::Position(info));
            continue;
          }

          for (meta_type, group) in group_tokens(tokens)? {
            let entity = format!("{prefix}:{}", meta_type.to_ascii_lowercase());
            sink.metric(&entity, names::BALANCE_USD, Some(group.balance_usd), Unit::Usd);
            let info = PositionInfo {
              symbol: (!group.symbols.is_empty()).then(|| group.symbols.join("+")),
              label: label.clone(),
              meta_type: Some(meta_type),
              ..base("contract-position", &contract.address)
            };
            sink.describe(&entity, EntityInfo::Position(info));
          }
        }
        PositionNode::Other => {}
      }
    }
  }

  let label = sink.spec().display_label().to_string();
  sink.describe(&wallet, EntityInfo::Portfolio(PortfolioInfo { label, truncated }));
  Ok(())
}
