//! Vault REST entries: bigint-encoded borrowed and cash totals.
//!
//! supply = borrowed + cash; available liquidity = cash.

use serde::Deserialize;
use serde_json::Value;

use crate::domain::entity::EntityInfo;
use crate::domain::metric::names;
use crate::domain::observation::FetchError;
use crate::domain::source::Unit;

use super::values::base_units_of;
use super::{Sink, parse};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VaultEntry {
  total_borrowed: Value,
  total_cash: Value,
}

pub(crate) fn decode(sink: &mut Sink<'_>, payload: &Value, decimals: u32) -> Result<(), FetchError> {
  let entry: VaultEntry = parse(payload, "vault entry")?;
  let borrowed = base_units_of(&entry.total_borrowed, decimals)?;
  let cash = base_units_of(&entry.total_cash, decimals)?;
  let supply = match (borrowed, cash) {
    (Some(b), Some(c)) => Some(
      b.checked_add(c)
        .ok_or_else(|| FetchError::Decode("vault supply overflows".into()))?,
    ),
    _ => None,
  };

  let entity = sink.spec().entity.clone();
  sink.metric(&entity, names::BORROW_ASSETS, borrowed, Unit::Token);
  sink.metric(&entity, names::LIQUIDITY_ASSETS, cash, Unit::Token);
  sink.metric(&entity, names::SUPPLY_ASSETS, supply, Unit::Token);

  let label = sink.spec().display_label().to_string();
  sink.describe(&entity, EntityInfo::Labelled { label });
  Ok(())
}
