//! Normalized metrics and report figures.
//!
//! A `Metric` is one unit-scaled fact about one entity. `Figure` is how the
//! report exposes a value: either known (with unit and provenance) or
//! explicitly absent with a reason, so "zero" and "unknown" never collapse.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::report::SectionName;
use super::source::{SourceId, Unit};

/// Canonical metric names shared by decoders and the assembler.
pub mod names {
    pub const TOTAL_SUPPLY: &str = "total_supply";
    pub const STAKED_SHARE_PCT: &str = "staked_share_pct";

    pub const SUPPLY_USD: &str = "supply_usd";
    pub const BORROW_USD: &str = "borrow_usd";
    pub const LIQUIDITY_USD: &str = "liquidity_usd";
    pub const COLLATERAL_USD: &str = "collateral_usd";
    pub const SUPPLY_ASSETS: &str = "supply_assets";
    pub const BORROW_ASSETS: &str = "borrow_assets";
    pub const LIQUIDITY_ASSETS: &str = "liquidity_assets";
    pub const COLLATERAL_ASSETS: &str = "collateral_assets";
    pub const SUPPLY_APY_PCT: &str = "supply_apy_pct";
    pub const BORROW_APY_PCT: &str = "borrow_apy_pct";
    pub const UTILIZATION_PCT: &str = "utilization_pct";
    pub const FEE_PCT: &str = "fee_pct";
    pub const LLTV_PCT: &str = "lltv_pct";

    pub const TOTAL_ASSETS: &str = "total_assets";
    pub const TOTAL_ASSETS_USD: &str = "total_assets_usd";
    pub const APY_PCT: &str = "apy_pct";
    pub const NET_APY_PCT: &str = "net_apy_pct";
    pub const ALLOCATION_USD: &str = "allocation_usd";
    pub const SUPPLY_CAP: &str = "supply_cap";

    pub const TOTAL_VALUE_USD: &str = "total_value_usd";
    pub const BALANCE_USD: &str = "balance_usd";
}

/// A value that lost a merge to a fresher observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Superseded {
    /// Source that reported it.
    pub source_id: SourceId,
    /// The value it reported.
    pub value: Decimal,
    /// When it was fetched.
    pub fetched_at: DateTime<Utc>,
}

/// A normalized scalar fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    /// Report section the fact belongs to.
    pub section: SectionName,
    /// Token symbol, market key, vault address, ...
    pub entity: String,
    /// Metric name, see [`names`].
    pub name: String,
    /// Value in `unit`, decimal-scaled.
    pub value: Decimal,
    /// Declared unit.
    pub unit: Unit,
    /// Every source that reported this entity+metric.
    pub provenance: Vec<SourceId>,
    /// Source whose value won the merge.
    pub reported_by: SourceId,
    /// Fetch time of the winning observation.
    pub observed_at: DateTime<Utc>,
    /// Values from other sources that lost the merge.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub superseded: Vec<Superseded>,
}

impl Metric {
    /// Single-source metric.
    pub fn new(
        section: SectionName,
        entity: impl Into<String>,
        name: impl Into<String>,
        value: Decimal,
        unit: Unit,
        source_id: &str,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            section,
            entity: entity.into(),
            name: name.into(),
            value,
            unit,
            provenance: vec![source_id.to_string()],
            reported_by: source_id.to_string(),
            observed_at,
            superseded: Vec::new(),
        }
    }

    /// Merge precedence: fresher first, then greater source id, then value.
    pub fn rank(&self) -> (DateTime<Utc>, &str, Decimal) {
        (self.observed_at, self.reported_by.as_str(), self.value)
    }

    /// Record of this metric's value for a merge it lost.
    pub fn as_superseded(&self) -> Superseded {
        Superseded {
            source_id: self.reported_by.clone(),
            value: self.value,
            fetched_at: self.observed_at,
        }
    }

    /// Whether any contributing source reported a different value.
    pub fn has_disagreement(&self) -> bool {
        self.superseded.iter().any(|s| s.value != self.value)
    }

    /// Report-facing view of this metric.
    pub fn figure(&self) -> Figure {
        Figure::Known {
            value: self.value,
            unit: self.unit,
            provenance: self.provenance.clone(),
        }
    }
}

/// A report value: known, or absent with a reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Figure {
    /// Populated from at least one source.
    Known {
        value: Decimal,
        unit: Unit,
        provenance: Vec<SourceId>,
    },
    /// Not available; never defaulted to zero.
    Absent { reason: String },
}

impl Figure {
    pub fn absent(reason: impl Into<String>) -> Self {
        Self::Absent { reason: reason.into() }
    }

    /// Value if known.
    pub const fn value(&self) -> Option<Decimal> {
        match self {
            Self::Known { value, .. } => Some(*value),
            Self::Absent { .. } => None,
        }
    }

    pub const fn unit(&self) -> Option<Unit> {
        match self {
            Self::Known { unit, .. } => Some(*unit),
            Self::Absent { .. } => None,
        }
    }

    pub const fn is_known(&self) -> bool {
        matches!(self, Self::Known { .. })
    }

    pub fn provenance(&self) -> &[SourceId] {
        match self {
            Self::Known { provenance, .. } => provenance,
            Self::Absent { .. } => &[],
        }
    }

    /// Combine two known figures into a derived one.
    ///
    /// The result is absent when either operand is absent or `op` yields
    /// `None`, in which case `why` becomes the reason.
    pub fn derive(
        a: &Self,
        b: &Self,
        unit: Unit,
        why: &str,
        op: impl FnOnce(Decimal, Decimal) -> Option<Decimal>,
    ) -> Self {
        let (Some(x), Some(y)) = (a.value(), b.value()) else {
            return Self::absent(why);
        };
        match op(x, y) {
            Some(value) => {
                let mut provenance: Vec<SourceId> =
                    a.provenance().iter().chain(b.provenance()).cloned().collect();
                provenance.sort();
                provenance.dedup();
                Self::Known { value, unit, provenance }
            }
            None => Self::absent(why),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn known(v: Decimal, src: &str) -> Figure {
        Figure::Known {
            value: v,
            unit: Unit::Usd,
            provenance: vec![src.to_string()],
        }
    }

    #[test]
    fn test_derive_requires_both_operands() {
        let supply = known(dec!(100), "a");
        let missing = Figure::absent("fetch failed");
        let derived = Figure::derive(&supply, &missing, Unit::Usd, "needs both", |x, y| {
            Some(x - y)
        });
        assert_eq!(derived, Figure::absent("needs both"));
    }

    #[test]
    fn test_derive_merges_provenance() {
        let supply = known(dec!(100), "b");
        let borrow = known(dec!(40), "a");
        let derived = Figure::derive(&supply, &borrow, Unit::Usd, "x", |x, y| Some(x - y));
        assert_eq!(derived.value(), Some(dec!(60)));
        assert_eq!(derived.provenance(), ["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_zero_is_known_not_absent() {
        let zero = known(Decimal::ZERO, "a");
        assert!(zero.is_known());
        assert_eq!(zero.value(), Some(Decimal::ZERO));
    }
}
