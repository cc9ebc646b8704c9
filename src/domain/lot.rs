//! Acquisition lots and disposal records.

use crate::domain::{Decimal, LotId, Pool, TimeMs};
use serde::{Deserialize, Serialize};

/// A single acquisition lot.
///
/// Immutable once created except for quantity reduction on disposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub id: LotId,
    pub pool: Pool,
    /// Remaining quantity, > 0 for any lot held in the ledger.
    pub quantity: Decimal,
    /// Acquisition price per unit.
    pub unit_cost: Decimal,
    pub acquired_at: TimeMs,
    /// Free-form annotation, e.g. "weekly buy at 3.5x".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Lot {
    pub fn new(
        pool: Pool,
        quantity: Decimal,
        unit_cost: Decimal,
        acquired_at: TimeMs,
        note: Option<String>,
    ) -> Self {
        Self {
            id: LotId::generate(),
            pool,
            quantity,
            unit_cost,
            acquired_at,
            note,
        }
    }

    /// Total amount paid for the remaining quantity.
    pub fn cost_basis(&self) -> Decimal {
        self.quantity * self.unit_cost
    }
}

/// The core/trading pair of lots created by one deposit.
///
/// Either side may be absent when the split ratio sends the full quantity
/// to the other pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositSplit {
    pub core: Option<Lot>,
    pub trading: Option<Lot>,
}

impl DepositSplit {
    /// Quantity across both created lots. Always equals the deposited
    /// quantity exactly; the split loses nothing to rounding.
    pub fn total_quantity(&self) -> Decimal {
        self.lots().map(|lot| lot.quantity).sum()
    }

    /// Iterate over the lots that were actually created.
    pub fn lots(&self) -> impl Iterator<Item = &Lot> {
        self.core.iter().chain(self.trading.iter())
    }
}

/// Consumption of (part of) one lot during a disposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisposalRecord {
    pub lot_id: LotId,
    pub unit_cost: Decimal,
    pub acquired_at: TimeMs,
    /// Quantity taken from this lot.
    pub quantity: Decimal,
    /// Quantity left in the lot afterwards; zero means the lot is removed.
    pub remaining: Decimal,
}

impl DisposalRecord {
    /// Whether this record removes the lot entirely.
    pub fn exhausts_lot(&self) -> bool {
        self.remaining.is_zero()
    }

    /// Acquisition cost of the consumed quantity.
    pub fn cost_basis(&self) -> Decimal {
        self.quantity * self.unit_cost
    }
}

/// A fully resolved disposal: which lots are consumed, in HIFO order.
///
/// Planning is pure; a plan only changes the ledger when explicitly
/// applied (and persisted) by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisposalPlan {
    pub pool: Pool,
    /// Fraction of the pool that was requested.
    pub fraction: Decimal,
    /// Absolute quantity the fraction resolved to.
    pub target_quantity: Decimal,
    /// Quantity actually covered by the records below.
    pub disposed_quantity: Decimal,
    /// Unmet quantity when the pool was exhausted before the target.
    pub shortfall: Decimal,
    pub records: Vec<DisposalRecord>,
}

impl DisposalPlan {
    /// Whether the plan consumes anything at all.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Acquisition cost of everything the plan consumes.
    pub fn cost_basis(&self) -> Decimal {
        self.records.iter().map(|r| r.cost_basis()).sum()
    }

    /// Weighted average acquisition cost of the disposed quantity.
    pub fn weighted_cost(&self) -> Decimal {
        if self.disposed_quantity.is_zero() {
            Decimal::zero()
        } else {
            self.cost_basis() / self.disposed_quantity
        }
    }

    /// Sale proceeds at the given price.
    pub fn proceeds(&self, price: Decimal) -> Decimal {
        self.disposed_quantity * price
    }

    /// Realized gain against cost basis at the given sale price.
    pub fn realized_pnl(&self, price: Decimal) -> Decimal {
        self.proceeds(price) - self.cost_basis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn record(qty: &str, cost: &str, remaining: &str) -> DisposalRecord {
        DisposalRecord {
            lot_id: LotId::generate(),
            unit_cost: dec(cost),
            acquired_at: TimeMs::new(0),
            quantity: dec(qty),
            remaining: dec(remaining),
        }
    }

    #[test]
    fn test_lot_cost_basis() {
        let lot = Lot::new(Pool::Core, dec("0.5"), dec("20000"), TimeMs::new(1), None);
        assert_eq!(lot.cost_basis(), dec("10000"));
    }

    #[test]
    fn test_plan_aggregates() {
        let plan = DisposalPlan {
            pool: Pool::Trading,
            fraction: dec("0.5"),
            target_quantity: dec("0.5"),
            disposed_quantity: dec("0.5"),
            shortfall: Decimal::zero(),
            records: vec![record("0.3", "60000", "0"), record("0.2", "35000", "0.1")],
        };

        assert_eq!(plan.cost_basis(), dec("25000"));
        assert_eq!(plan.weighted_cost(), dec("50000"));
        assert_eq!(plan.proceeds(dec("72000")), dec("36000"));
        assert_eq!(plan.realized_pnl(dec("72000")), dec("11000"));
        assert!(plan.records[0].exhausts_lot());
        assert!(!plan.records[1].exhausts_lot());
    }

    #[test]
    fn test_empty_plan_weighted_cost_is_zero() {
        let plan = DisposalPlan {
            pool: Pool::Trading,
            fraction: dec("1"),
            target_quantity: Decimal::zero(),
            disposed_quantity: Decimal::zero(),
            shortfall: Decimal::zero(),
            records: vec![],
        };
        assert!(plan.is_empty());
        assert_eq!(plan.weighted_cost(), Decimal::zero());
    }
}
