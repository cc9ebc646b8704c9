//! Cost-basis position ledger.
//!
//! An arena of acquisition lots split between a protected Core pool and a
//! tradable pool. Deposits are split by a configured ratio at acquisition
//! time; disposals consume Trading-pool lots highest-unit-cost-first
//! (HIFO), oldest lot first among equal costs.
//!
//! The ledger itself is plain in-memory state. Mutation paths are split
//! into pure planning (`split_deposit`, `plan_disposal`) and application
//! (`insert_lots`, `apply_disposal`) so the orchestrator can persist a
//! change durably before the in-memory state ever reflects it.

use crate::domain::{Decimal, DepositSplit, DisposalPlan, DisposalRecord, Lot, LotId, Pool, TimeMs};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("deposit quantity must be positive, got {0}")]
    InvalidQuantity(Decimal),
    #[error("disposal fraction must be within (0, 1], got {0}")]
    InvalidFraction(Decimal),
    #[error("core ratio must be within 0-1, got {0}")]
    InvalidCoreRatio(Decimal),
    #[error("core pool is protected from automated disposal")]
    ProtectedPool,
    #[error("disposal plan references unknown lot {0}")]
    UnknownLot(LotId),
    #[error("disposal plan is stale for lot {0}: ledger changed since planning")]
    StalePlan(LotId),
}

/// Read-only aggregate view of both pools, for display and pre/post
/// comparison in recommendations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub core_quantity: Decimal,
    pub trading_quantity: Decimal,
    pub core_weighted_cost: Decimal,
    pub trading_weighted_cost: Decimal,
    pub lot_count: usize,
}

impl LedgerSummary {
    pub fn total_quantity(&self) -> Decimal {
        self.core_quantity + self.trading_quantity
    }
}

/// Unrealized profit and loss across both pools at a mark price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnlSummary {
    pub market_value: Decimal,
    pub invested: Decimal,
    pub unrealized_pnl: Decimal,
    /// Return on invested capital, in percent; zero when nothing invested.
    pub roi_pct: Decimal,
}

/// The append-only record of acquisition lots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionLedger {
    lots: Vec<Lot>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from persisted lots (startup path).
    pub fn from_lots(lots: Vec<Lot>) -> Self {
        Self { lots }
    }

    pub fn lots(&self) -> &[Lot] {
        &self.lots
    }

    pub fn lot_count(&self) -> usize {
        self.lots.len()
    }

    /// Split a deposit into core/trading lots without touching any ledger.
    ///
    /// The split is exact: core gets `quantity * core_ratio`, trading gets
    /// the remainder, and the two always sum back to `quantity`. A side
    /// that resolves to zero quantity gets no lot.
    ///
    /// # Errors
    /// `InvalidQuantity` for non-positive quantities, `InvalidCoreRatio`
    /// for a ratio outside 0-1.
    pub fn split_deposit(
        quantity: Decimal,
        unit_cost: Decimal,
        acquired_at: TimeMs,
        core_ratio: Decimal,
        note: Option<&str>,
    ) -> Result<DepositSplit, LedgerError> {
        if !quantity.is_positive() {
            return Err(LedgerError::InvalidQuantity(quantity));
        }
        if core_ratio.is_negative() || core_ratio > Decimal::one() {
            return Err(LedgerError::InvalidCoreRatio(core_ratio));
        }

        let core_quantity = quantity * core_ratio;
        let trading_quantity = quantity - core_quantity;

        let make_lot = |pool: Pool, qty: Decimal| {
            if qty.is_positive() {
                Some(Lot::new(
                    pool,
                    qty,
                    unit_cost,
                    acquired_at,
                    note.map(str::to_string),
                ))
            } else {
                None
            }
        };

        Ok(DepositSplit {
            core: make_lot(Pool::Core, core_quantity),
            trading: make_lot(Pool::Trading, trading_quantity),
        })
    }

    /// Append already-created lots (the application half of a deposit).
    pub fn insert_lots(&mut self, lots: impl IntoIterator<Item = Lot>) {
        self.lots.extend(lots);
    }

    /// Split and apply a deposit in one step.
    pub fn deposit(
        &mut self,
        quantity: Decimal,
        unit_cost: Decimal,
        acquired_at: TimeMs,
        core_ratio: Decimal,
        note: Option<&str>,
    ) -> Result<DepositSplit, LedgerError> {
        let split = Self::split_deposit(quantity, unit_cost, acquired_at, core_ratio, note)?;
        self.insert_lots(split.lots().cloned());
        info!(
            quantity = %quantity,
            unit_cost = %unit_cost,
            core = %split.core.as_ref().map(|l| l.quantity).unwrap_or_else(Decimal::zero),
            trading = %split.trading.as_ref().map(|l| l.quantity).unwrap_or_else(Decimal::zero),
            "recorded deposit"
        );
        Ok(split)
    }

    /// Plan a disposal of `fraction` of the given pool without mutating.
    ///
    /// Lots are consumed in `(unit_cost desc, acquired_at asc, id asc)`
    /// order; a lot is partially consumed when its quantity exceeds the
    /// remaining need. An exhausted pool is not an error; the plan simply
    /// reports the shortfall.
    ///
    /// # Errors
    /// `ProtectedPool` for the Core pool without the manual-override flag
    /// (which is a caller-level switch, distinct from the automated safety
    /// override layer); `InvalidFraction` outside (0, 1].
    pub fn plan_disposal(
        &self,
        pool: Pool,
        fraction: Decimal,
        manual_override: bool,
    ) -> Result<DisposalPlan, LedgerError> {
        if pool == Pool::Core && !manual_override {
            return Err(LedgerError::ProtectedPool);
        }
        if !fraction.is_positive() || fraction > Decimal::one() {
            return Err(LedgerError::InvalidFraction(fraction));
        }

        let target_quantity = fraction * self.total(pool);

        let mut candidates: Vec<&Lot> = self.lots.iter().filter(|l| l.pool == pool).collect();
        candidates.sort_by(|a, b| {
            b.unit_cost
                .cmp(&a.unit_cost)
                .then(a.acquired_at.cmp(&b.acquired_at))
                .then(a.id.cmp(&b.id))
        });

        let mut records = Vec::new();
        let mut remaining = target_quantity;
        for lot in candidates {
            if !remaining.is_positive() {
                break;
            }
            let take = lot.quantity.min(remaining);
            records.push(DisposalRecord {
                lot_id: lot.id,
                unit_cost: lot.unit_cost,
                acquired_at: lot.acquired_at,
                quantity: take,
                remaining: lot.quantity - take,
            });
            remaining = remaining - take;
        }

        Ok(DisposalPlan {
            pool,
            fraction,
            target_quantity,
            disposed_quantity: target_quantity - remaining,
            shortfall: remaining,
            records,
        })
    }

    /// Apply a previously computed plan to the lot set.
    ///
    /// Validates every record against current lot state before mutating
    /// anything, so a stale plan leaves the ledger untouched.
    pub fn apply_disposal(&mut self, plan: &DisposalPlan) -> Result<(), LedgerError> {
        for record in &plan.records {
            let lot = self
                .lots
                .iter()
                .find(|l| l.id == record.lot_id)
                .ok_or(LedgerError::UnknownLot(record.lot_id))?;
            if lot.quantity != record.quantity + record.remaining {
                return Err(LedgerError::StalePlan(record.lot_id));
            }
        }

        for record in &plan.records {
            if record.exhausts_lot() {
                self.lots.retain(|l| l.id != record.lot_id);
            } else if let Some(lot) = self.lots.iter_mut().find(|l| l.id == record.lot_id) {
                lot.quantity = record.remaining;
            }
        }

        info!(
            pool = %plan.pool,
            disposed = %plan.disposed_quantity,
            lots = plan.records.len(),
            "applied disposal"
        );
        Ok(())
    }

    /// Plan and apply a disposal in one step.
    pub fn dispose(
        &mut self,
        pool: Pool,
        fraction: Decimal,
        manual_override: bool,
    ) -> Result<DisposalPlan, LedgerError> {
        let plan = self.plan_disposal(pool, fraction, manual_override)?;
        self.apply_disposal(&plan)?;
        Ok(plan)
    }

    /// Current quantity held in a pool. Recomputed from the lot set on
    /// every call; there is no cached aggregate to diverge.
    pub fn total(&self, pool: Pool) -> Decimal {
        self.lots
            .iter()
            .filter(|l| l.pool == pool)
            .map(|l| l.quantity)
            .sum()
    }

    /// Quantity-weighted average unit cost of a pool; zero when empty.
    pub fn weighted_cost(&self, pool: Pool) -> Decimal {
        let total = self.total(pool);
        if total.is_zero() {
            return Decimal::zero();
        }
        let invested: Decimal = self
            .lots
            .iter()
            .filter(|l| l.pool == pool)
            .map(|l| l.cost_basis())
            .sum();
        invested / total
    }

    /// Total acquisition cost across both pools.
    pub fn invested(&self) -> Decimal {
        self.lots.iter().map(|l| l.cost_basis()).sum()
    }

    pub fn summary(&self) -> LedgerSummary {
        LedgerSummary {
            core_quantity: self.total(Pool::Core),
            trading_quantity: self.total(Pool::Trading),
            core_weighted_cost: self.weighted_cost(Pool::Core),
            trading_weighted_cost: self.weighted_cost(Pool::Trading),
            lot_count: self.lots.len(),
        }
    }

    /// Unrealized PnL across both pools at the given mark price.
    pub fn unrealized_pnl(&self, price: Decimal) -> PnlSummary {
        let quantity = self.total(Pool::Core) + self.total(Pool::Trading);
        let market_value = quantity * price;
        let invested = self.invested();
        let unrealized_pnl = market_value - invested;
        let roi_pct = if invested.is_positive() {
            unrealized_pnl / invested * Decimal::new(rust_decimal::Decimal::ONE_HUNDRED)
        } else {
            Decimal::zero()
        };
        PnlSummary {
            market_value,
            invested,
            unrealized_pnl,
            roi_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn ledger_with_history() -> PositionLedger {
        let mut ledger = PositionLedger::new();
        ledger
            .deposit(dec("0.5"), dec("20000"), TimeMs::new(1), dec("0.4"), None)
            .unwrap();
        ledger
            .deposit(dec("0.3"), dec("35000"), TimeMs::new(2), dec("0.4"), None)
            .unwrap();
        ledger
            .deposit(dec("1.0"), dec("60000"), TimeMs::new(3), dec("0.4"), None)
            .unwrap();
        ledger
    }

    #[test]
    fn test_deposit_splits_exactly() {
        let mut ledger = PositionLedger::new();
        let split = ledger
            .deposit(dec("1.0"), dec("50000"), TimeMs::new(1), dec("0.4"), None)
            .unwrap();

        assert_eq!(split.core.as_ref().unwrap().quantity, dec("0.4"));
        assert_eq!(split.trading.as_ref().unwrap().quantity, dec("0.6"));
        assert_eq!(split.total_quantity(), dec("1.0"));
        assert_eq!(ledger.total(Pool::Core), dec("0.4"));
        assert_eq!(ledger.total(Pool::Trading), dec("0.6"));
    }

    #[test]
    fn test_deposit_preserves_total_across_awkward_ratio() {
        let mut ledger = PositionLedger::new();
        ledger
            .deposit(dec("0.123456"), dec("50000"), TimeMs::new(1), dec("1") / dec("3"), None)
            .unwrap();
        assert_eq!(
            ledger.total(Pool::Core) + ledger.total(Pool::Trading),
            dec("0.123456")
        );
    }

    #[test]
    fn test_zero_core_ratio_creates_single_lot() {
        let mut ledger = PositionLedger::new();
        let split = ledger
            .deposit(dec("1"), dec("50000"), TimeMs::new(1), dec("0"), None)
            .unwrap();
        assert!(split.core.is_none());
        assert_eq!(split.trading.unwrap().quantity, dec("1"));
        assert_eq!(ledger.lot_count(), 1);
    }

    #[test]
    fn test_non_positive_deposit_rejected() {
        let mut ledger = PositionLedger::new();
        let err = ledger
            .deposit(dec("0"), dec("50000"), TimeMs::new(1), dec("0.4"), None)
            .unwrap_err();
        assert_eq!(err, LedgerError::InvalidQuantity(dec("0")));
    }

    #[test]
    fn test_hifo_consumes_highest_cost_first() {
        let mut ledger = ledger_with_history();
        // Trading pool: 0.3@20000, 0.18@35000, 0.6@60000.
        let plan = ledger.dispose(Pool::Trading, dec("0.5"), false).unwrap();

        // 50% of 1.08 = 0.54: all of the 60000 lot is consumed first.
        assert_eq!(plan.records[0].unit_cost, dec("60000"));
        assert_eq!(plan.records[0].quantity, dec("0.54"));
        assert!(!plan.records[0].exhausts_lot());
        assert_eq!(plan.records.len(), 1);
        assert_eq!(plan.shortfall, Decimal::zero());
    }

    #[test]
    fn test_hifo_tie_breaks_by_oldest() {
        let mut ledger = PositionLedger::new();
        ledger
            .deposit(dec("1"), dec("50000"), TimeMs::new(10), dec("0"), None)
            .unwrap();
        ledger
            .deposit(dec("1"), dec("50000"), TimeMs::new(5), dec("0"), None)
            .unwrap();

        let plan = ledger.plan_disposal(Pool::Trading, dec("0.5"), false).unwrap();
        assert_eq!(plan.records.len(), 1);
        assert_eq!(plan.records[0].acquired_at, TimeMs::new(5));
    }

    #[test]
    fn test_repeated_plans_are_identical() {
        let ledger = ledger_with_history();
        let first = ledger.plan_disposal(Pool::Trading, dec("0.7"), false).unwrap();
        let second = ledger.plan_disposal(Pool::Trading, dec("0.7"), false).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_plan_does_not_mutate() {
        let ledger = ledger_with_history();
        let before = ledger.summary();
        let _plan = ledger.plan_disposal(Pool::Trading, dec("1"), false).unwrap();
        assert_eq!(ledger.summary(), before);
    }

    #[test]
    fn test_full_disposal_empties_trading_only() {
        let mut ledger = PositionLedger::new();
        ledger
            .deposit(dec("1.0"), dec("50000"), TimeMs::new(1), dec("0.4"), None)
            .unwrap();

        let plan = ledger.dispose(Pool::Trading, dec("1"), false).unwrap();
        assert_eq!(plan.disposed_quantity, dec("0.6"));
        assert_eq!(ledger.total(Pool::Trading), Decimal::zero());
        assert_eq!(ledger.total(Pool::Core), dec("0.4"));
        assert_eq!(ledger.lot_count(), 1);
    }

    #[test]
    fn test_core_pool_is_protected() {
        let mut ledger = ledger_with_history();
        let err = ledger.dispose(Pool::Core, dec("0.5"), false).unwrap_err();
        assert_eq!(err, LedgerError::ProtectedPool);
        assert_eq!(ledger.total(Pool::Core), dec("0.72"));
    }

    #[test]
    fn test_manual_override_allows_core_disposal() {
        let mut ledger = ledger_with_history();
        let plan = ledger.dispose(Pool::Core, dec("0.5"), true).unwrap();
        assert_eq!(plan.disposed_quantity, dec("0.36"));
        assert_eq!(ledger.total(Pool::Core), dec("0.36"));
    }

    #[test]
    fn test_fraction_bounds_rejected() {
        let ledger = ledger_with_history();
        assert_eq!(
            ledger
                .plan_disposal(Pool::Trading, dec("0"), false)
                .unwrap_err(),
            LedgerError::InvalidFraction(dec("0"))
        );
        assert_eq!(
            ledger
                .plan_disposal(Pool::Trading, dec("1.5"), false)
                .unwrap_err(),
            LedgerError::InvalidFraction(dec("1.5"))
        );
    }

    #[test]
    fn test_weighted_cost() {
        let ledger = ledger_with_history();
        // Trading invested: 0.3*20000 + 0.18*35000 + 0.6*60000 = 48300
        // over 1.08 units.
        let expected = dec("48300") / dec("1.08");
        assert_eq!(ledger.weighted_cost(Pool::Trading), expected);
        assert_eq!(PositionLedger::new().weighted_cost(Pool::Core), Decimal::zero());
    }

    #[test]
    fn test_stale_plan_rejected_without_mutation() {
        let mut ledger = ledger_with_history();
        let plan = ledger.plan_disposal(Pool::Trading, dec("1"), false).unwrap();
        ledger.dispose(Pool::Trading, dec("0.5"), false).unwrap();

        let before = ledger.summary();
        assert!(matches!(
            ledger.apply_disposal(&plan),
            Err(LedgerError::StalePlan(_)) | Err(LedgerError::UnknownLot(_))
        ));
        assert_eq!(ledger.summary(), before);
    }

    #[test]
    fn test_unrealized_pnl() {
        let mut ledger = PositionLedger::new();
        ledger
            .deposit(dec("1"), dec("50000"), TimeMs::new(1), dec("0.4"), None)
            .unwrap();
        let pnl = ledger.unrealized_pnl(dec("60000"));
        assert_eq!(pnl.market_value, dec("60000"));
        assert_eq!(pnl.invested, dec("50000"));
        assert_eq!(pnl.unrealized_pnl, dec("10000"));
        assert_eq!(pnl.roi_pct, dec("20"));
    }
}
