//! Advisory output types produced by a decision cycle.

use crate::domain::{Decimal, TimeMs};
use crate::engine::{MomentumState, OverrideDecision, ScoreResult};
use crate::ledger::LedgerSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a decision cycle persists its effects or only reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionMode {
    /// Compute the full recommendation without touching ledger or store.
    Preview,
    /// Persist the resulting lots, disposal and valuation observation.
    Commit,
}

/// One advised action. A single cycle can emit a buy and a sell together;
/// `Hold` appears only when neither side produced anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Advice {
    Buy {
        /// Currency to deploy this cycle.
        amount: Decimal,
        /// Asset quantity at the snapshot's spot price.
        quantity: Decimal,
        multiplier: f64,
        rationale: String,
    },
    Sell {
        /// Fraction of the Trading pool to dispose.
        fraction: f64,
        quantity: Decimal,
        /// Expected proceeds at the snapshot's spot price.
        proceeds: Decimal,
        rationale: String,
    },
    Hold {
        rationale: String,
    },
}

/// Full advisory record for one decision cycle.
///
/// Carries every intermediate the decision was derived from, so a reader
/// can audit the recommendation without replaying the engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub generated_at: DateTime<Utc>,
    /// Timestamp of the snapshot the decision was made against.
    pub snapshot_time: TimeMs,
    pub mode: DecisionMode,
    pub advice: Vec<Advice>,
    pub score: ScoreResult,
    pub momentum: MomentumState,
    pub overrides: OverrideDecision,
    /// True when valuation history was too short to classify momentum and
    /// the cycle fell back to an inactive state.
    pub degraded_momentum: bool,
    pub ledger_before: LedgerSummary,
    pub ledger_after: LedgerSummary,
}

impl Recommendation {
    pub fn buy(&self) -> Option<&Advice> {
        self.advice
            .iter()
            .find(|a| matches!(a, Advice::Buy { .. }))
    }

    pub fn sell(&self) -> Option<&Advice> {
        self.advice
            .iter()
            .find(|a| matches!(a, Advice::Sell { .. }))
    }

    pub fn is_hold(&self) -> bool {
        self.advice.iter().all(|a| matches!(a, Advice::Hold { .. }))
    }
}
