//! Decision orchestrator: wires the pure engines to the persisted ledger.
//!
//! One `decide` call is one cycle: validate the snapshot, score it, run
//! the safety overrides, classify momentum from the stored valuation
//! window, and turn the effective multiplier and sell fraction into
//! concrete lot mutations. In `Commit` mode the mutations are persisted
//! in one transaction before the in-memory ledger reflects them; a
//! persistence failure leaves both the store and the memory state as
//! they were.

use crate::config::{ConfigError, StrategyConfig};
use crate::db::Repository;
use crate::domain::{
    Decimal, DepositSplit, DisposalPlan, IndicatorSnapshot, Lot, Pool, SnapshotError, TimeMs,
    ValuationObservation,
};
use crate::engine::{
    apply_overrides, classify, score, MomentumError, MomentumState, OverrideDecision, ScoreResult,
};
use crate::ledger::{LedgerError, LedgerSummary, PnlSummary, PositionLedger};
use crate::orchestration::{Advice, DecisionMode, Recommendation};
use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DecisionError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("persistence failure: {0}")]
    Persistence(#[from] sqlx::Error),
    #[error("value {0} is not representable as a decimal")]
    Numeric(f64),
}

fn to_decimal(value: f64) -> Result<Decimal, DecisionError> {
    Decimal::from_f64(value).ok_or(DecisionError::Numeric(value))
}

/// Serializes decision cycles over one ledger.
pub struct DecisionOrchestrator {
    repo: Repository,
    ledger: Mutex<PositionLedger>,
    config: StrategyConfig,
}

impl DecisionOrchestrator {
    /// Validate the configuration and rebuild the ledger from the store.
    ///
    /// # Errors
    /// Config violations or a failed lot load.
    pub async fn load(repo: Repository, config: StrategyConfig) -> Result<Self, DecisionError> {
        config.validate()?;
        let lots = repo.load_lots().await?;
        info!(lots = lots.len(), "ledger rebuilt from store");
        Ok(Self {
            repo,
            ledger: Mutex::new(PositionLedger::from_lots(lots)),
            config,
        })
    }

    /// Run one decision cycle against a snapshot.
    ///
    /// Buy-side and sell-side advice are derived independently and can
    /// both appear in a single recommendation. `Preview` mode leaves the
    /// ledger and the store untouched; `Commit` persists the new lots,
    /// the disposal and the snapshot's valuation observation atomically.
    ///
    /// # Errors
    /// Malformed snapshot, ledger planning failure, or a persistence
    /// failure in `Commit` mode (in which case nothing was applied).
    pub async fn decide(
        &self,
        snapshot: &IndicatorSnapshot,
        mode: DecisionMode,
    ) -> Result<Recommendation, DecisionError> {
        let score_result = score(snapshot, &self.config.scoring)?;
        let overrides = apply_overrides(snapshot, &self.config.overrides);
        let (momentum, degraded) = self.classify_momentum(snapshot).await?;

        let multiplier = overrides
            .forced_multiplier
            .unwrap_or(score_result.multiplier);
        let sell_fraction = overrides
            .forced_liquidate_fraction
            .unwrap_or(momentum.sell_fraction);

        let mut ledger = self.ledger.lock().await;
        let ledger_before = ledger.summary();

        let (split, buy_advice) =
            self.plan_buy(snapshot, &score_result, &overrides, multiplier)?;
        // A failed sell plan must not abort an independently valid buy; it
        // degrades to a Hold entry carrying the failure.
        let (plan, sell_advice) =
            match self.plan_sell(&ledger, snapshot, &momentum, &overrides, sell_fraction) {
                Ok(pair) => pair,
                Err(DecisionError::Ledger(e)) => {
                    warn!(error = %e, "sell planning failed, buy side continues");
                    (
                        None,
                        Some(Advice::Hold {
                            rationale: format!("sell skipped: {}", e),
                        }),
                    )
                }
                Err(e) => return Err(e),
            };

        if mode == DecisionMode::Commit {
            let new_lots: Vec<Lot> = split
                .as_ref()
                .map(|s| s.lots().cloned().collect())
                .unwrap_or_default();
            let observation = ValuationObservation::new(snapshot.time_ms, snapshot.valuation_ratio);
            self.repo
                .commit_decision(&new_lots, plan.as_ref(), Some(&observation))
                .await?;

            if let Some(plan) = &plan {
                ledger.apply_disposal(plan)?;
            }
            ledger.insert_lots(new_lots);
        }

        let ledger_after = ledger.summary();
        drop(ledger);

        let mut advice: Vec<Advice> = buy_advice.into_iter().chain(sell_advice).collect();
        if advice.is_empty() {
            advice.push(Advice::Hold {
                rationale: format!(
                    "composite score {:.1} ({}), no momentum exit active",
                    score_result.composite_score,
                    score_result.band_label()
                ),
            });
        }

        info!(
            mode = ?mode,
            composite = score_result.composite_score,
            multiplier,
            sell_fraction,
            degraded,
            entries = advice.len(),
            "decision cycle complete"
        );

        Ok(Recommendation {
            generated_at: Utc::now(),
            snapshot_time: snapshot.time_ms,
            mode,
            advice,
            score: score_result,
            momentum,
            overrides,
            degraded_momentum: degraded,
            ledger_before,
            ledger_after,
        })
    }

    /// Momentum classification over the stored window plus the current
    /// snapshot. Insufficient history degrades to inactive instead of
    /// failing the whole cycle.
    async fn classify_momentum(
        &self,
        snapshot: &IndicatorSnapshot,
    ) -> Result<(MomentumState, bool), DecisionError> {
        let limit = self
            .config
            .momentum
            .min_window
            .max(4 * self.config.momentum.ema_span);
        let mut window = self.repo.query_valuation_window(limit).await?;

        let newer = window.last().map_or(true, |o| o.time_ms < snapshot.time_ms);
        if newer {
            if window.len() == limit {
                window.remove(0);
            }
            window.push(ValuationObservation::new(
                snapshot.time_ms,
                snapshot.valuation_ratio,
            ));
        }

        match classify(&window, &self.config.momentum) {
            Ok(state) => Ok((state, false)),
            Err(MomentumError::InsufficientHistory { got, need }) => {
                warn!(got, need, "valuation history too short, momentum degraded");
                Ok((MomentumState::inactive(), true))
            }
        }
    }

    fn plan_buy(
        &self,
        snapshot: &IndicatorSnapshot,
        score_result: &ScoreResult,
        overrides: &OverrideDecision,
        multiplier: f64,
    ) -> Result<(Option<DepositSplit>, Option<Advice>), DecisionError> {
        if multiplier <= 0.0 {
            // A vetoed buy still surfaces its reason; a zero-band score
            // just produces no buy entry.
            let advice = overrides.buy_reason.clone().map(|rationale| Advice::Hold {
                rationale,
            });
            return Ok((None, advice));
        }

        let amount = self.config.base_weekly_amount * to_decimal(multiplier)?;
        let quantity = amount / snapshot.spot_price;
        let split = PositionLedger::split_deposit(
            quantity,
            snapshot.spot_price,
            snapshot.time_ms,
            self.config.core_ratio,
            Some("scheduled accumulation"),
        )?;

        let rationale = format!(
            "composite score {:.1} ({}): deploy {:.1}x base amount",
            score_result.composite_score,
            score_result.band_label(),
            multiplier
        );
        let advice = Advice::Buy {
            amount,
            quantity,
            multiplier,
            rationale,
        };
        Ok((Some(split), Some(advice)))
    }

    fn plan_sell(
        &self,
        ledger: &PositionLedger,
        snapshot: &IndicatorSnapshot,
        momentum: &MomentumState,
        overrides: &OverrideDecision,
        sell_fraction: f64,
    ) -> Result<(Option<DisposalPlan>, Option<Advice>), DecisionError> {
        if sell_fraction <= 0.0 || !ledger.total(Pool::Trading).is_positive() {
            return Ok((None, None));
        }

        let fraction = to_decimal(sell_fraction)?;
        let plan = ledger.plan_disposal(Pool::Trading, fraction, false)?;
        if plan.is_empty() {
            return Ok((None, None));
        }

        let rationale = overrides.sell_reason.clone().unwrap_or_else(|| {
            format!(
                "momentum {} at smoothed valuation {:.2}: trim {:.2}% of trading pool",
                momentum.phase,
                momentum.smoothed_value,
                sell_fraction * 100.0
            )
        });
        let advice = Advice::Sell {
            fraction: sell_fraction,
            quantity: plan.disposed_quantity,
            proceeds: plan.proceeds(snapshot.spot_price),
            rationale,
        };
        Ok((Some(plan), Some(advice)))
    }

    /// Record a manual deposit: split by the configured core ratio,
    /// persist, then apply.
    pub async fn record_deposit(
        &self,
        quantity: Decimal,
        unit_cost: Decimal,
        acquired_at: TimeMs,
        note: Option<&str>,
    ) -> Result<DepositSplit, DecisionError> {
        let mut ledger = self.ledger.lock().await;
        let split = PositionLedger::split_deposit(
            quantity,
            unit_cost,
            acquired_at,
            self.config.core_ratio,
            note,
        )?;
        let lots: Vec<Lot> = split.lots().cloned().collect();
        self.repo.insert_lots(&lots).await?;
        ledger.insert_lots(lots);
        Ok(split)
    }

    /// Dispose a fraction of a pool outside the automated cycle. Touching
    /// the Core pool requires `allow_core`.
    pub async fn manual_dispose(
        &self,
        pool: Pool,
        fraction: Decimal,
        allow_core: bool,
    ) -> Result<DisposalPlan, DecisionError> {
        let mut ledger = self.ledger.lock().await;
        let plan = ledger.plan_disposal(pool, fraction, allow_core)?;
        self.repo.apply_disposal(&plan).await?;
        ledger.apply_disposal(&plan)?;
        Ok(plan)
    }

    /// Append a valuation observation to the momentum history.
    ///
    /// Returns false for a duplicate timestamp.
    pub async fn record_observation(
        &self,
        observation: &ValuationObservation,
    ) -> Result<bool, DecisionError> {
        Ok(self.repo.insert_valuation_observation(observation).await?)
    }

    /// Backfill a batch of historical observations; returns how many were
    /// new.
    pub async fn backfill_observations(
        &self,
        observations: &[ValuationObservation],
    ) -> Result<usize, DecisionError> {
        Ok(self.repo.insert_valuation_batch(observations).await?)
    }

    pub async fn ledger_summary(&self) -> LedgerSummary {
        self.ledger.lock().await.summary()
    }

    pub async fn unrealized_pnl(&self, price: Decimal) -> PnlSummary {
        self.ledger.lock().await.unrealized_pnl(price)
    }
}
