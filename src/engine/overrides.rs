//! Safety override layer.
//!
//! Inspects the raw snapshot and can veto the buy side or force a
//! liquidation of the Trading pool regardless of the composite score.
//! The Core pool is never touched by any rule here.

use crate::config::OverrideConfig;
use crate::domain::IndicatorSnapshot;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Outcome of the override rules for one snapshot.
///
/// Buy-side and sell-side rules fire independently; a forced value always
/// wins over the score-derived one.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OverrideDecision {
    /// When set, replaces the score-derived buy multiplier.
    pub forced_multiplier: Option<f64>,
    /// When set, replaces the momentum-derived sell fraction.
    pub forced_liquidate_fraction: Option<f64>,
    /// Why the buy side was overridden.
    pub buy_reason: Option<String>,
    /// Why the sell side was overridden.
    pub sell_reason: Option<String>,
}

impl OverrideDecision {
    /// Whether any rule fired.
    pub fn any(&self) -> bool {
        self.forced_multiplier.is_some() || self.forced_liquidate_fraction.is_some()
    }
}

/// Evaluate the override rules in order; first match per side wins.
pub fn apply_overrides(snapshot: &IndicatorSnapshot, config: &OverrideConfig) -> OverrideDecision {
    let mut decision = OverrideDecision::default();

    // Rule 1: cycle-top cross liquidates the full Trading pool.
    if snapshot.topping_signal_crossed {
        decision.forced_liquidate_fraction = Some(config.topping_liquidate_fraction);
        decision.sell_reason = Some(format!(
            "topping signal crossed: liquidate {:.0}% of trading pool",
            config.topping_liquidate_fraction * 100.0
        ));
        warn!(
            fraction = config.topping_liquidate_fraction,
            "safety override: topping signal crossed"
        );
    }

    // Rule 2: long-window overbought vetoes any buy, even a deep-value one.
    if snapshot.long_window_oscillator > config.overbought_threshold {
        decision.forced_multiplier = Some(0.0);
        decision.buy_reason = Some(format!(
            "overbought veto: long-window oscillator {:.1} > {:.1}",
            snapshot.long_window_oscillator, config.overbought_threshold
        ));
        warn!(
            oscillator = snapshot.long_window_oscillator,
            threshold = config.overbought_threshold,
            "safety override: overbought veto"
        );
    }

    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Decimal, TimeMs};
    use std::str::FromStr;

    fn snapshot(topping: bool, long_window_oscillator: f64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            time_ms: TimeMs::new(1_700_000_000_000),
            spot_price: Decimal::from_str("60000").unwrap(),
            valuation_ratio: 0.5,
            momentum_oscillator: 20.0,
            sentiment_index: 15.0,
            long_ma: 42000.0,
            topping_signal_crossed: topping,
            long_window_oscillator,
        }
    }

    #[test]
    fn test_no_rules_fire_on_calm_market() {
        let decision = apply_overrides(&snapshot(false, 50.0), &OverrideConfig::default());
        assert!(!decision.any());
        assert_eq!(decision, OverrideDecision::default());
    }

    #[test]
    fn test_topping_signal_forces_full_liquidation() {
        let decision = apply_overrides(&snapshot(true, 50.0), &OverrideConfig::default());
        assert_eq!(decision.forced_liquidate_fraction, Some(1.0));
        assert!(decision.forced_multiplier.is_none());
        assert!(decision.sell_reason.unwrap().contains("topping signal"));
    }

    #[test]
    fn test_overbought_vetoes_buy() {
        let decision = apply_overrides(&snapshot(false, 90.0), &OverrideConfig::default());
        assert_eq!(decision.forced_multiplier, Some(0.0));
        assert!(decision.forced_liquidate_fraction.is_none());
        assert!(decision.buy_reason.unwrap().contains("overbought veto"));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let decision = apply_overrides(&snapshot(false, 85.0), &OverrideConfig::default());
        assert!(decision.forced_multiplier.is_none());
    }

    #[test]
    fn test_both_sides_fire_independently() {
        let decision = apply_overrides(&snapshot(true, 95.0), &OverrideConfig::default());
        assert_eq!(decision.forced_multiplier, Some(0.0));
        assert_eq!(decision.forced_liquidate_fraction, Some(1.0));
    }
}
