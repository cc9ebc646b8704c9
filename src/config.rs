//! Configuration surface for the decision engine.
//!
//! Process-level settings (`EngineConfig`) come from the environment the way
//! the surrounding service supplies them. Strategy parameters
//! (`StrategyConfig`) are an explicit, validated struct: the engine core
//! never reads the environment or hides tunables in module state. All
//! numeric thresholds here are tuned defaults, not invariants; only the
//! structure of the decision tables is fixed.

use crate::domain::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

/// Process-level engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_path: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        Ok(EngineConfig { database_path })
    }
}

/// One anchor point of the valuation normalization table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    /// Raw on-chain valuation ratio.
    pub ratio: f64,
    /// Normalized score at that ratio, 0-100.
    pub score: f64,
}

/// One band of the multiplier step function.
///
/// Applies to composite scores strictly below `upper_bound`; the bound
/// itself belongs to the next (more conservative) band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MultiplierStep {
    pub upper_bound: f64,
    pub multiplier: f64,
}

/// Scoring engine parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub valuation_weight: f64,
    pub momentum_weight: f64,
    pub sentiment_weight: f64,
    /// Piecewise-linear normalization anchors, ascending in `ratio`.
    /// Ratios outside the table clamp to the nearest endpoint.
    pub valuation_anchors: Vec<Anchor>,
    /// Ascending step bands; composite scores at or above the last bound
    /// fall through to `floor_multiplier`.
    pub multiplier_steps: Vec<MultiplierStep>,
    pub floor_multiplier: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            valuation_weight: 0.65,
            momentum_weight: 0.25,
            sentiment_weight: 0.10,
            valuation_anchors: vec![
                Anchor { ratio: 0.1, score: 0.0 },
                Anchor { ratio: 1.0, score: 10.0 },
                Anchor { ratio: 3.0, score: 30.0 },
                Anchor { ratio: 5.0, score: 50.0 },
                Anchor { ratio: 6.0, score: 65.0 },
                Anchor { ratio: 7.0, score: 80.0 },
                Anchor { ratio: 9.0, score: 90.0 },
                Anchor { ratio: 11.0, score: 100.0 },
            ],
            multiplier_steps: vec![
                MultiplierStep { upper_bound: 15.0, multiplier: 3.5 },
                MultiplierStep { upper_bound: 25.0, multiplier: 2.0 },
                MultiplierStep { upper_bound: 35.0, multiplier: 1.5 },
                MultiplierStep { upper_bound: 50.0, multiplier: 1.0 },
                MultiplierStep { upper_bound: 60.0, multiplier: 0.5 },
            ],
            floor_multiplier: 0.0,
        }
    }
}

impl ScoringConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, w) in [
            ("valuation_weight", self.valuation_weight),
            ("momentum_weight", self.momentum_weight),
            ("sentiment_weight", self.sentiment_weight),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(ConfigError::InvalidValue(
                    name.to_string(),
                    format!("must be a non-negative finite number, got {}", w),
                ));
            }
        }
        let weight_sum = self.valuation_weight + self.momentum_weight + self.sentiment_weight;
        if (weight_sum - 1.0).abs() > 1e-9 {
            return Err(ConfigError::InvalidValue(
                "scoring weights".to_string(),
                format!("must sum to 1.0, got {}", weight_sum),
            ));
        }

        if self.valuation_anchors.len() < 2 {
            return Err(ConfigError::InvalidValue(
                "valuation_anchors".to_string(),
                "need at least two anchor points to interpolate".to_string(),
            ));
        }
        for pair in self.valuation_anchors.windows(2) {
            if pair[1].ratio <= pair[0].ratio {
                return Err(ConfigError::InvalidValue(
                    "valuation_anchors".to_string(),
                    format!(
                        "ratios must be strictly increasing, got {} then {}",
                        pair[0].ratio, pair[1].ratio
                    ),
                ));
            }
            if pair[1].score < pair[0].score {
                return Err(ConfigError::InvalidValue(
                    "valuation_anchors".to_string(),
                    format!(
                        "scores must be non-decreasing, got {} then {}",
                        pair[0].score, pair[1].score
                    ),
                ));
            }
        }

        if self.multiplier_steps.is_empty() {
            return Err(ConfigError::InvalidValue(
                "multiplier_steps".to_string(),
                "need at least one step band".to_string(),
            ));
        }
        for pair in self.multiplier_steps.windows(2) {
            if pair[1].upper_bound <= pair[0].upper_bound {
                return Err(ConfigError::InvalidValue(
                    "multiplier_steps".to_string(),
                    "upper bounds must be strictly increasing".to_string(),
                ));
            }
            if pair[1].multiplier > pair[0].multiplier {
                return Err(ConfigError::InvalidValue(
                    "multiplier_steps".to_string(),
                    "multipliers must be non-increasing across bands".to_string(),
                ));
            }
        }
        let last = self
            .multiplier_steps
            .last()
            .expect("validated non-empty above");
        if self.floor_multiplier > last.multiplier {
            return Err(ConfigError::InvalidValue(
                "floor_multiplier".to_string(),
                "must not exceed the last step multiplier".to_string(),
            ));
        }
        Ok(())
    }
}

/// Safety override thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideConfig {
    /// Long-window oscillator level above which any buy is vetoed.
    pub overbought_threshold: f64,
    /// Fraction of the Trading pool liquidated on a topping signal.
    pub topping_liquidate_fraction: f64,
}

impl Default for OverrideConfig {
    fn default() -> Self {
        Self {
            overbought_threshold: 85.0,
            topping_liquidate_fraction: 1.0,
        }
    }
}

impl OverrideConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=100.0).contains(&self.overbought_threshold) {
            return Err(ConfigError::InvalidValue(
                "overbought_threshold".to_string(),
                format!("must be within 0-100, got {}", self.overbought_threshold),
            ));
        }
        if !(self.topping_liquidate_fraction > 0.0 && self.topping_liquidate_fraction <= 1.0) {
            return Err(ConfigError::InvalidValue(
                "topping_liquidate_fraction".to_string(),
                format!(
                    "must be within (0, 1], got {}",
                    self.topping_liquidate_fraction
                ),
            ));
        }
        Ok(())
    }
}

/// Momentum exit state machine parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentumConfig {
    /// EMA span over the raw valuation series.
    pub ema_span: usize,
    /// Number of trailing smoothed points used for the regression slope.
    pub slope_window: usize,
    /// Minimum observations required before classification is attempted.
    pub min_window: usize,
    /// Slope above which the regime is Ascent.
    pub ascent_slope: f64,
    /// Slope below which the regime is Decline.
    pub decline_slope: f64,
    /// Half-width of the flat band used for Plateau detection.
    pub flat_slope: f64,
    /// Smoothed-value floor for Plateau; a flat slope at low valuation is
    /// just Inactive.
    pub plateau_level: f64,
    /// Normalization constant for the intensity factor.
    pub intensity_norm: f64,
    pub ascent_rate: f64,
    pub ascent_factor: f64,
    pub plateau_rate: f64,
    pub plateau_factor: f64,
    pub decline_rate: f64,
    pub decline_factor: f64,
    /// Hard cap on any single automated sell, as a fraction of the pool.
    pub max_auto_sell_fraction: f64,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            ema_span: 14,
            slope_window: 7,
            min_window: 21,
            ascent_slope: 0.05,
            decline_slope: -0.05,
            flat_slope: 0.03,
            plateau_level: 3.0,
            intensity_norm: 2.0,
            ascent_rate: 0.002,
            ascent_factor: 0.5,
            plateau_rate: 0.01,
            plateau_factor: 2.5,
            decline_rate: 0.01,
            decline_factor: 4.0,
            max_auto_sell_fraction: 0.10,
        }
    }
}

impl MomentumConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.ema_span < 2 {
            return Err(ConfigError::InvalidValue(
                "ema_span".to_string(),
                "must be at least 2".to_string(),
            ));
        }
        if self.slope_window < 2 {
            return Err(ConfigError::InvalidValue(
                "slope_window".to_string(),
                "must be at least 2".to_string(),
            ));
        }
        if self.min_window < self.slope_window || self.min_window < self.ema_span {
            return Err(ConfigError::InvalidValue(
                "min_window".to_string(),
                format!(
                    "must cover both smoothing and regression windows ({} / {})",
                    self.ema_span, self.slope_window
                ),
            ));
        }
        if !(self.ascent_slope > 0.0) {
            return Err(ConfigError::InvalidValue(
                "ascent_slope".to_string(),
                "must be positive".to_string(),
            ));
        }
        if !(self.decline_slope < 0.0) {
            return Err(ConfigError::InvalidValue(
                "decline_slope".to_string(),
                "must be negative".to_string(),
            ));
        }
        if !(self.flat_slope >= 0.0 && self.flat_slope <= self.ascent_slope) {
            return Err(ConfigError::InvalidValue(
                "flat_slope".to_string(),
                "must be non-negative and not exceed ascent_slope".to_string(),
            ));
        }
        if !(self.intensity_norm > 0.0) {
            return Err(ConfigError::InvalidValue(
                "intensity_norm".to_string(),
                "must be positive".to_string(),
            ));
        }
        for (name, v) in [
            ("ascent_rate", self.ascent_rate),
            ("ascent_factor", self.ascent_factor),
            ("plateau_rate", self.plateau_rate),
            ("plateau_factor", self.plateau_factor),
            ("decline_rate", self.decline_rate),
            ("decline_factor", self.decline_factor),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(ConfigError::InvalidValue(
                    name.to_string(),
                    format!("must be a non-negative finite number, got {}", v),
                ));
            }
        }
        if !(self.max_auto_sell_fraction > 0.0 && self.max_auto_sell_fraction <= 1.0) {
            return Err(ConfigError::InvalidValue(
                "max_auto_sell_fraction".to_string(),
                format!("must be within (0, 1], got {}", self.max_auto_sell_fraction),
            ));
        }
        Ok(())
    }
}

/// Complete strategy configuration consumed by the orchestrator.
///
/// Immutable for the duration of a decision call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Base recurring buy amount, in currency units.
    pub base_weekly_amount: Decimal,
    /// Share of every deposit routed to the protected Core pool, 0-1.
    pub core_ratio: Decimal,
    pub scoring: ScoringConfig,
    pub overrides: OverrideConfig,
    pub momentum: MomentumConfig,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            base_weekly_amount: Decimal::from_str("250").expect("literal"),
            core_ratio: Decimal::from_str("0.4").expect("literal"),
            scoring: ScoringConfig::default(),
            overrides: OverrideConfig::default(),
            momentum: MomentumConfig::default(),
        }
    }
}

impl StrategyConfig {
    /// Parse a strategy configuration from JSON and validate it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: StrategyConfig = serde_json::from_str(json)
            .map_err(|e| ConfigError::InvalidValue("strategy json".to_string(), e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every table and threshold.
    ///
    /// # Errors
    /// Returns the first violated constraint; a config that fails here must
    /// not be handed to the orchestrator.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_weekly_amount.is_positive() {
            return Err(ConfigError::InvalidValue(
                "base_weekly_amount".to_string(),
                format!("must be positive, got {}", self.base_weekly_amount),
            ));
        }
        if self.core_ratio.is_negative() || self.core_ratio > Decimal::one() {
            return Err(ConfigError::InvalidValue(
                "core_ratio".to_string(),
                format!("must be within 0-1, got {}", self.core_ratio),
            ));
        }
        self.scoring.validate()?;
        self.overrides.validate()?;
        self.momentum.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_database_path() {
        let result = EngineConfig::from_env_map(HashMap::new());
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_default_strategy_config_is_valid() {
        StrategyConfig::default().validate().expect("defaults");
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let mut config = StrategyConfig::default();
        config.scoring.valuation_weight = 0.9;
        match config.validate() {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "scoring weights"),
            other => panic!("Expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_anchor_ratios_must_increase() {
        let mut config = StrategyConfig::default();
        config.scoring.valuation_anchors[1].ratio = 0.05;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(k, _)) if k == "valuation_anchors"
        ));
    }

    #[test]
    fn test_multipliers_must_not_increase() {
        let mut config = StrategyConfig::default();
        config.scoring.multiplier_steps[1].multiplier = 5.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(k, _)) if k == "multiplier_steps"
        ));
    }

    #[test]
    fn test_core_ratio_bounds() {
        let mut config = StrategyConfig::default();
        config.core_ratio = Decimal::from_str("1.2").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(k, _)) if k == "core_ratio"
        ));
    }

    #[test]
    fn test_min_window_must_cover_smoothing() {
        let mut config = StrategyConfig::default();
        config.momentum.min_window = 5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(k, _)) if k == "min_window"
        ));
    }

    #[test]
    fn test_from_json_str_roundtrip() {
        let json = serde_json::to_string(&StrategyConfig::default()).unwrap();
        let parsed = StrategyConfig::from_json_str(&json).unwrap();
        assert_eq!(parsed, StrategyConfig::default());
    }

    #[test]
    fn test_from_json_str_rejects_bad_table() {
        let mut config = StrategyConfig::default();
        config.momentum.max_auto_sell_fraction = 1.5;
        let json = serde_json::to_string(&config).unwrap();
        assert!(StrategyConfig::from_json_str(&json).is_err());
    }
}
