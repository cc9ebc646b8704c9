//! Momentum exit state machine.
//!
//! Consumes a trailing window of raw valuation-ratio observations, smooths
//! it with an EMA, fits a regression slope over the tail of the smoothed
//! series, and classifies the regime into one of three momentum phases
//! (plus an inactive default). Memoryless: everything is recomputed from
//! the supplied window on every call.

use crate::config::MomentumConfig;
use crate::domain::ValuationObservation;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Market regime of the smoothed valuation series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MomentumPhase {
    /// Valuation rising fast; trim lightly into strength.
    Ascent,
    /// Valuation flat at an elevated level; the key distribution zone.
    Plateau,
    /// Valuation rolling over; exit with the most intensity.
    Decline,
    /// No phase matched, or not enough history. No liquidation.
    Inactive,
}

impl std::fmt::Display for MomentumPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MomentumPhase::Ascent => "ascent",
            MomentumPhase::Plateau => "plateau",
            MomentumPhase::Decline => "decline",
            MomentumPhase::Inactive => "inactive",
        };
        write!(f, "{}", s)
    }
}

/// Classification of the current momentum regime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MomentumState {
    pub phase: MomentumPhase,
    /// Last value of the exponentially smoothed series.
    pub smoothed_value: f64,
    /// OLS slope of the trailing smoothed points, per observation step.
    pub slope: f64,
    /// Suggested liquidation fraction of the Trading pool, already scaled
    /// by intensity and capped.
    pub sell_fraction: f64,
}

impl MomentumState {
    /// The degraded state used when history is too short to classify.
    pub fn inactive() -> Self {
        Self {
            phase: MomentumPhase::Inactive,
            smoothed_value: 0.0,
            slope: 0.0,
            sell_fraction: 0.0,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum MomentumError {
    #[error("momentum window too short: got {got} observations, need {need}")]
    InsufficientHistory { got: usize, need: usize },
}

/// Classify the momentum regime from a trailing valuation window.
///
/// The window must be ordered by time and deduplicated by timestamp; the
/// repository query that feeds this guarantees both.
///
/// # Errors
/// `InsufficientHistory` when the window is shorter than
/// `config.min_window` (or than the slope window, for degenerate
/// configs that set `min_window` below it). Callers running a full
/// decision degrade this to `Inactive` with zero liquidation rather
/// than aborting.
pub fn classify(
    window: &[ValuationObservation],
    config: &MomentumConfig,
) -> Result<MomentumState, MomentumError> {
    let need = config.min_window.max(config.slope_window).max(1);
    if window.len() < need {
        return Err(MomentumError::InsufficientHistory {
            got: window.len(),
            need,
        });
    }

    let smoothed = ema(window.iter().map(|o| o.valuation_ratio), config.ema_span);
    let smoothed_value = *smoothed.last().expect("window length checked above");

    let tail_start = smoothed.len() - config.slope_window;
    let slope = ols_slope(&smoothed[tail_start..]);

    let phase = classify_phase(slope, smoothed_value, config);
    let sell_fraction = liquidation_fraction(phase, smoothed_value, config);

    Ok(MomentumState {
        phase,
        smoothed_value,
        slope,
        sell_fraction,
    })
}

/// Ordered decision list; first match wins.
fn classify_phase(slope: f64, smoothed_value: f64, config: &MomentumConfig) -> MomentumPhase {
    if slope > config.ascent_slope {
        MomentumPhase::Ascent
    } else if slope < config.decline_slope {
        MomentumPhase::Decline
    } else if slope.abs() <= config.flat_slope && smoothed_value > config.plateau_level {
        MomentumPhase::Plateau
    } else {
        MomentumPhase::Inactive
    }
}

/// Per-phase liquidation fraction, scaled by how stretched the smoothed
/// valuation is and capped at the configured per-decision maximum.
pub fn liquidation_fraction(
    phase: MomentumPhase,
    smoothed_value: f64,
    config: &MomentumConfig,
) -> f64 {
    let base = match phase {
        MomentumPhase::Ascent => config.ascent_rate * config.ascent_factor,
        MomentumPhase::Plateau => config.plateau_rate * config.plateau_factor,
        MomentumPhase::Decline => config.decline_rate * config.decline_factor,
        MomentumPhase::Inactive => return 0.0,
    };
    let intensity = (smoothed_value / config.intensity_norm).clamp(0.0, 1.0);
    (base * intensity).min(config.max_auto_sell_fraction)
}

/// Exponential moving average with span-derived alpha, seeded with the
/// first raw value.
fn ema(values: impl Iterator<Item = f64>, span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::new();
    for value in values {
        let next = match out.last() {
            None => value,
            Some(prev) => alpha * value + (1.0 - alpha) * prev,
        };
        out.push(next);
    }
    out
}

/// Ordinary least-squares slope of `values` against x = 0, 1, 2, ...
fn ols_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if values.len() < 2 {
        return 0.0;
    }

    let sum_x: f64 = (0..values.len()).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_xx: f64 = (0..values.len()).map(|i| (i as f64).powi(2)).sum();

    let denom = n * sum_xx - sum_x * sum_x;
    if denom == 0.0 {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denom
}
