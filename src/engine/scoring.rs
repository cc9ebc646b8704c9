//! Composite valuation scoring and the buy-multiplier step function.

use crate::config::{Anchor, ScoringConfig};
use crate::domain::{IndicatorSnapshot, SnapshotError};
use serde::{Deserialize, Serialize};

/// Result of scoring one indicator snapshot.
///
/// Lower composite scores mean deeper undervaluation. The multiplier is a
/// pure step function of the composite score and never increases as the
/// score rises.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Weighted blend of valuation, momentum and sentiment, 0-100.
    pub composite_score: f64,
    /// Target deployment multiplier applied to the base weekly amount.
    pub multiplier: f64,
    /// Valuation ratio mapped onto the 0-100 scale (for rationale display).
    pub normalized_valuation: f64,
}

impl ScoreResult {
    /// Short human-readable label for the score band, used in rationales.
    pub fn band_label(&self) -> &'static str {
        if self.multiplier >= 3.0 {
            "deep value, maximum accumulation"
        } else if self.multiplier >= 2.0 {
            "strong value, heavy accumulation"
        } else if self.multiplier >= 1.5 {
            "value zone, increased buying"
        } else if self.multiplier >= 1.0 {
            "neutral, regular buying"
        } else if self.multiplier > 0.0 {
            "mildly overheated, reduced buying"
        } else {
            "overheated, buying paused"
        }
    }
}

/// Score a snapshot against the configured tables.
///
/// Pure function: no side effects, no hidden state. `config` must have
/// passed `StrategyConfig::validate`; the interpolation needs at least
/// two anchors.
///
/// # Errors
/// Fails only on a malformed snapshot (NaN/out-of-range field).
///
/// # Panics
/// In debug builds, panics on a config with fewer than two anchors.
pub fn score(
    snapshot: &IndicatorSnapshot,
    config: &ScoringConfig,
) -> Result<ScoreResult, SnapshotError> {
    debug_assert!(
        config.valuation_anchors.len() >= 2,
        "scoring config not validated: need at least two anchors"
    );
    snapshot.validate()?;

    let normalized_valuation =
        normalize_valuation(snapshot.valuation_ratio, &config.valuation_anchors);
    let composite_score = config.valuation_weight * normalized_valuation
        + config.momentum_weight * snapshot.momentum_oscillator
        + config.sentiment_weight * snapshot.sentiment_index;
    let multiplier = multiplier_for(composite_score, config);

    Ok(ScoreResult {
        composite_score,
        multiplier,
        normalized_valuation,
    })
}

/// Map a raw valuation ratio onto 0-100 by piecewise-linear interpolation
/// over the anchor table. Ratios outside the table clamp to the nearest
/// endpoint.
fn normalize_valuation(ratio: f64, anchors: &[Anchor]) -> f64 {
    let first = anchors.first().expect("config validated: >= 2 anchors");
    let last = anchors.last().expect("config validated: >= 2 anchors");

    if ratio <= first.ratio {
        return first.score;
    }
    if ratio >= last.ratio {
        return last.score;
    }

    for pair in anchors.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        if ratio <= hi.ratio {
            let t = (ratio - lo.ratio) / (hi.ratio - lo.ratio);
            return lo.score + t * (hi.score - lo.score);
        }
    }

    last.score
}

/// Step-function lookup: first band whose upper bound exceeds the score
/// wins; a score exactly on a boundary takes the next (lower) multiplier.
fn multiplier_for(composite_score: f64, config: &ScoringConfig) -> f64 {
    for step in &config.multiplier_steps {
        if composite_score < step.upper_bound {
            return step.multiplier;
        }
    }
    config.floor_multiplier
}
