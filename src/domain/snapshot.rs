//! Indicator snapshot consumed by the decision engine.
//!
//! Snapshots are produced by an external indicator collaborator once per
//! invocation; the engine only validates and combines them, it never
//! fetches or mutates them.

use crate::domain::{Decimal, TimeMs};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One timestamped set of normalized market indicators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    /// When the indicators were observed.
    pub time_ms: TimeMs,
    /// Current spot price, used to turn a buy amount into a lot.
    pub spot_price: Decimal,
    /// On-chain valuation ratio (e.g. MVRV Z-Score), >= 0.
    pub valuation_ratio: f64,
    /// Momentum oscillator (e.g. daily RSI), 0-100.
    pub momentum_oscillator: f64,
    /// Sentiment index (e.g. Fear & Greed), 0-100.
    pub sentiment_index: f64,
    /// Long-window moving average, in price units.
    pub long_ma: f64,
    /// Whether the topping oscillator has crossed (cycle-top signal).
    pub topping_signal_crossed: bool,
    /// Long-window oscillator (e.g. monthly RSI), 0-100.
    pub long_window_oscillator: f64,
}

impl IndicatorSnapshot {
    /// Check that every numeric field is present and well-formed.
    ///
    /// # Errors
    /// Returns the first malformed field found. A snapshot that fails
    /// validation aborts the whole decide call; there is no sound partial
    /// recommendation over bad inputs.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        check_finite("valuation_ratio", self.valuation_ratio)?;
        if self.valuation_ratio < 0.0 {
            return Err(SnapshotError::OutOfRange {
                field: "valuation_ratio",
                value: self.valuation_ratio,
                expected: ">= 0",
            });
        }
        check_bounded_0_100("momentum_oscillator", self.momentum_oscillator)?;
        check_bounded_0_100("sentiment_index", self.sentiment_index)?;
        check_bounded_0_100("long_window_oscillator", self.long_window_oscillator)?;
        check_finite("long_ma", self.long_ma)?;
        if !self.spot_price.is_positive() {
            return Err(SnapshotError::NonPositivePrice {
                value: self.spot_price,
            });
        }
        Ok(())
    }
}

fn check_finite(field: &'static str, value: f64) -> Result<(), SnapshotError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SnapshotError::NotFinite { field, value })
    }
}

fn check_bounded_0_100(field: &'static str, value: f64) -> Result<(), SnapshotError> {
    check_finite(field, value)?;
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(SnapshotError::OutOfRange {
            field,
            value,
            expected: "0-100",
        })
    }
}

/// Malformed indicator snapshot.
#[derive(Debug, Error, PartialEq)]
pub enum SnapshotError {
    #[error("snapshot field {field} is not a finite number: {value}")]
    NotFinite { field: &'static str, value: f64 },
    #[error("snapshot field {field} = {value} outside expected range {expected}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        expected: &'static str,
    },
    #[error("snapshot spot_price must be positive, got {value}")]
    NonPositivePrice { value: Decimal },
}

/// One historical `(timestamp, valuation_ratio)` observation.
///
/// The momentum window is a time-ordered, timestamp-deduplicated sequence
/// of these, persisted across invocations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValuationObservation {
    pub time_ms: TimeMs,
    pub valuation_ratio: f64,
}

impl ValuationObservation {
    pub fn new(time_ms: TimeMs, valuation_ratio: f64) -> Self {
        Self {
            time_ms,
            valuation_ratio,
        }
    }
}
