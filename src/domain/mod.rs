//! Domain types for the accumulation decision engine.
//!
//! This module provides:
//! - Lossless numeric handling via the Decimal wrapper
//! - Domain primitives: TimeMs, Pool, LotId
//! - Indicator snapshot and historical valuation observations
//! - Acquisition lots and disposal plans/records

pub mod decimal;
pub mod lot;
pub mod primitives;
pub mod snapshot;

pub use decimal::Decimal;
pub use lot::{DepositSplit, DisposalPlan, DisposalRecord, Lot};
pub use primitives::{LotId, Pool, PoolParseError, TimeMs};
pub use snapshot::{IndicatorSnapshot, SnapshotError, ValuationObservation};
