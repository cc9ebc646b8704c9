//! Adaptive accumulation decision engine.
//!
//! Scores market snapshots against configurable valuation tables, applies
//! safety overrides, classifies the momentum regime from stored valuation
//! history, and maintains a HIFO cost-basis lot ledger split between a
//! protected Core pool and a tradable pool. Decisions are advisory; the
//! engine never talks to an exchange.

pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod ledger;
pub mod orchestration;

pub use config::{EngineConfig, StrategyConfig};
pub use db::{init_db, Repository};
pub use domain::{Decimal, IndicatorSnapshot, Lot, Pool, ValuationObservation};
pub use ledger::{LedgerSummary, PositionLedger};
pub use orchestration::{Advice, DecisionMode, DecisionOrchestrator, Recommendation};
