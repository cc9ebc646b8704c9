//! Decision cycle orchestration and advisory output.

pub mod orchestrator;
pub mod recommendation;

pub use orchestrator::{DecisionError, DecisionOrchestrator};
pub use recommendation::{Advice, DecisionMode, Recommendation};
