//! Pure computation engines for the accumulation decision logic.
//!
//! Everything in here is a deterministic function over an immutable
//! snapshot plus an explicit configuration; no I/O, no hidden state.

pub mod momentum;
pub mod overrides;
pub mod scoring;

pub use momentum::{classify, MomentumError, MomentumPhase, MomentumState};
pub use overrides::{apply_overrides, OverrideDecision};
pub use scoring::{score, ScoreResult};
