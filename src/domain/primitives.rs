//! Domain primitives: TimeMs, Pool, LotId.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Get the underlying milliseconds value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }
}

impl std::fmt::Display for TimeMs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of the holdings a lot belongs to.
///
/// Core lots are never disposed by any automated path; only the Trading
/// pool is eligible for momentum- or override-driven liquidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pool {
    /// Protected long-term reserve.
    Core,
    /// Pool eligible for automated partial liquidation.
    Trading,
}

impl Pool {
    /// Canonical lowercase name, used for storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Pool::Core => "core",
            Pool::Trading => "trading",
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown pool name: {0}")]
pub struct PoolParseError(pub String);

impl std::str::FromStr for Pool {
    type Err = PoolParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "core" => Ok(Pool::Core),
            "trading" => Ok(Pool::Trading),
            other => Err(PoolParseError(other.to_string())),
        }
    }
}

impl std::fmt::Display for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Opaque identifier for a single acquisition lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LotId(pub Uuid);

impl LotId {
    /// Generate a fresh random lot id.
    pub fn generate() -> Self {
        LotId(Uuid::new_v4())
    }

    /// Parse a lot id from its canonical string form.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(LotId)
    }
}

impl std::fmt::Display for LotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
