//! Coarse logical clock used for last-write-wins.
//!
//! Clocks are wall-clock seconds since the Unix epoch, kept monotonic per
//! entity by [`Clock::next_after`]. Two devices can assign the same value;
//! the merge engine treats ties as "keep local".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A logical clock value (seconds since Unix epoch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Clock(i64);

impl Clock {
    /// The zero clock; every entity is at or after it.
    pub const ZERO: Clock = Clock(0);

    /// Creates a clock from raw seconds.
    #[must_use]
    pub const fn new(secs: i64) -> Self {
        Self(secs)
    }

    /// Creates a clock at the current wall time.
    #[must_use]
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        Self(secs)
    }

    /// Returns the raw seconds.
    #[must_use]
    pub const fn as_secs(&self) -> i64 {
        self.0
    }

    /// Generates the clock for a new local write to an entity whose current
    /// clock is `self`.
    ///
    /// The result is strictly greater than `self` even when the wall clock
    /// lags behind a value received from another device.
    #[must_use]
    pub fn next_after(&self) -> Self {
        let now = Self::now();
        if now.0 > self.0 {
            now
        } else {
            Self(self.0.saturating_add(1))
        }
    }

    /// Returns true if this clock strictly supersedes `other`.
    #[must_use]
    pub fn supersedes(&self, other: &Self) -> bool {
        self.0 > other.0
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Clock {
    fn from(secs: i64) -> Self {
        Self(secs)
    }
}
