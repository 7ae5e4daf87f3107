//! Small helpers shared by managers and workers: budget limits, name sequences and
//! rectifying durations.
//!
pub mod serde;

use crate::sync::atomic::{AtomicU64, Ordering};
use ::serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

/// A ceiling on a counter such as a worker's task or error count.
///
/// Configuration files and flags encode these as signed integers where any negative number
/// (conventionally `-1`) means there is no ceiling.
///
#[derive(Default, Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum Limit {
    #[default]
    Unlimited,
    AtMost(u64),
}

impl Limit {
    pub fn from_signed(value: i64) -> Self {
        if value < 0 {
            Limit::Unlimited
        } else {
            Limit::AtMost(value as u64)
        }
    }

    pub fn as_signed(&self) -> i64 {
        match self {
            Limit::Unlimited => -1,
            Limit::AtMost(max) => i64::try_from(*max).unwrap_or(i64::MAX),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, Limit::Unlimited)
    }

    /// True when `0 <= max <= count`.
    pub fn is_reached(&self, count: u64) -> bool {
        match self {
            Limit::Unlimited => false,
            Limit::AtMost(max) => *max <= count,
        }
    }
}

impl From<i64> for Limit {
    fn from(value: i64) -> Self {
        Self::from_signed(value)
    }
}

impl From<i32> for Limit {
    fn from(value: i32) -> Self {
        Self::from_signed(value.into())
    }
}

impl std::fmt::Display for Limit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Limit::Unlimited => f.write_str("unlimited"),
            Limit::AtMost(max) => write!(f, "{}", max),
        }
    }
}

impl Serialize for Limit {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(self.as_signed())
    }
}

impl<'de> Deserialize<'de> for Limit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        i64::deserialize(deserializer).map(Limit::from_signed)
    }
}

/// A monotonically increasing counter used to generate unique names.
///
/// Every manager owns its own sequences, so names are only unique within a manager. Manager
/// names themselves carry a random suffix to tell pools apart.
///
#[derive(Debug, Default)]
pub struct Sequence(AtomicU64);

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// Return `value` unless it is zero, in which case `fallback` is used.
pub fn rectify(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

/// Turn a float number of seconds into a [Duration], mapping negative, NaN and infinite
/// values to zero so they can be rectified later.
pub fn seconds_or_zero(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}
