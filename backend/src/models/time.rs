//! Timestamps, bucket granularities and time windows.
//!
//! All timestamps are UTC. Buckets are aligned to the Unix epoch, so two
//! stores with the same granularity always agree on bucket boundaries.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Wall-clock instant attached to frames, events and buckets.
pub type Timestamp = DateTime<Utc>;

/// Fixed bucket width, in whole seconds (always > 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Granularity(u32);

impl Granularity {
    pub const MINUTE: Granularity = Granularity(60);
    pub const FIVE_MINUTES: Granularity = Granularity(300);
    pub const HOUR: Granularity = Granularity(3_600);
    pub const DAY: Granularity = Granularity(86_400);

    /// Create a granularity of `secs` seconds. Zero is rejected.
    pub fn from_secs(secs: u32) -> Option<Self> {
        (secs > 0).then_some(Self(secs))
    }

    pub fn as_secs(&self) -> i64 {
        i64::from(self.0)
    }

    pub fn as_duration(&self) -> Duration {
        Duration::seconds(self.as_secs())
    }

    /// Start of the bucket containing `ts`.
    pub fn align(&self, ts: Timestamp) -> Timestamp {
        let width = self.as_secs();
        let start = ts.timestamp().div_euclid(width) * width;
        Utc.timestamp_opt(start, 0).single().unwrap_or(ts)
    }

    /// Start of the bucket following the one starting at `start`. Saturates
    /// at the last representable instant.
    pub fn next(&self, start: Timestamp) -> Timestamp {
        start
            .checked_add_signed(self.as_duration())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Whether buckets of `self` are an exact union of buckets of `base`.
    pub fn is_multiple_of(&self, base: Granularity) -> bool {
        self.0 % base.0 == 0
    }
}

impl TryFrom<u32> for Granularity {
    type Error = String;

    fn try_from(secs: u32) -> Result<Self, Self::Error> {
        Granularity::from_secs(secs).ok_or_else(|| "granularity must be positive".to_string())
    }
}

impl From<Granularity> for u32 {
    fn from(g: Granularity) -> Self {
        g.0
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// Half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeWindow {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// The `length` immediately preceding `now`, `now` included. Lengths
    /// reaching past the representable range start at the earliest instant.
    pub fn trailing(now: Timestamp, length: Duration) -> Self {
        Self {
            start: now
                .checked_sub_signed(length)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            end: now
                .checked_add_signed(Duration::nanoseconds(1))
                .unwrap_or(now),
        }
    }

    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.start && ts < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

#[cfg(test)]
#[path = "time_tests.rs"]
mod time_tests;
