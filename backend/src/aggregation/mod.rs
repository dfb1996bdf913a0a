//! In-memory aggregation of counting events.
//!
//! The [`AggregationStore`] is the only state shared between stream workers.
//! It keeps one running occupancy accumulator and one ordered map of
//! fixed-width time buckets per area.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{EventType, Granularity, StreamId, Timestamp, TrackId};

pub mod store;

pub use store::AggregationStore;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AggregationError {
    #[error("Bucket granularity must be positive")]
    ZeroGranularity,

    #[error("Granularity {requested} is not a multiple of the base granularity {base}")]
    IncompatibleGranularity {
        requested: Granularity,
        base: Granularity,
    },

    #[error("Time window ends ({end}) before it starts ({start})")]
    InvertedWindow { start: Timestamp, end: Timestamp },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Width of the stored base buckets
    #[serde(default = "default_bucket_granularity_secs")]
    pub bucket_granularity_secs: u32,
    /// Buckets older than this are evicted
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// Trailing window for recent entry/exit counts in live snapshots
    #[serde(default = "default_live_window_secs")]
    pub live_window_secs: u64,
    /// Never let occupancy drop below zero
    #[serde(default = "default_clamp_occupancy_at_zero")]
    pub clamp_occupancy_at_zero: bool,
    /// Size of the recent-event ring buffer
    #[serde(default = "default_recent_event_capacity")]
    pub recent_event_capacity: usize,
}

fn default_bucket_granularity_secs() -> u32 {
    60
}

fn default_retention_secs() -> u64 {
    30 * 24 * 3_600
}

fn default_live_window_secs() -> u64 {
    300
}

fn default_clamp_occupancy_at_zero() -> bool {
    true
}

fn default_recent_event_capacity() -> usize {
    1_000
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            bucket_granularity_secs: default_bucket_granularity_secs(),
            retention_secs: default_retention_secs(),
            live_window_secs: default_live_window_secs(),
            clamp_occupancy_at_zero: default_clamp_occupancy_at_zero(),
            recent_event_capacity: default_recent_event_capacity(),
        }
    }
}

impl AggregationConfig {
    pub fn granularity(&self) -> Result<Granularity, AggregationError> {
        Granularity::from_secs(self.bucket_granularity_secs)
            .ok_or(AggregationError::ZeroGranularity)
    }

    pub fn retention(&self) -> Duration {
        clamped_seconds(self.retention_secs)
    }

    pub fn live_window(&self) -> Duration {
        clamped_seconds(self.live_window_secs)
    }
}

// chrono rejects durations beyond i64::MAX milliseconds.
fn clamped_seconds(secs: u64) -> Duration {
    const MAX_SECS: u64 = (i64::MAX / 1_000) as u64;
    Duration::seconds(secs.min(MAX_SECS) as i64)
}

/// Entry and exit counts for one aligned interval `[start, start + granularity)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBucket {
    pub start: Timestamp,
    pub entry_count: u64,
    pub exit_count: u64,
    /// Entries minus exits within this bucket
    pub net_count: i64,
}

impl TimeBucket {
    pub fn empty(start: Timestamp) -> Self {
        Self {
            start,
            entry_count: 0,
            exit_count: 0,
            net_count: 0,
        }
    }

    pub fn apply(&mut self, event_type: EventType) {
        match event_type {
            EventType::Entry => self.entry_count += 1,
            EventType::Exit => self.exit_count += 1,
        }
        self.net_count += event_type.delta();
    }

    /// Add another bucket's counts into this one.
    pub fn absorb(&mut self, other: &TimeBucket) {
        self.entry_count += other.entry_count;
        self.exit_count += other.exit_count;
        self.net_count += other.net_count;
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0 && self.exit_count == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaOccupancy {
    pub area_name: String,
    pub occupancy: i64,
    pub recent_entries: u64,
    pub recent_exits: u64,
    pub last_event: Option<Timestamp>,
}

/// Point-in-time view for dashboards. Never persisted.
///
/// Active tracks come from the trackers' live sets, not from events, so
/// they are not restricted by an area filter. Track ids are only unique
/// within one stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSnapshot {
    pub generated_at: Timestamp,
    pub window_secs: i64,
    pub occupancy: i64,
    pub active_tracks: usize,
    pub active_track_ids: BTreeMap<StreamId, Vec<TrackId>>,
    pub recent_entries: u64,
    pub recent_exits: u64,
    pub areas: Vec<AreaOccupancy>,
    pub last_updated: Option<Timestamp>,
}

/// Totals over a time range, at base bucket resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountSummary {
    pub area_name: Option<String>,
    pub start: Timestamp,
    pub end: Timestamp,
    pub entries: u64,
    pub exits: u64,
    pub net: i64,
}
