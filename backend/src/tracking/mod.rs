//! Identity assignment for per-frame detections.
//!
//! The only implementation is the greedy nearest-centroid matcher in
//! [`centroid`]. Anything else that honours the [`Tracker`] contract (for
//! example an optimal bipartite matcher) can replace it without touching the
//! zone detector or the aggregation store.

use serde::Serialize;
use std::collections::VecDeque;

use crate::models::{BoundingBox, Detection, Point, Timestamp, TrackId};

pub mod centroid;

pub use centroid::{CentroidTracker, TrackerConfig};

/// A persistent identity for one object across frames.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub id: TrackId,
    pub centroid: Point,
    pub bbox: BoundingBox,
    pub confidence: f64,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    /// Consecutive frames without a matching detection.
    pub missed_frames: u32,
    /// Frames with a matching detection, creation included.
    pub hits: u32,
    /// Most recent centroids, oldest first.
    pub trail: VecDeque<Point>,
}

impl Track {
    pub fn has_valid_position(&self) -> bool {
        self.centroid.is_finite()
    }

    /// Matched in the latest frame, so `centroid` is current.
    pub fn is_fresh(&self) -> bool {
        self.missed_frames == 0
    }
}

pub trait Tracker {
    /// Feed one frame's detections, in strict frame order, and get back every
    /// live track after the update.
    fn update(&mut self, detections: &[Detection], now: Timestamp) -> Vec<Track>;

    fn active_tracks(&self) -> Vec<Track>;

    fn active_track_ids(&self) -> Vec<TrackId> {
        self.active_tracks().iter().map(|t| t.id).collect()
    }
}
