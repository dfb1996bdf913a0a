//! Detector output consumed by the tracker.

use serde::{Deserialize, Serialize};

use super::geometry::{BoundingBox, Point};
use super::time::Timestamp;
use super::StreamId;

/// One object reported by the upstream detector for one frame. Carries no
/// identity; the tracker assigns one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f64,
    pub timestamp: Timestamp,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f64, timestamp: Timestamp) -> Self {
        Self {
            bbox,
            confidence,
            timestamp,
        }
    }

    pub fn centroid(&self) -> Point {
        self.bbox.centroid()
    }

    /// Finite coordinates and a finite confidence.
    pub fn is_well_formed(&self) -> bool {
        self.bbox.is_finite() && self.confidence.is_finite()
    }
}

/// All detections of one video frame, delivered as a single batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub stream_id: StreamId,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

impl Frame {
    pub fn new(stream_id: StreamId, timestamp: Timestamp, detections: Vec<Detection>) -> Self {
        Self {
            stream_id,
            timestamp,
            detections,
        }
    }
}
