//! Counting areas (zones) and the immutable snapshots handed to stream workers.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::geometry::{point_in_polygon, scale_ring, FrameSize, Point};
use super::time::Timestamp;

/// Reasons an area definition cannot be used for counting.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AreaError {
    #[error("Area name must not be empty")]
    EmptyName,

    #[error("Area '{area}' needs at least 3 points, got {points}")]
    TooFewPoints { area: String, points: usize },

    #[error("Area '{area}' has a non-finite point at index {index}")]
    NonFinitePoint { area: String, index: usize },
}

/// A named polygon region. `area_name` is the unique key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaConfig {
    pub area_name: String,
    pub coordinates: Vec<Point>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: Timestamp,
    #[serde(default = "Utc::now")]
    pub updated_at: Timestamp,
}

impl AreaConfig {
    pub fn new(area_name: impl Into<String>, coordinates: Vec<Point>, now: Timestamp) -> Self {
        Self {
            area_name: area_name.into(),
            coordinates,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Check the ring is usable: non-empty name, at least three finite points.
    pub fn validate(&self) -> Result<(), AreaError> {
        if self.area_name.trim().is_empty() {
            return Err(AreaError::EmptyName);
        }
        if self.coordinates.len() < 3 {
            return Err(AreaError::TooFewPoints {
                area: self.area_name.clone(),
                points: self.coordinates.len(),
            });
        }
        if let Some(index) = self.coordinates.iter().position(|p| !p.is_finite()) {
            return Err(AreaError::NonFinitePoint {
                area: self.area_name.clone(),
                index,
            });
        }
        Ok(())
    }

    /// Even-odd containment of `p` in this area's ring.
    pub fn contains(&self, p: Point) -> bool {
        point_in_polygon(p, &self.coordinates)
    }

    /// Copy of this area with its ring rescaled from `from` to `to`.
    pub fn scaled(&self, from: FrameSize, to: FrameSize) -> Self {
        Self {
            coordinates: scale_ring(&self.coordinates, from, to),
            ..self.clone()
        }
    }
}

/// Immutable set of areas adopted by a stream worker between frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AreaSnapshot {
    /// Bumped every time a new snapshot is published.
    pub version: u64,
    pub areas: Vec<AreaConfig>,
}

impl AreaSnapshot {
    pub fn new(version: u64, areas: Vec<AreaConfig>) -> Self {
        Self { version, areas }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    pub fn get(&self, area_name: &str) -> Option<&AreaConfig> {
        self.areas.iter().find(|a| a.area_name == area_name)
    }

    pub fn into_shared(self) -> SharedAreaSnapshot {
        Arc::new(self)
    }
}

pub type SharedAreaSnapshot = Arc<AreaSnapshot>;
