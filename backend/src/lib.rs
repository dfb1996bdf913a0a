//! # zonecount
//!
//! People and object counting for fixed cameras.
//!
//! Per-frame detector boxes are turned into stable tracks, tracks into
//! debounced zone entry/exit events, and events into time-bucketed occupancy
//! statistics from which short-horizon forecasts are produced.
//!
//! ## Pipeline
//!
//! ```text
//! Frame ──► CentroidTracker ──► ZoneMembershipDetector ──► AggregationStore ──► Forecaster
//!                                         │
//!                                         └──► EventRepository (at-least-once)
//! ```
//!
//! ## Architecture
//!
//! - [`models`]: plain data types (detections, areas, events, time buckets)
//! - [`tracking`]: identity assignment across frames
//! - [`zones`]: per (track, area) debounced membership state machine
//! - [`aggregation`]: shared, per-area locked occupancy counters and time buckets
//! - [`db`]: repository traits and the in-memory implementation
//! - [`services`]: stream workers, the counting service and the forecaster
//! - [`config`]: TOML application configuration
//!
//! One [`services::CameraStream`] is bound to one camera and processes its
//! frames sequentially. Streams share only the [`aggregation::AggregationStore`]
//! and the repository.

// RepositoryError carries structured context
#![allow(clippy::result_large_err)]

pub mod aggregation;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod tracking;
pub mod zones;

pub use aggregation::{AggregationStore, LiveSnapshot, TimeBucket};
pub use config::AppConfig;
pub use services::{CameraStream, CountingService, Forecaster};
pub use tracking::{CentroidTracker, Tracker};
pub use zones::ZoneMembershipDetector;
