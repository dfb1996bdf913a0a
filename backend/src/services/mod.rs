//! Orchestration and analytics on top of the counting core.
//!
//! - [`stream`]: one sequential worker per camera (tracker, zones, store, repository)
//! - [`counting`]: the service that owns the shared store and spawns workers
//! - [`forecasting`]: pure forecasting over time buckets

pub mod counting;
pub mod forecasting;
pub mod stream;

pub use counting::{CountingService, ServiceError, FRAME_CHANNEL_CAPACITY};
pub use forecasting::{Forecast, ForecastConfig, ForecastError, ForecastPoint, Forecaster};
pub use stream::{spawn_stream_worker, CameraStream, FrameReport, StreamError, StreamStats};
