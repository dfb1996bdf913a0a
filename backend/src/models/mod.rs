//! Plain data types shared by every stage of the counting pipeline.

pub mod area;
pub mod detection;
pub mod event;
pub mod geometry;
pub mod macros;
pub mod time;

pub use area::{AreaConfig, AreaError, AreaSnapshot, SharedAreaSnapshot};
pub use detection::{Detection, Frame};
pub use event::{CountingEvent, EventFilter, EventKey, EventType};
pub use geometry::{distance, point_in_polygon, BoundingBox, FrameSize, Point};
pub use time::{Granularity, TimeWindow, Timestamp};

crate::define_id_type!(u64, TrackId);
crate::define_id_type!(u32, StreamId);
