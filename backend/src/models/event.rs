//! Counting events emitted by the zone detector.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::time::Timestamp;
use super::TrackId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Entry,
    Exit,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Entry => "entry",
            EventType::Exit => "exit",
        }
    }

    /// Contribution of this event to net occupancy.
    pub fn delta(&self) -> i64 {
        match self {
            EventType::Entry => 1,
            EventType::Exit => -1,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "entry" => Ok(EventType::Entry),
            "exit" => Ok(EventType::Exit),
            _ => Err(format!("Unknown event type: {}", s)),
        }
    }
}

/// An entry into or exit from an area. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountingEvent {
    pub track_id: TrackId,
    pub event_type: EventType,
    pub area_name: String,
    pub timestamp: Timestamp,
    /// Exit generated because the track was lost while inside the area.
    #[serde(default)]
    pub synthetic: bool,
}

impl CountingEvent {
    pub fn entry(track_id: TrackId, area_name: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            track_id,
            event_type: EventType::Entry,
            area_name: area_name.into(),
            timestamp,
            synthetic: false,
        }
    }

    pub fn exit(track_id: TrackId, area_name: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            track_id,
            event_type: EventType::Exit,
            area_name: area_name.into(),
            timestamp,
            synthetic: false,
        }
    }

    pub fn synthetic_exit(
        track_id: TrackId,
        area_name: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            synthetic: true,
            ..Self::exit(track_id, area_name, timestamp)
        }
    }

    /// Idempotency key used by event stores to drop retried duplicates.
    pub fn key(&self) -> EventKey {
        EventKey {
            track_id: self.track_id,
            area_name: self.area_name.clone(),
            event_type: self.event_type,
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub track_id: TrackId,
    pub area_name: String,
    pub event_type: EventType,
    pub timestamp: Timestamp,
}

/// Selection of stored or buffered events, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    pub area_name: Option<String>,
    pub event_type: Option<EventType>,
    pub track_id: Option<TrackId>,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    #[serde(default)]
    pub skip: usize,
    pub limit: Option<usize>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn area(mut self, area_name: impl Into<String>) -> Self {
        self.area_name = Some(area_name.into());
        self
    }

    pub fn event_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn track(mut self, track_id: TrackId) -> Self {
        self.track_id = Some(track_id);
        self
    }

    pub fn between(mut self, start: Timestamp, end: Timestamp) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    pub fn page(mut self, skip: usize, limit: usize) -> Self {
        self.skip = skip;
        self.limit = Some(limit);
        self
    }

    /// Whether `event` passes every predicate (pagination aside). Both time
    /// bounds are inclusive.
    pub fn matches(&self, event: &CountingEvent) -> bool {
        self.area_name
            .as_deref()
            .map_or(true, |a| a == event.area_name)
            && self.event_type.map_or(true, |t| t == event.event_type)
            && self.track_id.map_or(true, |id| id == event.track_id)
            && self.start_time.map_or(true, |s| event.timestamp >= s)
            && self.end_time.map_or(true, |e| event.timestamp <= e)
    }
}
