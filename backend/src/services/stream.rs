//! Per-camera frame processing.
//!
//! A [`CameraStream`] owns one tracker and one zone detector and must see
//! its frames strictly in order. Streams share nothing but the aggregation
//! store and the repository, so each camera runs as its own worker.

use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::aggregation::AggregationStore;
use crate::config::AppConfig;
use crate::db::FullRepository;
use crate::models::{CountingEvent, Frame, SharedAreaSnapshot, StreamId, Timestamp, TrackId};
use crate::tracking::{CentroidTracker, Tracker};
use crate::zones::ZoneMembershipDetector;

/// Events kept for retry while the repository is down. Oldest are dropped
/// beyond this.
pub const MAX_PENDING_EVENTS: usize = 10_000;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StreamError {
    #[error("Stream {stream_id}: frame at {received} is older than the last frame at {last}")]
    OutOfOrderFrame {
        stream_id: StreamId,
        last: Timestamp,
        received: Timestamp,
    },

    #[error("Frame for stream {received} sent to stream {expected}")]
    WrongStream {
        expected: StreamId,
        received: StreamId,
    },
}

/// Outcome of one processed frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    pub stream_id: StreamId,
    pub timestamp: Timestamp,
    pub area_version: u64,
    pub active_tracks: Vec<TrackId>,
    pub events: Vec<CountingEvent>,
    /// Events written to the repository during this frame, retries included
    pub persisted: usize,
    /// Events still waiting for the repository
    pub pending: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub stream_id: StreamId,
    pub frames_processed: u64,
    pub frames_rejected: u64,
    pub events_emitted: u64,
    pub events_persisted: u64,
    pub persist_failures: u64,
    pub events_dropped: u64,
    /// Events the repository refused permanently; they stay counted in the store
    pub events_rejected: u64,
    pub pending: usize,
}

impl StreamStats {
    pub fn new(stream_id: StreamId) -> Self {
        Self {
            stream_id,
            frames_processed: 0,
            frames_rejected: 0,
            events_emitted: 0,
            events_persisted: 0,
            persist_failures: 0,
            events_dropped: 0,
            events_rejected: 0,
            pending: 0,
        }
    }
}

pub struct CameraStream<T: Tracker = CentroidTracker> {
    stream_id: StreamId,
    tracker: T,
    zones: ZoneMembershipDetector,
    store: Arc<AggregationStore>,
    repository: Arc<dyn FullRepository>,
    area_updates: watch::Receiver<SharedAreaSnapshot>,
    areas: SharedAreaSnapshot,
    last_timestamp: Option<Timestamp>,
    pending: VecDeque<CountingEvent>,
    stats: StreamStats,
}

impl CameraStream<CentroidTracker> {
    pub fn new(
        stream_id: StreamId,
        config: &AppConfig,
        store: Arc<AggregationStore>,
        repository: Arc<dyn FullRepository>,
        area_updates: watch::Receiver<SharedAreaSnapshot>,
    ) -> Self {
        Self::with_tracker(
            stream_id,
            CentroidTracker::new(config.tracker.clone()),
            ZoneMembershipDetector::new(config.zones.clone()),
            store,
            repository,
            area_updates,
        )
    }
}

impl<T: Tracker> CameraStream<T> {
    pub fn with_tracker(
        stream_id: StreamId,
        tracker: T,
        zones: ZoneMembershipDetector,
        store: Arc<AggregationStore>,
        repository: Arc<dyn FullRepository>,
        area_updates: watch::Receiver<SharedAreaSnapshot>,
    ) -> Self {
        let areas = Arc::clone(&area_updates.borrow());
        Self {
            stream_id,
            tracker,
            zones,
            store,
            repository,
            area_updates,
            areas,
            last_timestamp: None,
            pending: VecDeque::new(),
            stats: StreamStats::new(stream_id),
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    pub fn pending_events(&self) -> usize {
        self.pending.len()
    }

    /// Run one frame through tracking, zone evaluation, aggregation and
    /// persistence.
    ///
    /// Frames must arrive in non-decreasing timestamp order; an older frame
    /// is rejected and leaves every piece of state untouched. Persistence
    /// failures never fail the frame: the events are already counted and
    /// stay queued for [`CameraStream::flush_pending`].
    pub async fn process_frame(&mut self, frame: &Frame) -> Result<FrameReport, StreamError> {
        if let Err(e) = self.check_frame(frame) {
            warn!("{}", e);
            self.stats.frames_rejected += 1;
            return Err(e);
        }
        self.last_timestamp = Some(frame.timestamp);
        self.adopt_latest_areas();

        let tracks = self.tracker.update(&frame.detections, frame.timestamp);
        let events = self
            .zones
            .evaluate(&tracks, &self.areas.areas, frame.timestamp);

        for event in &events {
            self.store.record(event);
        }
        self.stats.events_emitted += events.len() as u64;
        self.enqueue(&events);
        let persisted = self.flush_pending().await;

        let active_tracks: Vec<TrackId> = tracks.iter().map(|t| t.id).collect();
        self.store
            .publish_active_tracks(self.stream_id, active_tracks.clone());
        self.stats.frames_processed += 1;

        Ok(FrameReport {
            stream_id: self.stream_id,
            timestamp: frame.timestamp,
            area_version: self.areas.version,
            active_tracks,
            events,
            persisted,
            pending: self.pending.len(),
        })
    }

    /// Retry queued events in emission order, stopping at the first
    /// retryable failure. Events the repository rejects for good are
    /// dropped from the queue so they cannot hold back later ones.
    /// Returns how many were written.
    pub async fn flush_pending(&mut self) -> usize {
        let mut written = 0;
        while let Some(event) = self.pending.front() {
            match self.repository.insert_event(event).await {
                Ok(_) => {
                    self.pending.pop_front();
                    written += 1;
                }
                Err(e) if e.is_retryable() => {
                    error!(
                        "Stream {}: failed to persist {} event for track {} in '{}': {}",
                        self.stream_id, event.event_type, event.track_id, event.area_name, e
                    );
                    self.stats.persist_failures += 1;
                    break;
                }
                Err(e) => {
                    error!(
                        "Stream {}: repository rejected {} event for track {} in '{}', discarding it: {}",
                        self.stream_id, event.event_type, event.track_id, event.area_name, e
                    );
                    self.pending.pop_front();
                    self.stats.persist_failures += 1;
                    self.stats.events_rejected += 1;
                }
            }
        }
        self.stats.events_persisted += written as u64;
        self.stats.pending = self.pending.len();
        written
    }

    fn check_frame(&self, frame: &Frame) -> Result<(), StreamError> {
        if frame.stream_id != self.stream_id {
            return Err(StreamError::WrongStream {
                expected: self.stream_id,
                received: frame.stream_id,
            });
        }
        match self.last_timestamp {
            Some(last) if frame.timestamp < last => Err(StreamError::OutOfOrderFrame {
                stream_id: self.stream_id,
                last,
                received: frame.timestamp,
            }),
            _ => Ok(()),
        }
    }

    /// Switch to the most recently published area snapshot. Only called
    /// between frames.
    fn adopt_latest_areas(&mut self) {
        let latest = Arc::clone(&self.area_updates.borrow_and_update());
        if latest.version != self.areas.version {
            info!(
                "Stream {}: adopting area snapshot v{} ({} areas)",
                self.stream_id,
                latest.version,
                latest.areas.len()
            );
            self.areas = latest;
        }
    }

    fn enqueue(&mut self, events: &[CountingEvent]) {
        self.pending.extend(events.iter().cloned());
        let overflow = self.pending.len().saturating_sub(MAX_PENDING_EVENTS);
        if overflow > 0 {
            warn!(
                "Stream {}: dropping {} unpersisted event(s), retry queue is full",
                self.stream_id, overflow
            );
            self.pending.drain(..overflow);
            self.stats.events_dropped += overflow as u64;
        }
    }
}

/// Drive `stream` from `frames` on a tokio task until every sender is
/// dropped. Returns the final statistics.
pub fn spawn_stream_worker<T>(
    mut stream: CameraStream<T>,
    mut frames: mpsc::Receiver<Frame>,
) -> JoinHandle<StreamStats>
where
    T: Tracker + Send + 'static,
{
    tokio::spawn(async move {
        let stream_id = stream.stream_id();
        info!("Stream {}: worker started", stream_id);
        while let Some(frame) = frames.recv().await {
            // Rejected frames are logged and counted by process_frame.
            if let Ok(report) = stream.process_frame(&frame).await {
                if !report.events.is_empty() {
                    debug!(
                        "Stream {}: {} event(s) at {}",
                        stream_id,
                        report.events.len(),
                        report.timestamp
                    );
                }
            }
        }

        if stream.pending_events() > 0 {
            stream.flush_pending().await;
        }
        stream.store.remove_stream(stream_id);
        info!(
            "Stream {}: worker stopped after {} frame(s)",
            stream_id, stream.stats.frames_processed
        );
        stream.stats
    })
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod stream_tests;
