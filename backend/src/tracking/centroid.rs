use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use super::{Track, Tracker};
use crate::models::{distance, Detection, Point, Timestamp, TrackId};

/// Tuning for [`CentroidTracker`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Largest centroid displacement (pixels) accepted as the same object
    #[serde(default = "default_max_match_distance")]
    pub max_match_distance: f64,
    /// A track is retired once it misses more than this many frames in a row
    #[serde(default = "default_max_missed_frames")]
    pub max_missed_frames: u32,
    /// Detections scoring below this are ignored
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Number of recent centroids kept per track
    #[serde(default = "default_trail_length")]
    pub trail_length: usize,
}

fn default_max_match_distance() -> f64 {
    100.0
}

fn default_max_missed_frames() -> u32 {
    30
}

fn default_min_confidence() -> f64 {
    0.5
}

fn default_trail_length() -> usize {
    30
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_match_distance: default_max_match_distance(),
            max_missed_frames: default_max_missed_frames(),
            min_confidence: default_min_confidence(),
            trail_length: default_trail_length(),
        }
    }
}

/// Greedy nearest-centroid tracker.
///
/// Candidate (track, detection) pairs are taken closest first; a pair is
/// accepted only if neither side is already matched and the distance is
/// within `max_match_distance`. This is not an optimal assignment: two
/// objects crossing paths can swap identities.
///
/// Identities come from a counter that only moves forward, so an ID is never
/// handed out twice, not even after [`CentroidTracker::reset`].
#[derive(Debug, Clone)]
pub struct CentroidTracker {
    config: TrackerConfig,
    tracks: BTreeMap<TrackId, Track>,
    next_id: TrackId,
    frame_count: u64,
    retired: Vec<TrackId>,
}

impl CentroidTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: BTreeMap::new(),
            next_id: TrackId(1),
            frame_count: 0,
            retired: Vec::new(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    /// Tracks retired by the most recent update.
    pub fn last_retired(&self) -> &[TrackId] {
        &self.retired
    }

    /// Drop every live track. The ID counter is kept.
    pub fn reset(&mut self) {
        self.retired = self.tracks.keys().copied().collect();
        self.tracks.clear();
    }

    fn allocate_id(&mut self) -> TrackId {
        let id = self.next_id;
        self.next_id = id.successor();
        id
    }

    /// Detections that can take part in matching, with their centroids.
    fn usable_detections<'a>(&self, detections: &'a [Detection]) -> Vec<(&'a Detection, Point)> {
        detections
            .iter()
            .filter(|d| {
                if !d.is_well_formed() {
                    warn!("Dropping malformed detection: {:?}", d.bbox);
                    return false;
                }
                d.confidence >= self.config.min_confidence
            })
            .map(|d| (d, d.centroid()))
            .collect()
    }

    /// Greedy assignment: `(track index, detection index)` pairs, closest first.
    fn greedy_match(&self, track_ids: &[TrackId], centroids: &[Point]) -> Vec<(usize, usize)> {
        let mut pairs: Vec<(f64, usize, usize)> = Vec::new();
        for (ti, id) in track_ids.iter().enumerate() {
            let origin = self.tracks[id].centroid;
            for (di, c) in centroids.iter().enumerate() {
                let d = distance(origin, *c);
                if d <= self.config.max_match_distance {
                    pairs.push((d, ti, di));
                }
            }
        }
        // ties resolved by older track first, then detection order
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        let mut used_tracks = vec![false; track_ids.len()];
        let mut used_detections = vec![false; centroids.len()];
        let mut matches = Vec::new();
        for (d, ti, di) in pairs {
            if used_tracks[ti] || used_detections[di] {
                continue;
            }
            trace!("Matched track {} at distance {:.2}", track_ids[ti], d);
            used_tracks[ti] = true;
            used_detections[di] = true;
            matches.push((ti, di));
        }
        matches
    }
}

impl Default for CentroidTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl Tracker for CentroidTracker {
    fn update(&mut self, detections: &[Detection], now: Timestamp) -> Vec<Track> {
        self.frame_count += 1;
        self.retired.clear();

        let candidates = self.usable_detections(detections);
        let centroids: Vec<Point> = candidates.iter().map(|(_, c)| *c).collect();
        let track_ids: Vec<TrackId> = self.tracks.keys().copied().collect();

        let matches = self.greedy_match(&track_ids, &centroids);
        let mut track_matched = vec![false; track_ids.len()];
        let mut detection_matched = vec![false; candidates.len()];

        for (ti, di) in matches {
            track_matched[ti] = true;
            detection_matched[di] = true;

            let (det, centroid) = candidates[di];
            let trail_length = self.config.trail_length;
            if let Some(track) = self.tracks.get_mut(&track_ids[ti]) {
                track.centroid = centroid;
                track.bbox = det.bbox;
                track.confidence = det.confidence;
                track.last_seen = now;
                track.missed_frames = 0;
                track.hits += 1;
                push_trail(&mut track.trail, centroid, trail_length);
            }
        }

        for (ti, id) in track_ids.iter().enumerate() {
            if track_matched[ti] {
                continue;
            }
            let expired = match self.tracks.get_mut(id) {
                Some(track) => {
                    track.missed_frames += 1;
                    track.missed_frames > self.config.max_missed_frames
                }
                None => false,
            };
            if expired {
                self.tracks.remove(id);
                self.retired.push(*id);
                debug!("Track {} retired after {} missed frames", id, self.config.max_missed_frames + 1);
            }
        }

        for (di, (det, centroid)) in candidates.iter().enumerate() {
            if detection_matched[di] {
                continue;
            }
            let id = self.allocate_id();
            let mut trail = VecDeque::with_capacity(self.config.trail_length);
            push_trail(&mut trail, *centroid, self.config.trail_length);
            self.tracks.insert(
                id,
                Track {
                    id,
                    centroid: *centroid,
                    bbox: det.bbox,
                    confidence: det.confidence,
                    first_seen: now,
                    last_seen: now,
                    missed_frames: 0,
                    hits: 1,
                    trail,
                },
            );
            debug!("Track {} created at ({:.1}, {:.1})", id, centroid.x, centroid.y);
        }

        self.active_tracks()
    }

    fn active_tracks(&self) -> Vec<Track> {
        self.tracks.values().cloned().collect()
    }

    fn active_track_ids(&self) -> Vec<TrackId> {
        self.tracks.keys().copied().collect()
    }
}

fn push_trail(trail: &mut VecDeque<Point>, p: Point, capacity: usize) {
    if capacity == 0 {
        return;
    }
    while trail.len() >= capacity {
        trail.pop_front();
    }
    trail.push_back(p);
}
