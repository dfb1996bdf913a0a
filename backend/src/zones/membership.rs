//! Debounced inside/outside state machine per (track, area) pair.
//!
//! Each pair starts `Outside` the first time it is evaluated. The raw
//! containment of the track centroid has to disagree with the committed
//! state for `debounce_frames` consecutive evaluations before the state
//! flips; every flip emits exactly one event. A track that disappears while
//! committed `Inside` gets a synthetic exit so occupancy stays balanced.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::models::{AreaConfig, CountingEvent, Timestamp, TrackId};
use crate::tracking::Track;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneConfig {
    /// Consecutive agreeing evaluations needed to commit a transition
    #[serde(default = "default_debounce_frames")]
    pub debounce_frames: u32,
    /// Emit an exit when a track is lost while inside an area
    #[serde(default = "default_synthetic_exit")]
    pub synthetic_exit_on_track_loss: bool,
}

fn default_debounce_frames() -> u32 {
    3
}

fn default_synthetic_exit() -> bool {
    true
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            debounce_frames: default_debounce_frames(),
            synthetic_exit_on_track_loss: default_synthetic_exit(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Membership {
    Outside,
    Inside,
}

impl From<bool> for Membership {
    fn from(inside: bool) -> Self {
        if inside {
            Membership::Inside
        } else {
            Membership::Outside
        }
    }
}

/// Committed membership plus the number of consecutive evaluations that
/// contradicted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MembershipState {
    pub committed: Membership,
    pub pending: u32,
}

impl Default for MembershipState {
    fn default() -> Self {
        Self {
            committed: Membership::Outside,
            pending: 0,
        }
    }
}

impl MembershipState {
    /// Feed one raw observation. Returns the new committed state when this
    /// observation completes a transition.
    pub fn observe(&mut self, raw: Membership, debounce_frames: u32) -> Option<Membership> {
        if raw == self.committed {
            self.pending = 0;
            return None;
        }
        self.pending += 1;
        if self.pending >= debounce_frames.max(1) {
            self.committed = raw;
            self.pending = 0;
            Some(raw)
        } else {
            None
        }
    }
}

type PairKey = (TrackId, String);

pub struct ZoneMembershipDetector {
    config: ZoneConfig,
    states: HashMap<PairKey, MembershipState>,
    warned_degenerate: HashSet<String>,
}

impl ZoneMembershipDetector {
    pub fn new(config: ZoneConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
            warned_degenerate: HashSet::new(),
        }
    }

    pub fn config(&self) -> &ZoneConfig {
        &self.config
    }

    pub fn state(&self, track_id: TrackId, area_name: &str) -> Option<MembershipState> {
        self.states.get(&(track_id, area_name.to_string())).copied()
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// Tracks currently committed inside `area_name`, ascending.
    pub fn tracks_inside(&self, area_name: &str) -> Vec<TrackId> {
        let mut ids: Vec<TrackId> = self
            .states
            .iter()
            .filter(|((_, area), s)| area == area_name && s.committed == Membership::Inside)
            .map(|((id, _), _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Evaluate one frame.
    ///
    /// `tracks` is the tracker's live set after this frame's update and
    /// `areas` the configuration snapshot in force for this frame. Returns
    /// the events in emission order: synthetic exits for lost tracks first,
    /// then committed transitions by track id and area order.
    pub fn evaluate(
        &mut self,
        tracks: &[Track],
        areas: &[AreaConfig],
        now: Timestamp,
    ) -> Vec<CountingEvent> {
        let configured: HashSet<&str> = areas.iter().map(|a| a.area_name.as_str()).collect();
        // A name listed twice is evaluated once, using its first definition.
        let mut seen: HashSet<&str> = HashSet::with_capacity(areas.len());
        let usable: Vec<&AreaConfig> = areas
            .iter()
            .filter(|area| {
                let first = seen.insert(area.area_name.as_str());
                if !first {
                    debug!("Ignoring repeated definition of area '{}'", area.area_name);
                }
                first
            })
            .filter(|area| match area.validate() {
                Ok(()) => {
                    self.warned_degenerate.remove(&area.area_name);
                    true
                }
                Err(e) => {
                    if self.warned_degenerate.insert(area.area_name.clone()) {
                        warn!("Skipping area: {}", e);
                    }
                    false
                }
            })
            .collect();
        self.warned_degenerate
            .retain(|name| configured.contains(name.as_str()));

        // Areas dropped from the configuration take their pair states with them.
        self.states.retain(|(id, area), _| {
            let keep = configured.contains(area.as_str());
            if !keep {
                debug!("Dropping state of track {} for removed area '{}'", id, area);
            }
            keep
        });

        let mut events = self.retire_lost_tracks(tracks, now);

        for track in tracks {
            if !track.is_fresh() || !track.has_valid_position() {
                continue;
            }
            for area in &usable {
                let raw = Membership::from(area.contains(track.centroid));
                let state = self
                    .states
                    .entry((track.id, area.area_name.clone()))
                    .or_default();
                match state.observe(raw, self.config.debounce_frames) {
                    Some(Membership::Inside) => {
                        debug!("Track {} entered '{}'", track.id, area.area_name);
                        events.push(CountingEvent::entry(track.id, &area.area_name, now));
                    }
                    Some(Membership::Outside) => {
                        debug!("Track {} exited '{}'", track.id, area.area_name);
                        events.push(CountingEvent::exit(track.id, &area.area_name, now));
                    }
                    None => {}
                }
            }
        }

        events
    }

    /// Remove state of tracks absent from the live set, emitting synthetic
    /// exits for those committed inside.
    fn retire_lost_tracks(&mut self, tracks: &[Track], now: Timestamp) -> Vec<CountingEvent> {
        let live: HashSet<TrackId> = tracks.iter().map(|t| t.id).collect();
        let mut lost: Vec<(PairKey, MembershipState)> = Vec::new();
        self.states.retain(|key, state| {
            if live.contains(&key.0) {
                true
            } else {
                lost.push((key.clone(), *state));
                false
            }
        });
        lost.sort_by(|a, b| a.0.cmp(&b.0));

        lost.into_iter()
            .filter(|(_, state)| {
                self.config.synthetic_exit_on_track_loss && state.committed == Membership::Inside
            })
            .map(|((id, area), _)| {
                debug!("Track {} lost inside '{}', emitting exit", id, area);
                CountingEvent::synthetic_exit(id, area, now)
            })
            .collect()
    }
}

impl Default for ZoneMembershipDetector {
    fn default() -> Self {
        Self::new(ZoneConfig::default())
    }
}

#[cfg(test)]
#[path = "membership_tests.rs"]
mod membership_tests;
