use log::debug;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use super::{
    AggregationConfig, AggregationError, AreaOccupancy, CountSummary, LiveSnapshot, TimeBucket,
};
use crate::models::{
    CountingEvent, EventFilter, Granularity, StreamId, TimeWindow, Timestamp, TrackId,
};

#[derive(Debug, Default)]
struct AreaAggregate {
    /// Base buckets keyed by aligned start.
    buckets: BTreeMap<Timestamp, TimeBucket>,
    /// Running accumulator, independent of bucket eviction.
    occupancy: i64,
    last_event: Option<Timestamp>,
}

/// Thread-safe event aggregation shared by every stream worker.
///
/// Writers lock only the area they touch, so workers counting different
/// areas never contend. Readers take each area's read lock in turn and see
/// the most recently committed state of that area.
pub struct AggregationStore {
    config: AggregationConfig,
    granularity: Granularity,
    areas: RwLock<HashMap<String, Arc<RwLock<AreaAggregate>>>>,
    recent: Mutex<VecDeque<CountingEvent>>,
    active_tracks: RwLock<BTreeMap<StreamId, Vec<TrackId>>>,
}

impl AggregationStore {
    pub fn new(config: AggregationConfig) -> Result<Self, AggregationError> {
        let granularity = config.granularity()?;
        Ok(Self {
            config,
            granularity,
            areas: RwLock::new(HashMap::new()),
            recent: Mutex::new(VecDeque::new()),
            active_tracks: RwLock::new(BTreeMap::new()),
        })
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    pub fn base_granularity(&self) -> Granularity {
        self.granularity
    }

    fn area(&self, area_name: &str) -> Arc<RwLock<AreaAggregate>> {
        if let Some(area) = self.areas.read().get(area_name) {
            return Arc::clone(area);
        }
        let mut areas = self.areas.write();
        Arc::clone(areas.entry(area_name.to_string()).or_default())
    }

    /// Areas matching the filter, sorted by name.
    fn selected(&self, area_filter: Option<&str>) -> Vec<(String, Arc<RwLock<AreaAggregate>>)> {
        let areas = self.areas.read();
        let mut selected: Vec<_> = areas
            .iter()
            .filter(|(name, _)| area_filter.map_or(true, |f| f == name.as_str()))
            .map(|(name, area)| (name.clone(), Arc::clone(area)))
            .collect();
        selected.sort_by(|a, b| a.0.cmp(&b.0));
        selected
    }

    /// Add one event to its bucket and to the area's occupancy. Returns the
    /// area occupancy after the update.
    pub fn record(&self, event: &CountingEvent) -> i64 {
        let start = self.granularity.align(event.timestamp);
        let area = self.area(&event.area_name);
        let occupancy = {
            let mut area = area.write();
            area.buckets
                .entry(start)
                .or_insert_with(|| TimeBucket::empty(start))
                .apply(event.event_type);

            let next = area.occupancy + event.event_type.delta();
            area.occupancy = if self.config.clamp_occupancy_at_zero {
                next.max(0)
            } else {
                next
            };
            area.last_event = area.last_event.max(Some(event.timestamp));
            area.occupancy
        };

        let capacity = self.config.recent_event_capacity;
        if capacity > 0 {
            let mut recent = self.recent.lock();
            while recent.len() >= capacity {
                recent.pop_front();
            }
            recent.push_back(event.clone());
        }
        occupancy
    }

    pub fn occupancy(&self, area_name: &str) -> Option<i64> {
        self.areas.read().get(area_name).map(|a| a.read().occupancy)
    }

    pub fn area_names(&self) -> Vec<String> {
        self.selected(None).into_iter().map(|(name, _)| name).collect()
    }

    /// Replace the live track set reported by one stream.
    pub fn publish_active_tracks(&self, stream_id: StreamId, mut track_ids: Vec<TrackId>) {
        track_ids.sort();
        self.active_tracks.write().insert(stream_id, track_ids);
    }

    pub fn remove_stream(&self, stream_id: StreamId) {
        self.active_tracks.write().remove(&stream_id);
    }

    pub fn live_snapshot(&self, area_filter: Option<&str>, now: Timestamp) -> LiveSnapshot {
        let window = TimeWindow::trailing(now, self.config.live_window());

        let mut areas = Vec::new();
        for (area_name, area) in self.selected(area_filter) {
            let area = area.read();
            let (recent_entries, recent_exits) = area
                .buckets
                .range(window.start..window.end)
                .fold((0, 0), |(en, ex), (_, b)| {
                    (en + b.entry_count, ex + b.exit_count)
                });
            areas.push(AreaOccupancy {
                area_name,
                occupancy: area.occupancy,
                recent_entries,
                recent_exits,
                last_event: area.last_event,
            });
        }

        let active_track_ids = self.active_tracks.read().clone();

        LiveSnapshot {
            generated_at: now,
            window_secs: self.config.live_window().num_seconds(),
            occupancy: areas.iter().map(|a| a.occupancy).sum(),
            active_tracks: active_track_ids.values().map(Vec::len).sum(),
            active_track_ids,
            recent_entries: areas.iter().map(|a| a.recent_entries).sum(),
            recent_exits: areas.iter().map(|a| a.recent_exits).sum(),
            last_updated: areas.iter().filter_map(|a| a.last_event).max(),
            areas,
        }
    }

    /// Contiguous buckets of `granularity` covering `window`, summed over the
    /// selected areas. Intervals without events come back as zero buckets.
    ///
    /// The first bucket starts at `window.start` aligned down; the last is the
    /// one containing the instant just before `window.end`.
    pub fn bucketed(
        &self,
        area_filter: Option<&str>,
        granularity: Granularity,
        window: TimeWindow,
    ) -> Result<Vec<TimeBucket>, AggregationError> {
        if !granularity.is_multiple_of(self.granularity) {
            return Err(AggregationError::IncompatibleGranularity {
                requested: granularity,
                base: self.granularity,
            });
        }
        if window.end < window.start {
            return Err(AggregationError::InvertedWindow {
                start: window.start,
                end: window.end,
            });
        }
        if window.is_empty() {
            return Ok(Vec::new());
        }

        let first = granularity.align(window.start);
        let mut out: BTreeMap<Timestamp, TimeBucket> = BTreeMap::new();
        let mut start = first;
        while start < window.end {
            out.insert(start, TimeBucket::empty(start));
            start = granularity.next(start);
        }

        for (_, area) in self.selected(area_filter) {
            let area = area.read();
            for (base_start, bucket) in area.buckets.range(first..window.end) {
                if let Some(target) = out.get_mut(&granularity.align(*base_start)) {
                    target.absorb(bucket);
                }
            }
        }

        Ok(out.into_values().collect())
    }

    /// Entry/exit totals over `[start, end)`, widened to base bucket edges.
    pub fn summary(
        &self,
        area_filter: Option<&str>,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<CountSummary, AggregationError> {
        if end < start {
            return Err(AggregationError::InvertedWindow { start, end });
        }
        let mut total = TimeBucket::empty(start);
        for (_, area) in self.selected(area_filter) {
            let area = area.read();
            for (_, bucket) in area.buckets.range(self.granularity.align(start)..end) {
                total.absorb(bucket);
            }
        }
        Ok(CountSummary {
            area_name: area_filter.map(str::to_string),
            start,
            end,
            entries: total.entry_count,
            exits: total.exit_count,
            net: total.net_count,
        })
    }

    /// Buffered events matching `filter`, newest first.
    pub fn recent_events(&self, filter: &EventFilter) -> Vec<CountingEvent> {
        let recent = self.recent.lock();
        recent
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .skip(filter.skip)
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Drop buckets that ended before the retention horizon. Occupancy
    /// accumulators are left untouched. Returns the number of buckets removed.
    pub fn evict_expired(&self, now: Timestamp) -> usize {
        let Some(horizon) = now.checked_sub_signed(self.config.retention()) else {
            return 0;
        };
        let cutoff = self.granularity.align(horizon);

        let mut removed = 0;
        for (area_name, area) in self.selected(None) {
            let mut area = area.write();
            let kept = area.buckets.split_off(&cutoff);
            let dropped = area.buckets.len();
            area.buckets = kept;
            if dropped > 0 {
                debug!(
                    "Evicted {} bucket(s) of '{}' older than {}",
                    dropped, area_name, cutoff
                );
            }
            removed += dropped;
        }
        removed
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod store_tests;
