//! In-memory repository for tests, replays and local development.

use async_trait::async_trait;
use log::debug;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::db::repository::{
    AreaRepository, ErrorContext, EventCounts, EventRepository, FullRepository, RepositoryError,
    RepositoryResult,
};
use crate::models::{AreaConfig, CountingEvent, EventFilter, EventKey, EventType};

#[derive(Debug)]
struct LocalData {
    events: Vec<CountingEvent>,
    keys: HashSet<EventKey>,
    areas: BTreeMap<String, AreaConfig>,
    healthy: bool,
}

impl Default for LocalData {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            keys: HashSet::new(),
            areas: BTreeMap::new(),
            healthy: true,
        }
    }
}

/// Thread-safe in-memory store. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

impl LocalRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the repository with areas, skipping validation.
    pub fn with_areas(areas: impl IntoIterator<Item = AreaConfig>) -> Self {
        let repo = Self::new();
        {
            let mut data = repo.data.write();
            for area in areas {
                data.areas.insert(area.area_name.clone(), area);
            }
        }
        repo
    }

    /// Simulate an outage: while unhealthy every operation fails with a
    /// retryable connection error.
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().healthy = healthy;
    }

    pub fn event_count(&self) -> usize {
        self.data.read().events.len()
    }

    pub fn area_count(&self) -> usize {
        self.data.read().areas.len()
    }

    pub fn clear(&self) {
        let mut data = self.data.write();
        data.events.clear();
        data.keys.clear();
        data.areas.clear();
    }

    fn ensure_available(&self, operation: &str) -> RepositoryResult<()> {
        if self.data.read().healthy {
            Ok(())
        } else {
            Err(RepositoryError::connection("Local repository is unavailable")
                .with_context(ErrorContext::new(operation).retryable()))
        }
    }
}

#[async_trait]
impl EventRepository for LocalRepository {
    async fn insert_event(&self, event: &CountingEvent) -> RepositoryResult<bool> {
        self.ensure_available("insert_event")?;
        let mut data = self.data.write();
        if !data.keys.insert(event.key()) {
            debug!(
                "Duplicate {} event for track {} in '{}' ignored",
                event.event_type, event.track_id, event.area_name
            );
            return Ok(false);
        }
        data.events.push(event.clone());
        Ok(true)
    }

    async fn list_events(&self, filter: &EventFilter) -> RepositoryResult<Vec<CountingEvent>> {
        self.ensure_available("list_events")?;
        let data = self.data.read();
        let mut matching: Vec<&CountingEvent> =
            data.events.iter().filter(|e| filter.matches(e)).collect();
        // Stable sort keeps insertion order among equal timestamps.
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(matching
            .into_iter()
            .skip(filter.skip)
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn count_events(&self, filter: &EventFilter) -> RepositoryResult<EventCounts> {
        self.ensure_available("count_events")?;
        let data = self.data.read();
        Ok(data
            .events
            .iter()
            .filter(|e| filter.matches(e))
            .fold(EventCounts::default(), |mut counts, e| {
                match e.event_type {
                    EventType::Entry => counts.entries += 1,
                    EventType::Exit => counts.exits += 1,
                }
                counts
            }))
    }
}

#[async_trait]
impl AreaRepository for LocalRepository {
    async fn list_areas(&self) -> RepositoryResult<Vec<AreaConfig>> {
        self.ensure_available("list_areas")?;
        Ok(self.data.read().areas.values().cloned().collect())
    }

    async fn get_area(&self, area_name: &str) -> RepositoryResult<AreaConfig> {
        self.ensure_available("get_area")?;
        self.data.read().areas.get(area_name).cloned().ok_or_else(|| {
            RepositoryError::not_found(format!("Area '{}' does not exist", area_name))
                .with_context(
                    ErrorContext::new("get_area")
                        .with_entity("area")
                        .with_entity_id(area_name),
                )
        })
    }

    async fn upsert_area(&self, mut area: AreaConfig) -> RepositoryResult<AreaConfig> {
        self.ensure_available("upsert_area")?;
        area.validate()?;
        let mut data = self.data.write();
        if let Some(existing) = data.areas.get(&area.area_name) {
            area.created_at = existing.created_at;
        }
        data.areas.insert(area.area_name.clone(), area.clone());
        Ok(area)
    }

    async fn delete_area(&self, area_name: &str) -> RepositoryResult<()> {
        self.ensure_available("delete_area")?;
        match self.data.write().areas.remove(area_name) {
            Some(_) => Ok(()),
            None => Err(
                RepositoryError::not_found(format!("Area '{}' does not exist", area_name))
                    .with_context(
                        ErrorContext::new("delete_area")
                            .with_entity("area")
                            .with_entity_id(area_name),
                    ),
            ),
        }
    }
}

#[async_trait]
impl FullRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(self.data.read().healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Point, TrackId};
    use chrono::{Duration, Utc};

    fn square(name: &str) -> AreaConfig {
        let coords = vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        AreaConfig::new(name, coords, Utc::now())
    }

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let repo = LocalRepository::new();
        let event = CountingEvent::entry(TrackId(1), "door", Utc::now());
        assert!(repo.insert_event(&event).await.unwrap());
        assert!(!repo.insert_event(&event).await.unwrap());
        assert_eq!(repo.event_count(), 1);
    }

    #[tokio::test]
    async fn test_list_events_newest_first() {
        let repo = LocalRepository::new();
        let now = Utc::now();
        for i in 0..3 {
            let event = CountingEvent::entry(TrackId(i), "door", now + Duration::seconds(i as i64));
            repo.insert_event(&event).await.unwrap();
        }
        let events = repo.list_events(&EventFilter::new()).await.unwrap();
        let ids: Vec<u64> = events.iter().map(|e| e.track_id.value()).collect();
        assert_eq!(ids, vec![2, 1, 0]);
    }

    #[tokio::test]
    async fn test_unhealthy_repository_fails_retryably() {
        let repo = LocalRepository::new();
        repo.set_healthy(false);
        let event = CountingEvent::entry(TrackId(1), "door", Utc::now());
        let err = repo.insert_event(&event).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(!repo.health_check().await.unwrap());

        repo.set_healthy(true);
        assert!(repo.insert_event(&event).await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_preserves_created_at() {
        let repo = LocalRepository::new();
        let first = repo.upsert_area(square("door")).await.unwrap();

        let mut update = square("door");
        update.created_at = first.created_at + Duration::hours(1);
        update.updated_at = first.created_at + Duration::hours(1);
        let stored = repo.upsert_area(update).await.unwrap();

        assert_eq!(stored.created_at, first.created_at);
        assert_eq!(stored.updated_at, first.created_at + Duration::hours(1));
    }

    #[tokio::test]
    async fn test_upsert_rejects_degenerate_area() {
        let repo = LocalRepository::new();
        let mut area = square("line");
        area.coordinates.truncate(2);
        let err = repo.upsert_area(area).await.unwrap_err();
        assert!(matches!(err, RepositoryError::ValidationError { .. }));
        assert_eq!(repo.area_count(), 0);
    }
}
