use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::RepositoryResult;
use crate::models::{CountingEvent, EventFilter};

/// Entry/exit totals for a filtered set of stored events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    pub entries: u64,
    pub exits: u64,
}

impl EventCounts {
    pub fn net(&self) -> i64 {
        self.entries as i64 - self.exits as i64
    }
}

/// Append-only store of counting events.
///
/// Inserts must be idempotent on [`CountingEvent::key`]: stream workers
/// retry failed inserts without deduplicating, so the same event can
/// arrive more than once.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Store one event. Returns `false` when an event with the same key was
    /// already stored.
    async fn insert_event(&self, event: &CountingEvent) -> RepositoryResult<bool>;

    /// Store a batch in order, stopping at the first failure. Returns how
    /// many were newly stored.
    async fn insert_events(&self, events: &[CountingEvent]) -> RepositoryResult<usize> {
        let mut inserted = 0;
        for event in events {
            if self.insert_event(event).await? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Events matching `filter`, newest first, after `skip` and `limit`.
    async fn list_events(&self, filter: &EventFilter) -> RepositoryResult<Vec<CountingEvent>>;

    /// Totals of the events matching `filter`. Pagination is ignored.
    async fn count_events(&self, filter: &EventFilter) -> RepositoryResult<EventCounts>;
}
