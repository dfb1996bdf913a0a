//! Tests for the in-memory LocalRepository.
//!
//! Cover concurrent access, idempotent inserts under retries, filtering and
//! pagination, and the area configuration store.

mod support;

use chrono::Duration;
use std::sync::Arc;
use zonecount::db::{AreaRepository, EventRepository, FullRepository, LocalRepository};
use zonecount::models::{CountingEvent, EventFilter, EventType, TrackId};

use support::{square_area, t0};

fn event(id: u64, area: &str, kind: EventType, secs: i64) -> CountingEvent {
    let ts = t0() + Duration::seconds(secs);
    match kind {
        EventType::Entry => CountingEvent::entry(TrackId(id), area, ts),
        EventType::Exit => CountingEvent::exit(TrackId(id), area, ts),
    }
}

// =========================================================
// Concurrent Access Tests
// =========================================================

#[tokio::test]
async fn test_concurrent_inserts_from_many_streams() {
    let repo = Arc::new(LocalRepository::new());
    let mut handles = vec![];
    for stream in 0..8u64 {
        let repo = Arc::clone(&repo);
        handles.push(tokio::spawn(async move {
            for i in 0..50 {
                let e = event(stream * 100 + i, "door", EventType::Entry, i as i64);
                repo.insert_event(&e).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(repo.event_count(), 400);
}

#[tokio::test]
async fn test_concurrent_retries_store_once() {
    let repo = Arc::new(LocalRepository::new());
    let e = event(1, "door", EventType::Entry, 0);
    let mut handles = vec![];
    for _ in 0..10 {
        let repo = Arc::clone(&repo);
        let e = e.clone();
        handles.push(tokio::spawn(async move { repo.insert_event(&e).await.unwrap() }));
    }
    let mut newly_stored = 0;
    for handle in handles {
        if handle.await.unwrap() {
            newly_stored += 1;
        }
    }
    assert_eq!(newly_stored, 1);
    assert_eq!(repo.event_count(), 1);
}

// =========================================================
// Event Queries
// =========================================================

#[tokio::test]
async fn test_batch_insert_counts_new_events_only() {
    let repo = LocalRepository::new();
    let batch = vec![
        event(1, "door", EventType::Entry, 0),
        event(1, "door", EventType::Entry, 0),
        event(1, "door", EventType::Exit, 5),
    ];
    assert_eq!(repo.insert_events(&batch).await.unwrap(), 2);
}

#[tokio::test]
async fn test_list_filters_and_pagination() {
    let repo = LocalRepository::new();
    for i in 0..10u64 {
        let area = if i % 2 == 0 { "door" } else { "till" };
        let kind = if i % 3 == 0 {
            EventType::Exit
        } else {
            EventType::Entry
        };
        repo.insert_event(&event(i, area, kind, i as i64))
            .await
            .unwrap();
    }

    let door = repo
        .list_events(&EventFilter::new().area("door"))
        .await
        .unwrap();
    assert_eq!(door.len(), 5);
    assert!(door.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));

    let exits = repo
        .list_events(&EventFilter::new().event_type(EventType::Exit))
        .await
        .unwrap();
    let ids: Vec<u64> = exits.iter().map(|e| e.track_id.value()).collect();
    assert_eq!(ids, vec![9, 6, 3, 0]);

    let page = repo
        .list_events(&EventFilter::new().page(2, 3))
        .await
        .unwrap();
    let ids: Vec<u64> = page.iter().map(|e| e.track_id.value()).collect();
    assert_eq!(ids, vec![7, 6, 5]);

    let window = repo
        .list_events(
            &EventFilter::new().between(t0() + Duration::seconds(2), t0() + Duration::seconds(4)),
        )
        .await
        .unwrap();
    assert_eq!(window.len(), 3);

    let one_track = repo
        .list_events(&EventFilter::new().track(TrackId(4)))
        .await
        .unwrap();
    assert_eq!(one_track.len(), 1);
}

#[tokio::test]
async fn test_count_events_by_type() {
    let repo = LocalRepository::new();
    repo.insert_event(&event(1, "door", EventType::Entry, 0))
        .await
        .unwrap();
    repo.insert_event(&event(2, "door", EventType::Entry, 1))
        .await
        .unwrap();
    repo.insert_event(&event(1, "door", EventType::Exit, 2))
        .await
        .unwrap();

    let counts = repo
        .count_events(&EventFilter::new().area("door").page(0, 1))
        .await
        .unwrap();
    assert_eq!(counts.entries, 2);
    assert_eq!(counts.exits, 1);
    assert_eq!(counts.net(), 1);
}

// =========================================================
// Area Store
// =========================================================

#[tokio::test]
async fn test_area_crud() {
    let repo = LocalRepository::new();
    repo.upsert_area(square_area("till")).await.unwrap();
    repo.upsert_area(square_area("door").with_description("front door"))
        .await
        .unwrap();

    let names: Vec<String> = repo
        .list_areas()
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.area_name)
        .collect();
    assert_eq!(names, vec!["door", "till"]);

    let door = repo.get_area("door").await.unwrap();
    assert_eq!(door.description.as_deref(), Some("front door"));

    repo.delete_area("door").await.unwrap();
    assert!(repo.get_area("door").await.is_err());
    assert!(repo.delete_area("door").await.is_err());
    assert_eq!(repo.area_count(), 1);
}

#[tokio::test]
async fn test_with_areas_and_clear() {
    let repo = LocalRepository::with_areas(vec![square_area("a"), square_area("b")]);
    repo.insert_event(&event(1, "a", EventType::Entry, 0))
        .await
        .unwrap();
    assert_eq!(repo.area_count(), 2);

    repo.clear();
    assert_eq!(repo.area_count(), 0);
    assert_eq!(repo.event_count(), 0);
}

// =========================================================
// Health
// =========================================================

#[tokio::test]
async fn test_unhealthy_repository_rejects_everything() {
    let repo = LocalRepository::new();
    repo.set_healthy(false);

    assert!(!repo.health_check().await.unwrap());
    assert!(repo.list_areas().await.is_err());
    assert!(repo.list_events(&EventFilter::new()).await.is_err());
    let err = repo
        .insert_event(&event(1, "door", EventType::Entry, 0))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.context().operation.as_deref(), Some("insert_event"));

    repo.set_healthy(true);
    assert!(repo.health_check().await.unwrap());
}

#[tokio::test]
async fn test_clones_share_state() {
    let repo = LocalRepository::new();
    let clone = repo.clone();
    clone
        .insert_event(&event(1, "door", EventType::Entry, 0))
        .await
        .unwrap();
    assert_eq!(repo.event_count(), 1);
}
