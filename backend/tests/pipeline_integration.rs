//! End-to-end tests of the counting pipeline through CountingService.

mod support;

use chrono::Duration;
use std::sync::Arc;
use zonecount::db::{AreaRepository, EventRepository, FullRepository, LocalRepository};
use zonecount::models::{
    CountingEvent, EventFilter, EventType, Granularity, StreamId, TimeWindow, TrackId,
};
use zonecount::services::{CountingService, ForecastError, ServiceError};
use zonecount::AppConfig;

use support::{frame, frame_time, square_area, t0};

async fn service_with(config: AppConfig, areas: Vec<&str>) -> (CountingService, LocalRepository) {
    let repo = LocalRepository::new();
    for name in areas {
        repo.upsert_area(square_area(name)).await.unwrap();
    }
    let shared: Arc<dyn FullRepository> = Arc::new(repo.clone());
    let service = CountingService::new(config, shared).unwrap();
    service.reload_areas().await.unwrap();
    (service, repo)
}

#[tokio::test]
async fn test_no_areas_tracks_without_events() {
    let (service, repo) = service_with(AppConfig::default(), vec![]).await;
    let mut stream = service.stream(StreamId(1));

    for n in 0..5 {
        let report = stream
            .process_frame(&frame(1, n, &[(5.0, 5.0), (300.0, 300.0)]))
            .await
            .unwrap();
        assert_eq!(report.active_tracks.len(), 2);
        assert!(report.events.is_empty());
    }
    assert_eq!(repo.event_count(), 0);
    assert_eq!(service.live_snapshot(None, frame_time(5)).active_tracks, 2);
}

#[tokio::test]
async fn test_leaving_square_emits_one_exit() {
    let (service, repo) = service_with(AppConfig::default(), vec!["door"]).await;
    let tx = service.add_stream(StreamId(1));

    for n in 0..3 {
        tx.send(frame(1, n, &[(5.0, 5.0)])).await.unwrap();
    }
    for n in 3..8 {
        tx.send(frame(1, n, &[(20.0, 20.0)])).await.unwrap();
    }
    drop(tx);
    let stats = service.join_streams().await;
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].frames_processed, 8);

    let exits = repo
        .list_events(&EventFilter::new().event_type(EventType::Exit))
        .await
        .unwrap();
    assert_eq!(exits.len(), 1);
    assert_eq!(exits[0].timestamp, frame_time(5));
    assert!(!exits[0].synthetic);
    assert_eq!(service.store().occupancy("door"), Some(0));
}

#[tokio::test]
async fn test_lost_track_gets_synthetic_exit() {
    let mut config = AppConfig::default();
    config.tracker.max_missed_frames = 2;
    let (service, repo) = service_with(config, vec!["door"]).await;
    let mut stream = service.stream(StreamId(1));

    for n in 0..3 {
        stream
            .process_frame(&frame(1, n, &[(5.0, 5.0)]))
            .await
            .unwrap();
    }
    assert_eq!(service.store().occupancy("door"), Some(1));

    let mut synthetic = Vec::new();
    for n in 3..7 {
        let report = stream.process_frame(&frame(1, n, &[])).await.unwrap();
        synthetic.extend(report.events);
    }
    assert_eq!(synthetic.len(), 1);
    assert!(synthetic[0].synthetic);
    assert_eq!(synthetic[0].event_type, EventType::Exit);
    assert_eq!(service.store().occupancy("door"), Some(0));
    assert_eq!(repo.event_count(), 2);
}

#[tokio::test]
async fn test_parallel_streams_keep_area_balanced() {
    let (service, _repo) = service_with(AppConfig::default(), vec!["door"]).await;

    let mut senders = Vec::new();
    for stream in 1..=4u32 {
        senders.push((stream, service.add_stream(StreamId(stream))));
    }
    for (stream, tx) in &senders {
        for n in 0..4 {
            tx.send(frame(*stream, n, &[(5.0, 5.0)])).await.unwrap();
        }
    }
    assert!(service.live_snapshot(Some("door"), frame_time(4)).occupancy <= 4);

    for (stream, tx) in &senders {
        for n in 4..8 {
            tx.send(frame(*stream, n, &[(50.0, 50.0)])).await.unwrap();
        }
    }
    drop(senders);
    let stats = service.join_streams().await;
    assert_eq!(stats.len(), 4);

    let summary = service
        .summary(Some("door"), t0(), t0() + Duration::minutes(1))
        .unwrap();
    assert_eq!(summary.entries, 4);
    assert_eq!(summary.exits, 4);
    assert_eq!(service.store().occupancy("door"), Some(0));
    assert_eq!(service.live_snapshot(None, frame_time(8)).active_tracks, 0);
}

#[tokio::test]
async fn test_reload_areas_only_publishes_changes() {
    let (service, repo) = service_with(AppConfig::default(), vec!["door"]).await;
    let v1 = service.area_snapshot().version;
    assert!(!service.reload_areas().await.unwrap());

    repo.upsert_area(square_area("till")).await.unwrap();
    assert!(service.reload_areas().await.unwrap());
    let snapshot = service.area_snapshot();
    assert_eq!(snapshot.version, v1 + 1);
    assert!(snapshot.get("till").is_some());

    repo.set_healthy(false);
    assert!(service.reload_areas().await.is_err());
    assert_eq!(service.area_snapshot().version, v1 + 1);
}

#[tokio::test]
async fn test_outage_keeps_live_view_and_flushes_later() {
    let (service, repo) = service_with(AppConfig::default(), vec!["door"]).await;
    let mut stream = service.stream(StreamId(1));
    repo.set_healthy(false);

    for n in 0..3 {
        stream
            .process_frame(&frame(1, n, &[(5.0, 5.0)]))
            .await
            .unwrap();
    }
    let live = service.live_snapshot(Some("door"), frame_time(3));
    assert_eq!(live.occupancy, 1);
    assert_eq!(live.recent_entries, 1);
    assert_eq!(service.recent_events(&EventFilter::new()).len(), 1);
    assert_eq!(repo.event_count(), 0);

    repo.set_healthy(true);
    stream
        .process_frame(&frame(1, 3, &[(5.0, 5.0)]))
        .await
        .unwrap();
    assert_eq!(stream.pending_events(), 0);
    let stored = service.stored_events(&EventFilter::new()).await.unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn test_forecast_needs_history() {
    let (service, _repo) = service_with(AppConfig::default(), vec!["door"]).await;
    let result = service.forecast(Some("door"), Granularity::HOUR, 5, t0());
    assert!(matches!(
        result,
        Err(ServiceError::Forecast(
            ForecastError::InsufficientHistory { available: 0, .. }
        ))
    ));
}

#[tokio::test]
async fn test_forecast_from_recorded_history() {
    let (service, _repo) = service_with(AppConfig::default(), vec!["door"]).await;
    let store = service.store();
    let mut id = 0u64;
    for hour in 0..30i64 {
        let visitors = 2 + (hour % 5);
        for v in 0..visitors {
            let ts = t0() + Duration::hours(hour) + Duration::minutes(v);
            store.record(&CountingEvent::entry(TrackId(id), "door", ts));
            id += 1;
        }
        if hour % 2 == 1 {
            let ts = t0() + Duration::hours(hour) + Duration::minutes(30);
            store.record(&CountingEvent::exit(TrackId(id), "door", ts));
        }
    }

    let now = t0() + Duration::hours(30) + Duration::minutes(5);
    let forecast = service
        .forecast(Some("door"), Granularity::HOUR, 6, now)
        .unwrap();
    assert_eq!(forecast.history_len, 30);
    assert_eq!(forecast.points.len(), 6);
    assert_eq!(forecast.points[0].timestamp, t0() + Duration::hours(30));
    for pair in forecast.points.windows(2) {
        assert!(pair[1].upper - pair[1].lower >= pair[0].upper - pair[0].lower);
    }

    let hourly = service
        .bucketed(
            Some("door"),
            Granularity::HOUR,
            TimeWindow::new(t0(), t0() + Duration::hours(30)),
        )
        .unwrap();
    assert_eq!(hourly.len(), 30);
    assert_eq!(hourly[0].entry_count, 2);

    assert!(matches!(
        service.forecast(Some("door"), Granularity::from_secs(90).unwrap(), 1, now),
        Err(ServiceError::Aggregation(_))
    ));
}

#[tokio::test]
async fn test_maintenance_picks_up_new_areas() {
    let (service, repo) = service_with(AppConfig::default(), vec![]).await;
    let service = Arc::new(service);
    assert_eq!(service.area_snapshot().version, 0);

    let handle = service.spawn_maintenance(std::time::Duration::from_millis(10));
    repo.upsert_area(square_area("lobby")).await.unwrap();

    let mut version = 0;
    for _ in 0..100 {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        version = service.area_snapshot().version;
        if version > 0 {
            break;
        }
    }
    handle.abort();
    assert_eq!(version, 1);
    assert!(service.area_snapshot().get("lobby").is_some());
}
