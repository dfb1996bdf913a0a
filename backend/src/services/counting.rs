//! Top-level orchestration: shared store, repository, area distribution and
//! one worker per camera stream.

use chrono::Utc;
use futures::future::join_all;
use log::{info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::forecasting::{Forecast, ForecastError, Forecaster};
use super::stream::{spawn_stream_worker, CameraStream, StreamStats};
use crate::aggregation::{
    AggregationError, AggregationStore, CountSummary, LiveSnapshot, TimeBucket,
};
use crate::config::{AppConfig, ConfigError};
use crate::db::{FullRepository, RepositoryError, RepositoryResult};
use crate::models::{
    AreaSnapshot, CountingEvent, EventFilter, Frame, Granularity, SharedAreaSnapshot, StreamId,
    TimeWindow, Timestamp,
};

/// Frames buffered per stream before `send` waits.
pub const FRAME_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error(transparent)]
    Forecast(#[from] ForecastError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct CountingService {
    config: AppConfig,
    store: Arc<AggregationStore>,
    repository: Arc<dyn FullRepository>,
    forecaster: Forecaster,
    areas_tx: watch::Sender<SharedAreaSnapshot>,
    workers: Mutex<Vec<(StreamId, JoinHandle<StreamStats>)>>,
}

impl CountingService {
    pub fn new(
        config: AppConfig,
        repository: Arc<dyn FullRepository>,
    ) -> Result<Self, ServiceError> {
        config.validate()?;
        let store = Arc::new(AggregationStore::new(config.aggregation.clone())?);
        let forecaster = Forecaster::new(config.forecast.clone());
        let (areas_tx, _) = watch::channel(AreaSnapshot::empty().into_shared());
        Ok(Self {
            config,
            store,
            repository,
            forecaster,
            areas_tx,
            workers: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<AggregationStore> {
        &self.store
    }

    pub fn repository(&self) -> &Arc<dyn FullRepository> {
        &self.repository
    }

    pub fn area_snapshot(&self) -> SharedAreaSnapshot {
        Arc::clone(&self.areas_tx.borrow())
    }

    /// Re-read the area repository and publish a new snapshot if anything
    /// changed. Workers pick it up before their next frame. Returns whether
    /// a new snapshot was published.
    pub async fn reload_areas(&self) -> RepositoryResult<bool> {
        let areas = self.repository.list_areas().await?;
        let current = self.area_snapshot();
        if current.areas == areas {
            return Ok(false);
        }
        let version = current.version + 1;
        info!("Publishing area snapshot v{} ({} areas)", version, areas.len());
        self.areas_tx
            .send_replace(AreaSnapshot::new(version, areas).into_shared());
        Ok(true)
    }

    /// Start a worker for `stream_id` and return the sender that feeds it.
    /// Dropping every clone of the sender stops the worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn add_stream(&self, stream_id: StreamId) -> mpsc::Sender<Frame> {
        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let stream = CameraStream::new(
            stream_id,
            &self.config,
            Arc::clone(&self.store),
            Arc::clone(&self.repository),
            self.areas_tx.subscribe(),
        );
        let handle = spawn_stream_worker(stream, rx);
        self.workers.lock().push((stream_id, handle));
        tx
    }

    /// A stream that is driven by the caller instead of a worker task.
    pub fn stream(&self, stream_id: StreamId) -> CameraStream {
        CameraStream::new(
            stream_id,
            &self.config,
            Arc::clone(&self.store),
            Arc::clone(&self.repository),
            self.areas_tx.subscribe(),
        )
    }

    /// Wait for every worker to finish. Workers finish once their senders
    /// are dropped.
    pub async fn join_streams(&self) -> Vec<StreamStats> {
        let workers: Vec<_> = std::mem::take(&mut *self.workers.lock());
        let (ids, handles): (Vec<StreamId>, Vec<_>) = workers.into_iter().unzip();
        join_all(handles)
            .await
            .into_iter()
            .zip(ids)
            .filter_map(|(result, stream_id)| match result {
                Ok(stats) => Some(stats),
                Err(e) => {
                    warn!("Stream {} worker did not finish cleanly: {}", stream_id, e);
                    None
                }
            })
            .collect()
    }

    /// Poll the area repository and evict expired buckets every `period`
    /// until the returned handle is aborted.
    pub fn spawn_maintenance(self: &Arc<Self>, period: StdDuration) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(e) = service.reload_areas().await {
                    warn!("Area reload failed: {}", e);
                }
                service.store.evict_expired(Utc::now());
            }
        })
    }

    pub fn live_snapshot(&self, area: Option<&str>, now: Timestamp) -> LiveSnapshot {
        self.store.live_snapshot(area, now)
    }

    pub fn bucketed(
        &self,
        area: Option<&str>,
        granularity: Granularity,
        window: TimeWindow,
    ) -> Result<Vec<TimeBucket>, ServiceError> {
        Ok(self.store.bucketed(area, granularity, window)?)
    }

    pub fn summary(
        &self,
        area: Option<&str>,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<CountSummary, ServiceError> {
        Ok(self.store.summary(area, start, end)?)
    }

    pub fn recent_events(&self, filter: &EventFilter) -> Vec<CountingEvent> {
        self.store.recent_events(filter)
    }

    pub async fn stored_events(
        &self,
        filter: &EventFilter,
    ) -> Result<Vec<CountingEvent>, ServiceError> {
        Ok(self.repository.list_events(filter).await?)
    }

    /// Forecast the next `periods` buckets of `granularity` from the
    /// completed buckets before `now`.
    ///
    /// History starts at the first bucket with any event, so a store that
    /// has only just started does not feed a run of artificial zeros.
    pub fn forecast(
        &self,
        area: Option<&str>,
        granularity: Granularity,
        periods: usize,
        now: Timestamp,
    ) -> Result<Forecast, ServiceError> {
        let end = granularity.align(now);
        let start = i32::try_from(self.config.forecast.history_buckets)
            .ok()
            .and_then(|n| granularity.as_duration().checked_mul(n))
            .and_then(|span| end.checked_sub_signed(span))
            .unwrap_or(end);

        let history: Vec<TimeBucket> = self
            .store
            .bucketed(area, granularity, TimeWindow::new(start, end))?
            .into_iter()
            .skip_while(TimeBucket::is_empty)
            .collect();
        Ok(self.forecaster.forecast(&history, periods)?)
    }
}
