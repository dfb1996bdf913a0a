//! Replays a recorded detection feed through the counting pipeline.
//!
//! # Usage
//!
//! ```bash
//! zonecount-replay frames.jsonl areas.json
//! ```
//!
//! `frames.jsonl` holds one JSON [`Frame`] per line, in order per stream.
//! `areas.json` is an optional array of area definitions. The final live
//! snapshot, the hourly buckets and a 24 hour forecast are printed to stdout
//! as JSON.
//!
//! # Environment Variables
//!
//! - `ZONECOUNT_CONFIG`: path to a TOML configuration file
//! - `RUST_LOG`: Log level (default: info)

use std::collections::HashMap;
use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader};

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use zonecount::db::{AreaRepository, RepositoryFactory};
use zonecount::models::{AreaConfig, Frame, Granularity, StreamId, TimeWindow, Timestamp};
use zonecount::{AppConfig, CountingService};

const FORECAST_PERIODS: usize = 24;

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_max_level(
            env::var("RUST_LOG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Level::INFO),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let Some(frames_path) = args.get(1) else {
        bail!("usage: zonecount-replay <frames.jsonl> [areas.json]");
    };

    let config = AppConfig::load().context("Failed to load configuration")?;
    let repository = RepositoryFactory::from_settings(&config.repository)?;
    if let Some(areas_path) = args.get(2) {
        let file = File::open(areas_path)
            .with_context(|| format!("Failed to open area file {}", areas_path))?;
        let areas: Vec<AreaConfig> =
            serde_json::from_reader(BufReader::new(file)).context("Invalid area file")?;
        for area in areas {
            repository.upsert_area(area).await?;
        }
    }

    let service = CountingService::new(config, repository)?;
    service.reload_areas().await?;
    info!(
        "Replaying {} with {} area(s)",
        frames_path,
        service.area_snapshot().areas.len()
    );

    let file = File::open(frames_path)
        .with_context(|| format!("Failed to open frame file {}", frames_path))?;
    let mut senders: HashMap<StreamId, mpsc::Sender<Frame>> = HashMap::new();
    let mut first: Option<Timestamp> = None;
    let mut last: Option<Timestamp> = None;

    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: Frame = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Skipping line {}: {}", line_no + 1, e);
                continue;
            }
        };
        first = Some(first.map_or(frame.timestamp, |t| t.min(frame.timestamp)));
        last = last.max(Some(frame.timestamp));

        let sender = senders
            .entry(frame.stream_id)
            .or_insert_with(|| service.add_stream(frame.stream_id));
        sender
            .send(frame)
            .await
            .context("Stream worker stopped unexpectedly")?;
    }
    drop(senders);
    let streams = service.join_streams().await;

    let (Some(first), Some(now)) = (first, last) else {
        bail!("No frames found in {}", frames_path);
    };

    let hourly = service.bucketed(
        None,
        Granularity::HOUR,
        TimeWindow::new(first, Granularity::HOUR.next(Granularity::HOUR.align(now))),
    )?;
    let forecast = match service.forecast(None, Granularity::HOUR, FORECAST_PERIODS, now) {
        Ok(forecast) => serde_json::to_value(forecast)?,
        Err(e) => {
            warn!("No forecast: {}", e);
            serde_json::json!({ "error": e.to_string() })
        }
    };

    let report = serde_json::json!({
        "streams": streams,
        "live": service.live_snapshot(None, now),
        "hourly": hourly,
        "forecast": forecast,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
