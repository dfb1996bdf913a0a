#![allow(dead_code)]

use chrono::{Duration, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Mutex;

use zonecount::models::{AreaConfig, BoundingBox, Detection, Frame, Point, StreamId, Timestamp};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with environment variables temporarily modified.
///
/// Restores the previous values on unwind and serializes access to the
/// process-global environment across parallel tests.
///
/// `changes` is a list of `(key, value)` pairs:
/// - `Some(v)` sets the variable to `v`
/// - `None` removes the variable
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let _guard = ScopedEnv::new(changes);
    f()
}

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect::<Vec<_>>();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}

// ==================== Synthetic feeds ====================

pub fn t0() -> Timestamp {
    Utc.with_ymd_and_hms(2025, 5, 12, 9, 0, 0).unwrap()
}

/// Timestamp of frame `n` at 25 fps.
pub fn frame_time(n: i64) -> Timestamp {
    t0() + Duration::milliseconds(40 * n)
}

pub fn ring(points: &[[f64; 2]]) -> Vec<Point> {
    points.iter().map(|p| Point::from(*p)).collect()
}

/// The 10x10 square anchored at the origin.
pub fn square_area(name: &str) -> AreaConfig {
    AreaConfig::new(
        name,
        ring(&[[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]]),
        t0(),
    )
}

/// A 2x2 box centred on `(x, y)`.
pub fn detection_at(x: f64, y: f64, ts: Timestamp) -> Detection {
    Detection::new(BoundingBox::new(x - 1.0, y - 1.0, x + 1.0, y + 1.0), 0.9, ts)
}

pub fn frame(stream: u32, n: i64, centroids: &[(f64, f64)]) -> Frame {
    let ts = frame_time(n);
    Frame::new(
        StreamId(stream),
        ts,
        centroids
            .iter()
            .map(|(x, y)| detection_at(*x, *y, ts))
            .collect(),
    )
}
