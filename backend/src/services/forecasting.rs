//! Short-horizon forecasts of per-bucket net counts.
//!
//! The model is Holt's linear exponential smoothing: a level and a trend are
//! updated bucket by bucket, and the one-step-ahead errors give the residual
//! standard deviation. The band around each predicted point widens with the
//! horizon because the smoothing weights compound:
//!
//! ```text
//! half_width(h) = z * sigma * sqrt(1 + sum_{j=1}^{h-1} (alpha * (1 + j * beta))^2)
//! ```
//!
//! [`Forecaster::forecast`] is a pure function of its arguments.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::aggregation::TimeBucket;
use crate::models::Timestamp;

pub const MODEL_TYPE: &str = "holt_linear";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ForecastError {
    #[error("Forecast horizon must be at least one period")]
    InvalidHorizon,

    #[error("Forecast horizon of {requested} periods exceeds the maximum of {max}")]
    HorizonTooLong { requested: usize, max: usize },

    #[error("Insufficient history: need {required} buckets, have {available}")]
    InsufficientHistory { required: usize, available: usize },

    #[error("History buckets are not evenly spaced")]
    IrregularHistory,

    #[error("Forecast timestamps fall outside the representable time range")]
    TimestampOutOfRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Level smoothing factor, in (0, 1]
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Trend smoothing factor, in (0, 1]
    #[serde(default = "default_beta")]
    pub beta: f64,
    /// Fewest buckets accepted as history
    #[serde(default = "default_min_history")]
    pub min_history: usize,
    /// Longest horizon served
    #[serde(default = "default_max_periods")]
    pub max_periods: usize,
    /// Normal quantile of the confidence band (1.96 ~ 95%)
    #[serde(default = "default_confidence_z")]
    pub confidence_z: f64,
    /// Trailing buckets pulled from the store as history
    #[serde(default = "default_history_buckets")]
    pub history_buckets: usize,
}

fn default_alpha() -> f64 {
    0.3
}

fn default_beta() -> f64 {
    0.05
}

fn default_min_history() -> usize {
    24
}

fn default_max_periods() -> usize {
    168
}

fn default_confidence_z() -> f64 {
    1.96
}

fn default_history_buckets() -> usize {
    336
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            beta: default_beta(),
            min_history: default_min_history(),
            max_periods: default_max_periods(),
            confidence_z: default_confidence_z(),
            history_buckets: default_history_buckets(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub timestamp: Timestamp,
    pub predicted: f64,
    pub lower: f64,
    pub upper: f64,
}

impl ForecastPoint {
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub model_type: String,
    pub step_secs: i64,
    pub history_len: usize,
    pub level: f64,
    pub trend: f64,
    pub residual_std: f64,
    pub points: Vec<ForecastPoint>,
}

#[derive(Debug, Clone, Default)]
pub struct Forecaster {
    config: ForecastConfig,
}

impl Forecaster {
    pub fn new(config: ForecastConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Predict the next `periods` buckets after the last one in `history`.
    ///
    /// `history` must be ordered, evenly spaced and hold at least
    /// `min_history` buckets (never fewer than two, which the trend needs).
    pub fn forecast(
        &self,
        history: &[TimeBucket],
        periods: usize,
    ) -> Result<Forecast, ForecastError> {
        if periods == 0 {
            return Err(ForecastError::InvalidHorizon);
        }
        if periods > self.config.max_periods {
            return Err(ForecastError::HorizonTooLong {
                requested: periods,
                max: self.config.max_periods,
            });
        }
        let required = self.config.min_history.max(2);
        if history.len() < required {
            return Err(ForecastError::InsufficientHistory {
                required,
                available: history.len(),
            });
        }
        let step = regular_step(history)?;

        let series: Vec<f64> = history.iter().map(|b| b.net_count as f64).collect();
        let fit = fit_holt(&series, self.config.alpha, self.config.beta);

        let last = history[history.len() - 1].start;
        let points = (1..=periods)
            .map(|h| {
                let timestamp = i32::try_from(h)
                    .ok()
                    .and_then(|n| step.checked_mul(n))
                    .and_then(|offset| last.checked_add_signed(offset))
                    .ok_or(ForecastError::TimestampOutOfRange)?;
                let predicted = fit.level + h as f64 * fit.trend;
                let half = self.config.confidence_z * fit.residual_std * self.spread(h);
                Ok(ForecastPoint {
                    timestamp,
                    predicted,
                    lower: predicted - half,
                    upper: predicted + half,
                })
            })
            .collect::<Result<Vec<_>, ForecastError>>()?;

        Ok(Forecast {
            model_type: MODEL_TYPE.to_string(),
            step_secs: step.num_seconds(),
            history_len: history.len(),
            level: fit.level,
            trend: fit.trend,
            residual_std: fit.residual_std,
            points,
        })
    }

    /// Standard-error multiplier for horizon `h` (1 at h = 1).
    fn spread(&self, h: usize) -> f64 {
        let (alpha, beta) = (self.config.alpha, self.config.beta);
        let sum: f64 = (1..h)
            .map(|j| {
                let c = alpha * (1.0 + j as f64 * beta);
                c * c
            })
            .sum();
        (1.0 + sum).sqrt()
    }
}

struct HoltFit {
    level: f64,
    trend: f64,
    residual_std: f64,
}

fn fit_holt(series: &[f64], alpha: f64, beta: f64) -> HoltFit {
    let mut level = series[0];
    let mut trend = series[1] - series[0];
    let mut sq_err = 0.0;
    let mut n_err = 0usize;

    for (t, &y) in series.iter().enumerate().skip(1) {
        let predicted = level + trend;
        // The first step is fitted exactly by the initial trend.
        if t >= 2 {
            sq_err += (y - predicted).powi(2);
            n_err += 1;
        }
        let prev_level = level;
        level = alpha * y + (1.0 - alpha) * predicted;
        trend = beta * (level - prev_level) + (1.0 - beta) * trend;
    }

    let residual_std = if n_err > 0 {
        (sq_err / n_err as f64).sqrt()
    } else {
        0.0
    };
    HoltFit {
        level,
        trend,
        residual_std,
    }
}

fn regular_step(history: &[TimeBucket]) -> Result<Duration, ForecastError> {
    let step = history[1].start - history[0].start;
    if step <= Duration::zero() {
        return Err(ForecastError::IrregularHistory);
    }
    if history
        .windows(2)
        .any(|pair| pair[1].start - pair[0].start != step)
    {
        return Err(ForecastError::IrregularHistory);
    }
    Ok(step)
}

#[cfg(test)]
#[path = "forecasting_tests.rs"]
mod forecasting_tests;
