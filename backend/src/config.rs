use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::error::AppError;
use crate::reporter::ReportConfig;

/// Ticker update interval requested from the venue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TickerInterval {
    #[value(name = "raw")]
    Raw,
    #[value(name = "100ms")]
    Ms100,
    #[value(name = "agg2")]
    Agg2,
}

impl TickerInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            TickerInterval::Raw => "raw",
            TickerInterval::Ms100 => "100ms",
            TickerInterval::Agg2 => "agg2",
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[clap(name = "marktrend", version)]
pub struct AppConfig {
    /// Instrument whose mark price is tracked.
    #[clap(long, env = "INSTRUMENT", default_value = "BTC-PERPETUAL")]
    pub instrument: String,

    /// Ticker channel update interval.
    #[clap(long, env = "SUBSCRIPTION_INTERVAL", value_enum, default_value = "100ms")]
    pub interval: TickerInterval,

    /// Trailing window length in seconds.
    ///
    /// A tick is retained while its timestamp is within this many seconds
    /// of the most recent tick.
    #[clap(long, env = "WINDOW_SECS", default_value_t = 10)]
    pub window_secs: u64,

    /// Minimum window size before a trend is reported.
    #[clap(long, env = "MIN_POINTS", default_value_t = 5)]
    pub min_points: usize,

    /// Minimum time between two reports, in milliseconds.
    #[clap(long, env = "REPORT_INTERVAL_MS", default_value_t = 1000)]
    pub report_interval_ms: u64,

    /// Reporter wake-up resolution, in milliseconds.
    ///
    /// Independent of `report_interval_ms`: the reporter wakes this often
    /// but only emits once the report interval has elapsed.
    #[clap(long, env = "POLL_MS", default_value_t = 100)]
    pub poll_ms: u64,

    /// Slope magnitude (price units per second) under which the trend is FLAT.
    #[clap(long, env = "TREND_EPSILON", default_value_t = engine::trend::DEFAULT_EPSILON)]
    pub epsilon: f64,

    /// Feed WebSocket endpoint.
    #[clap(long, env = "FEED_WS_URL", default_value = "wss://www.deribit.com/ws/api/v2")]
    pub ws_url: String,

    /// Emit logs as JSON (also enabled by APP_ENV=production).
    #[clap(long)]
    pub json_logs: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            instrument: "BTC-PERPETUAL".to_string(),
            interval: TickerInterval::Ms100,
            window_secs: 10,
            min_points: 5,
            report_interval_ms: 1_000,
            poll_ms: 100,
            epsilon: engine::trend::DEFAULT_EPSILON,
            ws_url: "wss://www.deribit.com/ws/api/v2".to_string(),
            json_logs: false,
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.instrument.trim().is_empty() {
            return Err(AppError::Config("instrument must not be empty".into()));
        }
        if self.window_secs == 0 {
            return Err(AppError::Config("window_secs must be > 0".into()));
        }
        if self.poll_ms == 0 {
            return Err(AppError::Config("poll_ms must be > 0".into()));
        }
        if self.report_interval_ms == 0 {
            return Err(AppError::Config("report_interval_ms must be > 0".into()));
        }
        if self.min_points < 2 {
            return Err(AppError::Config(format!(
                "min_points must be >= 2 (got {})",
                self.min_points
            )));
        }
        if self.epsilon.is_nan() || self.epsilon < 0.0 {
            return Err(AppError::Config(format!(
                "epsilon must be a non-negative number (got {})",
                self.epsilon
            )));
        }
        Ok(())
    }

    /// Subscription channel name, e.g. `ticker.BTC-PERPETUAL.100ms`.
    pub fn channel(&self) -> String {
        format!("ticker.{}.{}", self.instrument, self.interval.as_str())
    }

    pub fn window_ms(&self) -> i64 {
        i64::try_from(self.window_secs.saturating_mul(1_000)).unwrap_or(i64::MAX)
    }

    pub fn poll_every(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn report_every(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    pub fn report_config(&self) -> ReportConfig {
        ReportConfig {
            instrument: self.instrument.clone(),
            min_points: self.min_points,
            epsilon: self.epsilon,
            poll_every: self.poll_every(),
            report_every: self.report_every(),
        }
    }

    pub fn json_logs(&self) -> bool {
        self.json_logs || std::env::var("APP_ENV").unwrap_or_default() == "production"
    }
}
