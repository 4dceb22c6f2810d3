//! Periodic trend reporter.
//!
//! Wakes every `poll_every` on a monotonic timer but only emits once
//! `report_every` has passed since the previous emission. Each emission
//! snapshots the window, fits a trend when enough points are present, and
//! writes one line to the [`ReportSink`].

use std::fmt;
use std::time::Duration;

use engine::{Direction, PricePoint, WindowStore, compute_trend};
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, info, instrument};

use crate::shutdown::Shutdown;
use crate::time::now_ms;

#[derive(Clone, Debug)]
pub struct ReportConfig {
    pub instrument: String,
    /// Window size at which the reporter switches from collecting to trending.
    pub min_points: usize,
    pub epsilon: f64,
    pub poll_every: Duration,
    pub report_every: Duration,
}

/// One report cycle's output.
#[derive(Clone, Debug, PartialEq)]
pub enum Report {
    Collecting {
        instrument: String,
        size: usize,
        min_points: usize,
    },
    Trending {
        instrument: String,
        size: usize,
        current_price: f64,
        direction: Direction,
        slope: f64,
        extrapolated: f64,
    },
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::Collecting {
                instrument,
                size,
                min_points,
            } => write!(
                f,
                "[{instrument}] collecting data... window={size} pts (need {min_points})"
            ),
            Report::Trending {
                instrument,
                size,
                current_price,
                direction,
                slope,
                extrapolated,
            } => write!(
                f,
                "[{instrument}] window={size} pts | price={current_price:.2} | trend={direction} | slope={slope:.6}/s | next_1s={extrapolated:.2}"
            ),
        }
    }
}

/// Builds the report for one snapshot.
///
/// `now_ms` is wall-clock time; the extrapolation point is one second past
/// the elapsed time from the snapshot's first tick to `now_ms`.
pub fn build_report(cfg: &ReportConfig, snapshot: &[PricePoint], now_ms: i64) -> Report {
    let size = snapshot.len();

    let (Some(first), Some(last)) = (snapshot.first(), snapshot.last()) else {
        return Report::Collecting {
            instrument: cfg.instrument.clone(),
            size,
            min_points: cfg.min_points,
        };
    };

    if size < cfg.min_points {
        return Report::Collecting {
            instrument: cfg.instrument.clone(),
            size,
            min_points: cfg.min_points,
        };
    }

    let trend = compute_trend(snapshot);
    let elapsed_secs = (now_ms as f64 - first.timestamp as f64) / 1000.0;

    Report::Trending {
        instrument: cfg.instrument.clone(),
        size,
        current_price: last.price,
        direction: Direction::classify(trend.slope, cfg.epsilon),
        slope: trend.slope,
        extrapolated: trend.price_at(elapsed_secs + 1.0),
    }
}

/// Destination for formatted report lines.
pub trait ReportSink: Send {
    fn emit(&mut self, line: &str);
}

/// Writes each report line to stdout.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdoutSink;

impl ReportSink for StdoutSink {
    fn emit(&mut self, line: &str) {
        println!("{line}");
    }
}

/// Collects lines in memory.
impl ReportSink for Vec<String> {
    fn emit(&mut self, line: &str) {
        self.push(line.to_string());
    }
}

/// Emission throttle over a monotonic clock.
#[derive(Debug)]
pub struct EmitGate {
    every: Duration,
    last: Instant,
}

impl EmitGate {
    pub fn new(every: Duration, start: Instant) -> Self {
        Self { every, last: start }
    }

    /// True at most once per `every`; resets the reference point when it fires.
    pub fn ready(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last) >= self.every {
            self.last = now;
            true
        } else {
            false
        }
    }
}

pub struct Reporter<S> {
    store: WindowStore,
    cfg: ReportConfig,
    sink: S,
    wall_clock: fn() -> i64,
}

impl<S: ReportSink> Reporter<S> {
    pub fn new(store: WindowStore, cfg: ReportConfig, sink: S) -> Self {
        Self {
            store,
            cfg,
            sink,
            wall_clock: now_ms,
        }
    }

    /// Replaces the wall-clock source used for extrapolation.
    pub fn with_wall_clock(mut self, clock: fn() -> i64) -> Self {
        self.wall_clock = clock;
        self
    }

    /// Runs until shutdown and hands the sink back.
    #[instrument(skip_all, fields(instrument = %self.cfg.instrument))]
    pub async fn run(mut self, mut shutdown: Shutdown) -> S {
        let mut ticker = interval(self.cfg.poll_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut gate = EmitGate::new(self.cfg.report_every, Instant::now());

        info!(
            poll_ms = self.cfg.poll_every.as_millis() as u64,
            report_ms = self.cfg.report_every.as_millis() as u64,
            "reporter started"
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.wait() => break,

                _ = ticker.tick() => {
                    if gate.ready(Instant::now()) {
                        self.emit_once();
                    }
                }
            }
        }

        info!("reporter stopped");
        self.sink
    }

    /// Runs one snapshot → trend → format → emit cycle.
    pub fn emit_once(&mut self) -> Report {
        let snapshot = self.store.snapshot();
        let report = build_report(&self.cfg, &snapshot, (self.wall_clock)());

        match &report {
            Report::Trending {
                size,
                current_price,
                direction,
                slope,
                extrapolated,
                ..
            } => debug!(
                size,
                current_price,
                %direction,
                slope,
                extrapolated,
                "trend report"
            ),
            Report::Collecting { size, .. } => debug!(size, "collecting report"),
        }

        self.sink.emit(&report.to_string());
        report
    }
}
