use clap::Parser;
use engine::WindowStore;
use tokio::task::JoinHandle;
use tracing::Instrument;

use marktrend::{
    config::AppConfig,
    error::AppError,
    feed::DeribitWsConnector,
    ingest::{IngestAdapter, IngestExit},
    logger::{TraceId, feed_span, init_tracing},
    metrics::counters::IngestCounters,
    reporter::{Reporter, StdoutSink},
    shutdown::{self, Shutdown},
};

/// Connects, subscribes and feeds the window until shutdown or connector
/// failure. Only a failed subscribe is returned as an error.
fn start_ingest(
    cfg: &AppConfig,
    store: WindowStore,
    counters: IngestCounters,
    shutdown: Shutdown,
) -> JoinHandle<Result<(), AppError>> {
    let url = cfg.ws_url.clone();
    let channel = cfg.channel();
    let span = feed_span(&TraceId::default(), &channel);

    tokio::spawn(
        async move {
            let mut waiter = shutdown.clone();
            let connected = tokio::select! {
                _ = waiter.wait() => return Ok(()),
                res = DeribitWsConnector::connect(&url) => res,
            };

            let mut connector = match connected {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!(error = %e, "feed connection failed; ingest stopped");
                    return Ok(());
                }
            };

            let adapter = IngestAdapter::new(store, channel).with_counters(counters);
            match adapter.run(&mut connector, shutdown).await? {
                IngestExit::Shutdown => {}
                IngestExit::StreamEnded => tracing::warn!("feed stream ended; no reconnection"),
                IngestExit::Failed(e) => tracing::warn!(error = %e, "feed failed; no reconnection"),
            }
            Ok(())
        }
        .instrument(span),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AppConfig::parse();
    init_tracing(cfg.json_logs());
    cfg.validate()?;

    tracing::info!(
        instrument = %cfg.instrument,
        channel = %cfg.channel(),
        window_secs = cfg.window_secs,
        min_points = cfg.min_points,
        "Starting marktrend..."
    );

    let store = WindowStore::new(cfg.window_ms());
    let counters = IngestCounters::default();
    let (trigger, shutdown) = shutdown::channel();

    let reporter = Reporter::new(store.clone(), cfg.report_config(), StdoutSink);
    let reporter_task = tokio::spawn(reporter.run(shutdown.clone()));

    let mut ingest_task = start_ingest(&cfg, store, counters.clone(), shutdown);
    let mut ingest_joined = false;

    let outcome: anyhow::Result<()> = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.map_err(anyhow::Error::from)
        }
        joined = &mut ingest_task => {
            ingest_joined = true;
            match joined {
                Ok(Ok(())) => {
                    // The reporter keeps running on the last window until Ctrl-C.
                    tokio::signal::ctrl_c().await.map_err(anyhow::Error::from)
                }
                Ok(Err(e)) => Err(e.into()),
                Err(e) => Err(e.into()),
            }
        }
    };

    match &outcome {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "fatal error; shutting down"),
    }

    trigger.trigger();
    if !ingest_joined && let Ok(Err(e)) = ingest_task.await {
        tracing::error!(error = %e, "ingest ended with error during shutdown");
    }
    if let Err(e) = reporter_task.await {
        tracing::error!(error = %e, "reporter task failed");
    }

    tracing::info!(counters = ?counters.snapshot(), "marktrend stopped");
    outcome
}
