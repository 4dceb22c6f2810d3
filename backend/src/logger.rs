use std::sync::Once;

use tracing::Span;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

static LOGGER_INIT: Once = Once::new();

/// Correlation id for one feed connection.
#[derive(Clone, Debug)]
pub struct TraceId(String);

impl TraceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self(Uuid::new_v4().hyphenated().to_string())
    }
}

/// Installs the global subscriber. Later calls are no-ops.
pub fn init_tracing(json: bool) {
    LOGGER_INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let base = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_file(true)
            .with_writer(std::io::stderr)
            .with_span_events(fmt::format::FmtSpan::CLOSE);

        if json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(base.json())
                .init();
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(base.pretty())
                .init();
        }
    });
}

/// Root span for a feed connection.
pub fn feed_span(trace_id: &TraceId, channel: &str) -> Span {
    tracing::info_span!(
        "feed",
        trace_id = %trace_id.as_str(),
        channel = %channel
    )
}

/// Records the subscribe request id on the current span.
pub fn annotate_request(request_id: u64) {
    Span::current().record("request_id", request_id);
}
