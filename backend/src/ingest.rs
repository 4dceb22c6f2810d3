use std::sync::atomic::{AtomicU64, Ordering};

use engine::{PricePoint, WindowStore};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::error::AppError;
use crate::feed::{FeedConnector, FeedError, FeedEvent, SubscribeRequest};
use crate::logger::annotate_request;
use crate::metrics::counters::IngestCounters;
use crate::shutdown::Shutdown;

/// Monotonically increasing JSON-RPC request ids, starting at 1.
#[derive(Debug)]
pub struct RequestIds(AtomicU64);

impl RequestIds {
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::new()
    }
}

/// Why the ingest loop stopped.
#[derive(Debug)]
pub enum IngestExit {
    Shutdown,
    StreamEnded,
    Failed(FeedError),
}

/// Maps decoded feed events onto the window store.
pub struct IngestAdapter {
    store: WindowStore,
    channel: String,
    request_ids: RequestIds,
    counters: IngestCounters,
}

impl IngestAdapter {
    pub fn new(store: WindowStore, channel: impl Into<String>) -> Self {
        Self {
            store,
            channel: channel.into(),
            request_ids: RequestIds::new(),
            counters: IngestCounters::default(),
        }
    }

    pub fn with_counters(mut self, counters: IngestCounters) -> Self {
        self.counters = counters;
        self
    }

    pub fn counters(&self) -> &IngestCounters {
        &self.counters
    }

    /// Subscribes, then consumes events until shutdown, stream end or a
    /// fatal connector error.
    ///
    /// The connector is closed on every exit path. Only a failed subscribe
    /// is reported as an error; the caller treats it as unrecoverable.
    #[instrument(skip_all, fields(channel = %self.channel, request_id = tracing::field::Empty))]
    pub async fn run<C>(
        &self,
        connector: &mut C,
        mut shutdown: Shutdown,
    ) -> Result<IngestExit, AppError>
    where
        C: FeedConnector + ?Sized,
    {
        let req = SubscribeRequest::new(self.request_ids.next(), self.channel.clone());
        annotate_request(req.id);

        if let Err(e) = connector.subscribe(&req).await {
            error!(error = %e, request_id = req.id, "subscribe request failed");
            connector.close().await;
            return Err(AppError::Subscribe(e));
        }
        info!(request_id = req.id, "subscribe request sent");

        let exit = self.consume(connector, &mut shutdown).await;
        connector.close().await;

        let counters = self.counters.snapshot();
        match &exit {
            IngestExit::Failed(e) => {
                error!(error = %e, ?counters, "ingest stopped on connector failure")
            }
            other => info!(exit = ?other, ?counters, "ingest stopped"),
        }

        Ok(exit)
    }

    async fn consume<C>(&self, connector: &mut C, shutdown: &mut Shutdown) -> IngestExit
    where
        C: FeedConnector + ?Sized,
    {
        loop {
            if shutdown.is_triggered() {
                return IngestExit::Shutdown;
            }

            tokio::select! {
                biased;

                _ = shutdown.wait() => return IngestExit::Shutdown,

                next = connector.next_event() => match next {
                    None => return IngestExit::StreamEnded,
                    Some(Ok(ev)) => {
                        self.handle_event(ev);
                    }
                    Some(Err(e)) if !e.is_fatal() => self.on_malformed(&e),
                    Some(Err(e)) => return IngestExit::Failed(e),
                },
            }
        }
    }

    /// Applies one event. Returns `true` if a point was appended.
    pub fn handle_event(&self, ev: FeedEvent) -> bool {
        match ev {
            FeedEvent::Subscription {
                channel,
                mark_price,
                timestamp,
            } => {
                if channel != self.channel {
                    IngestCounters::inc(&self.counters.ticks_foreign_channel);
                    debug!(%channel, "notification for another channel ignored");
                    return false;
                }

                self.store.append(PricePoint::new(timestamp, mark_price));
                IngestCounters::inc(&self.counters.ticks_accepted);
                true
            }

            FeedEvent::RpcResult { id, result } => {
                IngestCounters::inc(&self.counters.rpc_results);
                info!(id, %result, "rpc result");
                false
            }

            FeedEvent::RpcError { id, error } => {
                IngestCounters::inc(&self.counters.rpc_errors);
                let data = error.data.unwrap_or_default();
                warn!(
                    ?id,
                    code = error.code,
                    message = %error.message,
                    reason = ?data.reason,
                    param = ?data.param,
                    "rpc error"
                );
                false
            }

            FeedEvent::Heartbeat => {
                trace!("heartbeat");
                false
            }

            FeedEvent::Unknown(value) => {
                IngestCounters::inc(&self.counters.malformed);
                warn!(raw = %value, "unrecognized frame");
                false
            }
        }
    }

    fn on_malformed(&self, e: &FeedError) {
        IngestCounters::inc(&self.counters.malformed);
        match e {
            FeedError::Decode { raw, reason } => {
                warn!(%reason, raw = %raw, "failed to decode feed frame")
            }
            other => warn!(error = %other, "failed to decode feed frame"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{RpcErrorBody, RpcErrorData};
    use crate::shutdown;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;

    const CHANNEL: &str = "ticker.BTC-PERPETUAL.100ms";

    fn tick(ts: i64, price: f64) -> FeedEvent {
        FeedEvent::Subscription {
            channel: CHANNEL.into(),
            mark_price: price,
            timestamp: ts,
        }
    }

    /// Replays a fixed script, then reports end of stream.
    #[derive(Default)]
    struct Scripted {
        events: VecDeque<Result<FeedEvent, FeedError>>,
        subscribed: Vec<SubscribeRequest>,
        fail_subscribe: bool,
        closed: usize,
    }

    #[async_trait]
    impl FeedConnector for Scripted {
        async fn subscribe(&mut self, req: &SubscribeRequest) -> Result<(), FeedError> {
            if self.fail_subscribe {
                return Err(FeedError::Send("socket gone".into()));
            }
            self.subscribed.push(req.clone());
            Ok(())
        }

        async fn next_event(&mut self) -> Option<Result<FeedEvent, FeedError>> {
            self.events.pop_front()
        }

        async fn close(&mut self) {
            self.closed += 1;
        }
    }

    #[test]
    fn request_ids_increase() {
        let ids = RequestIds::new();
        assert_eq!(ids.next(), 1);
        assert_eq!(ids.next(), 2);
        assert_eq!(ids.next(), 3);
    }

    #[test]
    fn matching_tick_is_appended() {
        let store = WindowStore::new(10_000);
        let adapter = IngestAdapter::new(store.clone(), CHANNEL);

        assert!(adapter.handle_event(tick(1_000, 64_000.5)));
        assert_eq!(store.snapshot(), vec![PricePoint::new(1_000, 64_000.5)]);
    }

    #[test]
    fn foreign_channel_is_ignored() {
        let store = WindowStore::new(10_000);
        let adapter = IngestAdapter::new(store.clone(), CHANNEL);

        let ev = FeedEvent::Subscription {
            channel: "ticker.ETH-PERPETUAL.100ms".into(),
            mark_price: 3_000.0,
            timestamp: 1,
        };
        assert!(!adapter.handle_event(ev));
        assert_eq!(store.size(), 0);
        assert_eq!(adapter.counters().snapshot().ticks_foreign_channel, 1);
    }

    #[test]
    fn control_frames_never_touch_the_window() {
        let store = WindowStore::new(10_000);
        let adapter = IngestAdapter::new(store.clone(), CHANNEL);

        adapter.handle_event(FeedEvent::RpcResult {
            id: 1,
            result: json!([CHANNEL]),
        });
        adapter.handle_event(FeedEvent::RpcError {
            id: Some(2),
            error: RpcErrorBody {
                code: -32602,
                message: "Invalid params".into(),
                data: Some(RpcErrorData {
                    reason: Some("bad".into()),
                    param: Some("channels".into()),
                }),
            },
        });
        adapter.handle_event(FeedEvent::Heartbeat);
        adapter.handle_event(FeedEvent::Unknown(json!({"foo": 1})));

        assert_eq!(store.size(), 0);
        let c = adapter.counters().snapshot();
        assert_eq!(c.rpc_results, 1);
        assert_eq!(c.rpc_errors, 1);
        assert_eq!(c.malformed, 1);
    }

    #[tokio::test]
    async fn run_subscribes_once_and_survives_malformed_frames() {
        let store = WindowStore::new(10_000);
        let adapter = IngestAdapter::new(store.clone(), CHANNEL);
        let (_trigger, shutdown) = shutdown::channel();

        let mut conn = Scripted {
            events: VecDeque::from(vec![
                Ok(FeedEvent::RpcResult {
                    id: 1,
                    result: json!([CHANNEL]),
                }),
                Ok(tick(0, 100.0)),
                Err(FeedError::decode("{garbage", "expected value")),
                Ok(tick(1_000, 101.0)),
                Err(FeedError::decode("[]", "not an object")),
                Ok(tick(2_000, 102.0)),
            ]),
            ..Default::default()
        };

        let exit = adapter.run(&mut conn, shutdown).await.unwrap();

        assert!(matches!(exit, IngestExit::StreamEnded));
        assert_eq!(conn.subscribed, vec![SubscribeRequest::new(1, CHANNEL)]);
        assert_eq!(conn.closed, 1);
        assert_eq!(
            store.snapshot(),
            vec![
                PricePoint::new(0, 100.0),
                PricePoint::new(1_000, 101.0),
                PricePoint::new(2_000, 102.0),
            ]
        );

        let c = adapter.counters().snapshot();
        assert_eq!(c.ticks_accepted, 3);
        assert_eq!(c.malformed, 2);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn malformed_frame_is_logged_with_raw_payload() {
        let adapter = IngestAdapter::new(WindowStore::new(10_000), CHANNEL);
        let (_trigger, shutdown) = shutdown::channel();

        let mut conn = Scripted {
            events: VecDeque::from(vec![Err(FeedError::decode("{oops", "expected value"))]),
            ..Default::default()
        };

        adapter.run(&mut conn, shutdown).await.unwrap();

        assert!(logs_contain("failed to decode feed frame"));
        assert!(logs_contain("{oops"));
    }

    #[tokio::test]
    async fn fatal_error_ends_run_and_closes() {
        let store = WindowStore::new(10_000);
        let adapter = IngestAdapter::new(store.clone(), CHANNEL);
        let (_trigger, shutdown) = shutdown::channel();

        let mut conn = Scripted {
            events: VecDeque::from(vec![
                Ok(tick(0, 1.0)),
                Err(FeedError::Transport("connection reset".into())),
                Ok(tick(1_000, 2.0)),
            ]),
            ..Default::default()
        };

        let exit = adapter.run(&mut conn, shutdown).await.unwrap();

        assert!(matches!(exit, IngestExit::Failed(FeedError::Transport(_))));
        assert_eq!(conn.closed, 1);
        assert_eq!(store.size(), 1, "events after a fatal error are not consumed");
    }

    #[tokio::test]
    async fn subscribe_failure_is_an_error_and_closes() {
        let adapter = IngestAdapter::new(WindowStore::new(10_000), CHANNEL);
        let (_trigger, shutdown) = shutdown::channel();

        let mut conn = Scripted {
            fail_subscribe: true,
            ..Default::default()
        };

        let res = adapter.run(&mut conn, shutdown).await;
        assert!(matches!(res, Err(AppError::Subscribe(_))));
        assert_eq!(conn.closed, 1);
    }

    #[tokio::test]
    async fn triggered_shutdown_stops_before_consuming() {
        let store = WindowStore::new(10_000);
        let adapter = IngestAdapter::new(store.clone(), CHANNEL);
        let (trigger, shutdown) = shutdown::channel();
        trigger.trigger();

        let mut conn = Scripted {
            events: VecDeque::from(vec![Ok(tick(0, 1.0))]),
            ..Default::default()
        };

        let exit = adapter.run(&mut conn, shutdown).await.unwrap();
        assert!(matches!(exit, IngestExit::Shutdown));
        assert_eq!(conn.closed, 1);
        assert_eq!(store.size(), 0);
    }
}
