#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use marktrend::feed::{FeedConnector, FeedError, FeedEvent, SubscribeRequest, parse_feed_message};
use tokio::sync::mpsc;

pub const CHANNEL: &str = "ticker.BTC-PERPETUAL.100ms";

/// Connector fed with raw text frames through a channel.
///
/// Frames go through the real parser. Dropping the sender ends the stream.
pub struct ChannelConnector {
    rx: mpsc::UnboundedReceiver<String>,
    pub subscribed: Arc<Mutex<Vec<SubscribeRequest>>>,
    pub closed: Arc<AtomicUsize>,
}

pub fn channel_connector() -> (mpsc::UnboundedSender<String>, ChannelConnector) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        tx,
        ChannelConnector {
            rx,
            subscribed: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicUsize::new(0)),
        },
    )
}

impl ChannelConnector {
    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedConnector for ChannelConnector {
    async fn subscribe(&mut self, req: &SubscribeRequest) -> Result<(), FeedError> {
        self.subscribed.lock().unwrap().push(req.clone());
        Ok(())
    }

    async fn next_event(&mut self) -> Option<Result<FeedEvent, FeedError>> {
        let raw = self.rx.recv().await?;
        Some(parse_feed_message(&raw))
    }

    async fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Ticker notification frame as sent by the venue.
pub fn ticker_frame(channel: &str, ts_ms: i64, mark_price: f64) -> String {
    format!(
        r#"{{"jsonrpc":"2.0","method":"subscription","params":{{"channel":"{channel}","data":{{"timestamp":{ts_ms},"instrument_name":"BTC-PERPETUAL","mark_price":{mark_price},"index_price":{mark_price}}}}}}}"#
    )
}

pub fn subscribe_ack(id: u64) -> String {
    format!(r#"{{"jsonrpc":"2.0","id":{id},"result":["{CHANNEL}"]}}"#)
}

pub fn rpc_error(id: u64) -> String {
    format!(
        r#"{{"jsonrpc":"2.0","id":{id},"error":{{"code":-32602,"message":"Invalid params","data":{{"reason":"invalid channel","param":"channels"}}}}}}"#
    )
}
