//! Feed Connector abstraction.
//!
//! A connector owns the transport, sends the subscribe request and yields
//! decoded [`FeedEvent`]s one at a time. The ingest adapter only sees this
//! trait, so tests can drive it with a scripted event source.

pub mod parser;
pub mod ws;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

pub use parser::parse_feed_message;
pub use ws::DeribitWsConnector;

/// Outbound `public/subscribe` request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub id: u64,
    pub channels: Vec<String>,
}

impl SubscribeRequest {
    pub fn new(id: u64, channel: impl Into<String>) -> Self {
        Self {
            id,
            channels: vec![channel.into()],
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": self.id,
            "method": "public/subscribe",
            "params": { "channels": self.channels }
        })
    }
}

/// `error` object of a JSON-RPC error response.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<RpcErrorData>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct RpcErrorData {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub param: Option<String>,
}

/// Decoded inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum FeedEvent {
    /// Ticker notification on `channel`.
    Subscription {
        channel: String,
        mark_price: f64,
        timestamp: i64,
    },
    /// Successful RPC response, e.g. the list of subscribed channels.
    RpcResult { id: u64, result: Value },
    /// Failed RPC response.
    RpcError { id: Option<u64>, error: RpcErrorBody },
    /// Venue heartbeat notification.
    Heartbeat,
    /// Well-formed JSON that matches no known frame shape.
    Unknown(Value),
}

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("connect to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    #[error("send failed: {0}")]
    Send(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("cannot decode frame: {reason}")]
    Decode { raw: String, reason: String },

    #[error("connection closed")]
    Closed,
}

impl FeedError {
    pub fn decode(raw: &str, reason: impl ToString) -> Self {
        FeedError::Decode {
            raw: raw.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the connection is unusable after this error.
    ///
    /// A single undecodable frame is not fatal; everything else is.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FeedError::Decode { .. })
    }
}

#[async_trait]
pub trait FeedConnector: Send {
    /// Sends a subscribe request over the open connection.
    async fn subscribe(&mut self, req: &SubscribeRequest) -> Result<(), FeedError>;

    /// Waits for the next inbound event.
    ///
    /// `None` means the stream has ended and no further events will arrive.
    async fn next_event(&mut self) -> Option<Result<FeedEvent, FeedError>>;

    /// Releases the connection. Safe to call more than once.
    async fn close(&mut self);
}
