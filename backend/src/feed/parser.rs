//! JSON-RPC frame parser for the Deribit-style ticker feed.
//!
//! Frames arrive in three shapes:
//!
//! ```jsonc
//! // notification
//! {"jsonrpc":"2.0","method":"subscription",
//!  "params":{"channel":"ticker.BTC-PERPETUAL.100ms",
//!            "data":{"mark_price":64012.5,"timestamp":1700000000000, ...}}}
//! // result
//! {"jsonrpc":"2.0","id":1,"result":["ticker.BTC-PERPETUAL.100ms"]}
//! // error
//! {"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"Invalid params",
//!  "data":{"reason":"...","param":"channels"}}}
//! ```
//!
//! Classification is strict: only `method == "subscription"` frames carry
//! data. Anything else is an RPC response when it has an `id`, and is
//! split on `error` vs `result`. The parser is stateless; channel matching
//! is left to the caller.

use serde::Deserialize;
use serde_json::Value;

use super::{FeedError, FeedEvent, RpcErrorBody};

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionParams {
    channel: String,
    data: TickerData,
}

#[derive(Debug, Deserialize)]
struct TickerData {
    mark_price: f64,
    timestamp: i64,
}

pub fn parse_feed_message(raw: &str) -> Result<FeedEvent, FeedError> {
    let json: Value = serde_json::from_str(raw).map_err(|e| FeedError::decode(raw, e))?;
    if !json.is_object() {
        return Err(FeedError::decode(raw, "frame is not a JSON object"));
    }

    let env: Envelope =
        serde_json::from_value(json.clone()).map_err(|e| FeedError::decode(raw, e))?;

    match env.method.as_deref() {
        Some("subscription") => {
            let params = env
                .params
                .ok_or_else(|| FeedError::decode(raw, "subscription frame without params"))?;
            let p: SubscriptionParams =
                serde_json::from_value(params).map_err(|e| FeedError::decode(raw, e))?;

            return Ok(FeedEvent::Subscription {
                channel: p.channel,
                mark_price: p.data.mark_price,
                timestamp: p.data.timestamp,
            });
        }
        Some("heartbeat") => return Ok(FeedEvent::Heartbeat),
        _ => {}
    }

    let id = env.id.as_ref().and_then(Value::as_u64);

    if let Some(err) = env.error {
        let error: RpcErrorBody =
            serde_json::from_value(err).map_err(|e| FeedError::decode(raw, e))?;
        return Ok(FeedEvent::RpcError { id, error });
    }

    if let (Some(id), Some(result)) = (id, env.result) {
        return Ok(FeedEvent::RpcResult { id, result });
    }

    Ok(FeedEvent::Unknown(json))
}
