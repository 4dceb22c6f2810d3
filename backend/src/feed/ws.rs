use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, trace, warn};

use super::{FeedConnector, FeedError, FeedEvent, SubscribeRequest, parse_feed_message};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket implementation of the feed connector.
pub struct DeribitWsConnector {
    url: String,
    ws: Option<WsStream>,
}

impl DeribitWsConnector {
    /// Opens the connection. No request is sent until [`FeedConnector::subscribe`].
    #[instrument(fields(url = %url))]
    pub async fn connect(url: &str) -> Result<Self, FeedError> {
        debug!("connecting to feed websocket");
        let (ws, _) = connect_async(url).await.map_err(|e| {
            error!(error = ?e, "websocket connection failed");
            FeedError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;

        info!("websocket connection established");
        Ok(Self {
            url: url.to_string(),
            ws: Some(ws),
        })
    }
}

#[async_trait]
impl FeedConnector for DeribitWsConnector {
    async fn subscribe(&mut self, req: &SubscribeRequest) -> Result<(), FeedError> {
        let ws = self.ws.as_mut().ok_or(FeedError::Closed)?;

        let text =
            serde_json::to_string(&req.to_json()).map_err(|e| FeedError::Send(e.to_string()))?;
        debug!(payload = %text, "sending public/subscribe");

        ws.send(Message::Text(text.into())).await.map_err(|e| {
            error!(error = ?e, "failed to send subscribe request");
            FeedError::Send(e.to_string())
        })
    }

    async fn next_event(&mut self) -> Option<Result<FeedEvent, FeedError>> {
        let ws = self.ws.as_mut()?;

        loop {
            let msg = match ws.next().await? {
                Ok(m) => m,
                Err(e) => {
                    warn!(error = ?e, "websocket stream error");
                    return Some(Err(FeedError::Transport(e.to_string())));
                }
            };

            if msg.is_ping() || msg.is_pong() {
                trace!("keep-alive frame");
                continue;
            }

            if msg.is_close() {
                info!(frame = ?msg, "feed closed by server");
                return None;
            }

            if !msg.is_text() {
                debug!(msg_type = ?msg, "ignoring non-text frame");
                continue;
            }

            let raw = match msg.to_text() {
                Ok(t) => t,
                Err(e) => {
                    return Some(Err(FeedError::Decode {
                        raw: String::new(),
                        reason: e.to_string(),
                    }));
                }
            };

            trace!(raw_event = %raw, "received frame");
            return Some(parse_feed_message(raw));
        }
    }

    async fn close(&mut self) {
        let Some(mut ws) = self.ws.take() else {
            return;
        };

        match ws.close(None).await {
            Ok(()) => info!(url = %self.url, "feed connection closed"),
            Err(e) => debug!(error = ?e, "close handshake did not complete"),
        }
    }
}
