// OKX public websocket: streaming ticker prices

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{TradingError, TradingResult};

const PING_INTERVAL_SECS: u64 = 20;
const RECONNECT_DELAY_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceUpdate {
    pub symbol: String,
    pub price: f64,
}

pub struct OkxPublicWs {
    ws_sender: futures_util::stream::SplitSink<
        WebSocketStream<MaybeTlsStream<TcpStream>>,
        Message,
    >,
    ws_receiver: futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

impl OkxPublicWs {
    pub async fn connect(url: &str) -> TradingResult<Self> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| TradingError::ExchangeTransient(format!("ws connect: {}", e)))?;
        info!("✅ Connected to OKX public websocket");
        let (ws_sender, ws_receiver) = ws_stream.split();
        Ok(Self {
            ws_sender,
            ws_receiver,
        })
    }

    pub async fn subscribe_tickers(&mut self, symbol: &str) -> TradingResult<()> {
        let msg = json!({
            "op": "subscribe",
            "args": [{ "channel": "tickers", "instId": symbol }],
        });
        self.ws_sender
            .send(Message::Text(msg.to_string()))
            .await
            .map_err(|e| TradingError::ExchangeTransient(format!("ws subscribe: {}", e)))?;
        info!("📡 Subscribed to {} ticker stream", symbol);
        Ok(())
    }

    async fn send_ping(&mut self) -> TradingResult<()> {
        self.ws_sender
            .send(Message::Text("ping".to_string()))
            .await
            .map_err(|e| TradingError::ExchangeTransient(format!("ws ping: {}", e)))
    }

    /// Read messages until a price update arrives or the stream ends.
    /// Returns None when the connection closed.
    pub async fn next_price(&mut self) -> TradingResult<Option<PriceUpdate>> {
        loop {
            let next = tokio::time::timeout(
                std::time::Duration::from_secs(PING_INTERVAL_SECS),
                self.ws_receiver.next(),
            )
            .await;

            let msg = match next {
                Err(_) => {
                    // Idle; keep the connection alive
                    self.send_ping().await?;
                    continue;
                }
                Ok(None) => return Ok(None),
                Ok(Some(Err(e))) => {
                    return Err(TradingError::ExchangeTransient(format!("ws read: {}", e)))
                }
                Ok(Some(Ok(m))) => m,
            };

            match msg {
                Message::Text(text) => {
                    if text == "pong" {
                        continue;
                    }
                    if let Some(update) = parse_ticker_message(&text) {
                        return Ok(Some(update));
                    }
                    handle_event_message(&text);
                }
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
    }
}

/// Parse a tickers-channel push into a price update.
pub fn parse_ticker_message(text: &str) -> Option<PriceUpdate> {
    let value: Value = serde_json::from_str(text).ok()?;
    let arg = value.get("arg")?;
    if arg.get("channel")?.as_str()? != "tickers" {
        return None;
    }
    let symbol = arg.get("instId")?.as_str()?.to_string();
    let last = value
        .get("data")?
        .get(0)?
        .get("last")?
        .as_str()?
        .parse::<f64>()
        .ok()?;
    Some(PriceUpdate {
        symbol,
        price: last,
    })
}

fn handle_event_message(text: &str) {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        if let Some(event) = value.get("event").and_then(|e| e.as_str()) {
            match event {
                "subscribe" => debug!("subscription confirmed"),
                "error" => warn!(message = text, "websocket error event"),
                _ => {}
            }
        }
    }
}

/// Long-running price feed task: keeps a subscription alive and
/// publishes the latest price to a watch channel, reconnecting on any
/// failure.
pub async fn run_price_feed(url: String, symbol: String, tx: watch::Sender<f64>) {
    loop {
        match price_feed_session(&url, &symbol, &tx).await {
            Ok(()) => warn!("price feed stream ended, reconnecting"),
            Err(e) => warn!(error = %e, "price feed failed, reconnecting"),
        }
        if tx.is_closed() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_secs(RECONNECT_DELAY_SECS)).await;
    }
}

async fn price_feed_session(
    url: &str,
    symbol: &str,
    tx: &watch::Sender<f64>,
) -> TradingResult<()> {
    let mut ws = OkxPublicWs::connect(url).await?;
    ws.subscribe_tickers(symbol).await?;
    while let Some(update) = ws.next_price().await? {
        if tx.send(update.price).is_err() {
            // Engine dropped the receiver; shut the feed down
            return Ok(());
        }
    }
    Ok(())
}
