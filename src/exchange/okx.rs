// OKX v5 REST client for USDT-margined perpetual swaps

use std::collections::HashMap;
use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ExchangeConfig;
use crate::core::types::{Bar, Direction};
use crate::error::{TradingError, TradingResult};
use crate::exchange::{
    AccountBalance, BracketRequest, ExchangeClient, ExchangePosition, OrderHandle, OrderStatus,
};

const MARGIN_MODE: &str = "isolated";

type HmacSha256 = Hmac<Sha256>;

/// Every OKX response uses this envelope; `code` is "0" on success.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderRequest {
    inst_id: String,
    td_mode: String,
    cl_ord_id: String,
    side: String,
    ord_type: String,
    sz: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    px: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reduce_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attach_algo_ords: Option<Vec<AttachAlgoOrd>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AttachAlgoOrd {
    attach_algo_cl_ord_id: String,
    tp_trigger_px: String,
    /// "-1" executes the leg at market once triggered.
    tp_ord_px: String,
    sl_trigger_px: String,
    sl_ord_px: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AlgoOrderRequest {
    inst_id: String,
    td_mode: String,
    algo_cl_ord_id: String,
    side: String,
    ord_type: String,
    sz: String,
    reduce_only: bool,
    tp_trigger_px: String,
    tp_ord_px: String,
    sl_trigger_px: String,
    sl_ord_px: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AmendAlgoRequest {
    inst_id: String,
    algo_cl_ord_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_sl_trigger_px: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_tp_trigger_px: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderAck {
    #[serde(default)]
    ord_id: String,
    #[serde(default)]
    algo_cl_ord_id: String,
    #[serde(default)]
    s_code: String,
    #[serde(default)]
    s_msg: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderDetail {
    state: String,
    #[serde(default)]
    avg_px: String,
    #[serde(default)]
    px: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceData {
    total_eq: String,
    #[serde(default)]
    imr: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionData {
    inst_id: String,
    pos: String,
    #[serde(default)]
    avg_px: String,
    #[serde(default)]
    lever: String,
    #[serde(default)]
    upl: String,
    #[serde(default)]
    mark_px: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerData {
    last: String,
}

fn parse_f64(value: &str, field: &str) -> TradingResult<f64> {
    value
        .parse::<f64>()
        .map_err(|_| TradingError::MarketData(format!("unparseable {}: '{}'", field, value)))
}

fn fmt_px(px: f64) -> String {
    format!("{:.6}", px)
}

pub struct OkxClient {
    http: reqwest::Client,
    rest_url: String,
    api_key: String,
    api_secret: String,
    passphrase: String,
    simulated: bool,
    /// Protective-order client ids per symbol, so amendments can be
    /// addressed without an extra lookup round-trip.
    algo_ids: Mutex<HashMap<String, String>>,
}

impl OkxClient {
    pub fn new(cfg: &ExchangeConfig) -> TradingResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| TradingError::Config(format!("http client: {}", e)))?;
        Ok(Self {
            http,
            rest_url: cfg.rest_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            api_secret: cfg.api_secret.clone(),
            passphrase: cfg.passphrase.clone(),
            simulated: cfg.simulated,
            algo_ids: Mutex::new(HashMap::new()),
        })
    }

    fn sign(&self, timestamp: &str, method: &str, path: &str, body: &str) -> TradingResult<String> {
        let payload = format!("{}{}{}{}", timestamp, method, path, body);
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|_| TradingError::Config("invalid api secret".to_string()))?;
        mac.update(payload.as_bytes());
        Ok(B64.encode(mac.finalize().into_bytes()))
    }

    /// Send a signed request and unwrap the OKX envelope.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> TradingResult<Vec<T>> {
        let url = format!("{}{}", self.rest_url, path);
        let body_str = body.unwrap_or_default();

        let mut req = self.http.request(method.clone(), &url);
        if !self.api_key.is_empty() {
            let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
            let sign = self.sign(&timestamp, method.as_str(), path, &body_str)?;
            req = req
                .header("OK-ACCESS-KEY", &self.api_key)
                .header("OK-ACCESS-SIGN", sign)
                .header("OK-ACCESS-TIMESTAMP", timestamp)
                .header("OK-ACCESS-PASSPHRASE", &self.passphrase);
        }
        if self.simulated {
            req = req.header("x-simulated-trading", "1");
        }
        if !body_str.is_empty() {
            req = req
                .header("Content-Type", "application/json")
                .body(body_str);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(TradingError::ExchangeTransient(format!(
                "HTTP {} from {}",
                status, path
            )));
        }

        let envelope: ApiResponse<T> = resp.json().await?;
        if envelope.code != "0" {
            return Err(TradingError::ExchangeRejected(format!(
                "code {}: {}",
                envelope.code, envelope.msg
            )));
        }
        Ok(envelope.data)
    }

    fn check_ack(acks: &[OrderAck]) -> TradingResult<&OrderAck> {
        let ack = acks.first().ok_or_else(|| {
            TradingError::ExchangeRejected("empty order acknowledgement".to_string())
        })?;
        if !ack.s_code.is_empty() && ack.s_code != "0" {
            return Err(TradingError::ExchangeRejected(format!(
                "sCode {}: {}",
                ack.s_code, ack.s_msg
            )));
        }
        Ok(ack)
    }

    fn remember_algo_id(&self, symbol: &str, algo_cl_ord_id: &str) {
        if let Ok(mut ids) = self.algo_ids.lock() {
            ids.insert(symbol.to_string(), algo_cl_ord_id.to_string());
        }
    }

    fn algo_id_for(&self, symbol: &str) -> Option<String> {
        self.algo_ids.lock().ok().and_then(|ids| ids.get(symbol).cloned())
    }

    fn new_client_id() -> String {
        Uuid::new_v4().simple().to_string()
    }
}

#[async_trait::async_trait]
impl ExchangeClient for OkxClient {
    async fn set_leverage(&self, symbol: &str, leverage: f64) -> TradingResult<()> {
        let body = serde_json::json!({
            "instId": symbol,
            "lever": format!("{}", leverage),
            "mgnMode": MARGIN_MODE,
        })
        .to_string();
        let _: Vec<serde_json::Value> = self
            .request(Method::POST, "/api/v5/account/set-leverage", Some(body))
            .await?;
        Ok(())
    }

    async fn place_bracket(&self, req: &BracketRequest) -> TradingResult<OrderHandle> {
        let algo_cl_ord_id = Self::new_client_id();
        let order = OrderRequest {
            inst_id: req.symbol.clone(),
            td_mode: MARGIN_MODE.to_string(),
            cl_ord_id: req.client_order_id.clone(),
            side: req.direction.open_side().to_string(),
            ord_type: "limit".to_string(),
            sz: format!("{}", req.size),
            px: Some(fmt_px(req.entry_price)),
            reduce_only: None,
            attach_algo_ords: Some(vec![AttachAlgoOrd {
                attach_algo_cl_ord_id: algo_cl_ord_id.clone(),
                tp_trigger_px: fmt_px(req.target_price),
                tp_ord_px: "-1".to_string(),
                sl_trigger_px: fmt_px(req.stop_price),
                sl_ord_px: "-1".to_string(),
            }]),
        };
        let body = serde_json::to_string(&order)?;
        let acks: Vec<OrderAck> = self
            .request(Method::POST, "/api/v5/trade/order", Some(body))
            .await?;
        let ack = Self::check_ack(&acks)?;
        self.remember_algo_id(&req.symbol, &algo_cl_ord_id);
        debug!(symbol = %req.symbol, ord_id = %ack.ord_id, "bracket order placed");
        Ok(OrderHandle {
            order_id: ack.ord_id.clone(),
            client_order_id: req.client_order_id.clone(),
            submitted_at: Utc::now(),
        })
    }

    async fn place_entry(&self, req: &BracketRequest) -> TradingResult<OrderHandle> {
        let order = OrderRequest {
            inst_id: req.symbol.clone(),
            td_mode: MARGIN_MODE.to_string(),
            cl_ord_id: req.client_order_id.clone(),
            side: req.direction.open_side().to_string(),
            ord_type: "limit".to_string(),
            sz: format!("{}", req.size),
            px: Some(fmt_px(req.entry_price)),
            reduce_only: None,
            attach_algo_ords: None,
        };
        let body = serde_json::to_string(&order)?;
        let acks: Vec<OrderAck> = self
            .request(Method::POST, "/api/v5/trade/order", Some(body))
            .await?;
        let ack = Self::check_ack(&acks)?;
        Ok(OrderHandle {
            order_id: ack.ord_id.clone(),
            client_order_id: req.client_order_id.clone(),
            submitted_at: Utc::now(),
        })
    }

    async fn place_protection(
        &self,
        symbol: &str,
        direction: Direction,
        size: f64,
        stop_price: f64,
        target_price: f64,
    ) -> TradingResult<String> {
        let algo_cl_ord_id = Self::new_client_id();
        let order = AlgoOrderRequest {
            inst_id: symbol.to_string(),
            td_mode: MARGIN_MODE.to_string(),
            algo_cl_ord_id: algo_cl_ord_id.clone(),
            side: direction.opposite().open_side().to_string(),
            ord_type: "oco".to_string(),
            sz: format!("{}", size),
            reduce_only: true,
            tp_trigger_px: fmt_px(target_price),
            tp_ord_px: "-1".to_string(),
            sl_trigger_px: fmt_px(stop_price),
            sl_ord_px: "-1".to_string(),
        };
        let body = serde_json::to_string(&order)?;
        let acks: Vec<OrderAck> = self
            .request(Method::POST, "/api/v5/trade/order-algo", Some(body))
            .await?;
        Self::check_ack(&acks)?;
        self.remember_algo_id(symbol, &algo_cl_ord_id);
        Ok(algo_cl_ord_id)
    }

    async fn amend_protection(
        &self,
        symbol: &str,
        new_stop: Option<f64>,
        new_target: Option<f64>,
    ) -> TradingResult<()> {
        let algo_cl_ord_id = self.algo_id_for(symbol).ok_or_else(|| {
            TradingError::ExchangeRejected(format!("no protective order tracked for {}", symbol))
        })?;
        let amend = AmendAlgoRequest {
            inst_id: symbol.to_string(),
            algo_cl_ord_id,
            new_sl_trigger_px: new_stop.map(fmt_px),
            new_tp_trigger_px: new_target.map(fmt_px),
        };
        let body = serde_json::to_string(&amend)?;
        let acks: Vec<OrderAck> = self
            .request(Method::POST, "/api/v5/trade/amend-algos", Some(body))
            .await?;
        Self::check_ack(&acks)?;
        Ok(())
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> TradingResult<()> {
        let body = serde_json::json!({
            "instId": symbol,
            "ordId": order_id,
        })
        .to_string();
        let acks: Vec<OrderAck> = self
            .request(Method::POST, "/api/v5/trade/cancel-order", Some(body))
            .await?;
        Self::check_ack(&acks)?;
        Ok(())
    }

    async fn order_status(&self, symbol: &str, order_id: &str) -> TradingResult<OrderStatus> {
        let path = format!("/api/v5/trade/order?instId={}&ordId={}", symbol, order_id);
        let details: Vec<OrderDetail> = self.request(Method::GET, &path, None).await?;
        let detail = details.first().ok_or_else(|| {
            TradingError::ExchangeRejected(format!("order {} not found", order_id))
        })?;
        let status = match detail.state.as_str() {
            "filled" => {
                let px = if detail.avg_px.is_empty() {
                    &detail.px
                } else {
                    &detail.avg_px
                };
                OrderStatus::Filled {
                    fill_price: parse_f64(px, "avgPx")?,
                }
            }
            "canceled" | "mmp_canceled" => OrderStatus::Cancelled,
            "live" | "partially_filled" => OrderStatus::Live,
            other => OrderStatus::Rejected(format!("unexpected state '{}'", other)),
        };
        Ok(status)
    }

    async fn account_balance(&self) -> TradingResult<AccountBalance> {
        let data: Vec<BalanceData> = self
            .request(Method::GET, "/api/v5/account/balance", None)
            .await?;
        let bal = data.first().ok_or_else(|| {
            TradingError::ExchangeRejected("empty balance response".to_string())
        })?;
        Ok(AccountBalance {
            equity: parse_f64(&bal.total_eq, "totalEq")?,
            margin_used: if bal.imr.is_empty() {
                0.0
            } else {
                parse_f64(&bal.imr, "imr")?
            },
        })
    }

    async fn positions(&self) -> TradingResult<Vec<ExchangePosition>> {
        let data: Vec<PositionData> = self
            .request(Method::GET, "/api/v5/account/positions?instType=SWAP", None)
            .await?;
        let mut out = Vec::new();
        for p in data {
            let size = parse_f64(&p.pos, "pos")?;
            if size == 0.0 {
                continue;
            }
            let direction = if size > 0.0 {
                Direction::Long
            } else {
                Direction::Short
            };
            out.push(ExchangePosition {
                symbol: p.inst_id,
                direction,
                size: size.abs(),
                entry_price: parse_f64(&p.avg_px, "avgPx")?,
                leverage: parse_f64(&p.lever, "lever")?,
                mark_price: parse_f64(&p.mark_px, "markPx")?,
                unrealized_pnl: parse_f64(&p.upl, "upl")?,
            });
        }
        Ok(out)
    }

    async fn close_position(&self, symbol: &str) -> TradingResult<()> {
        let body = serde_json::json!({
            "instId": symbol,
            "mgnMode": MARGIN_MODE,
            "autoCxl": true,
        })
        .to_string();
        let result: TradingResult<Vec<serde_json::Value>> = self
            .request(Method::POST, "/api/v5/trade/close-position", Some(body))
            .await;
        match result {
            Ok(_) => Ok(()),
            // 51023: no position to close; treat as already flat
            Err(TradingError::ExchangeRejected(msg)) if msg.contains("51023") => {
                warn!(symbol, "close requested but no position exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn ticker(&self, symbol: &str) -> TradingResult<f64> {
        let path = format!("/api/v5/market/ticker?instId={}", symbol);
        let data: Vec<TickerData> = self.request(Method::GET, &path, None).await?;
        let t = data.first().ok_or_else(|| {
            TradingError::MarketData(format!("empty ticker response for {}", symbol))
        })?;
        parse_f64(&t.last, "last")
    }

    async fn candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> TradingResult<Vec<Bar>> {
        let path = format!(
            "/api/v5/market/candles?instId={}&bar={}&limit={}",
            symbol, interval, limit
        );
        let rows: Vec<Vec<String>> = self.request(Method::GET, &path, None).await?;
        let mut bars = Vec::with_capacity(rows.len());
        for row in rows {
            if row.len() < 6 {
                return Err(TradingError::MarketData(format!(
                    "short candle row ({} fields)",
                    row.len()
                )));
            }
            // Trailing confirm flag is "0" while the candle is building
            if row.len() >= 9 && row[8] == "0" {
                continue;
            }
            bars.push(Bar {
                ts: row[0]
                    .parse::<i64>()
                    .map_err(|_| TradingError::MarketData(format!("bad candle ts '{}'", row[0])))?,
                open: parse_f64(&row[1], "open")?,
                high: parse_f64(&row[2], "high")?,
                low: parse_f64(&row[3], "low")?,
                close: parse_f64(&row[4], "close")?,
                volume: parse_f64(&row[5], "volume")?,
            });
        }
        // OKX returns newest first
        bars.reverse();
        Ok(bars)
    }
}
