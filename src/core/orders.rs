// Order submission, pending-entry lifecycle, protective amendments

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::types::{Position, Signal, TrailingStage};
use crate::error::{TradingError, TradingResult};
use crate::exchange::{BracketRequest, ExchangeClient, OrderHandle, OrderStatus};

const RETRY_DELAY_MS: u64 = 500;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("trading halted by kill switch")]
    Halted,

    #[error("entry rejected by exchange: {0}")]
    Rejected(String),

    #[error("protective leg failed, entry rolled back: {0}")]
    ProtectiveLegFailed(String),

    #[error("exchange unavailable: {0}")]
    Transient(String),
}

#[derive(Debug, Error)]
pub enum ModifyError {
    #[error("modify rejected by exchange: {0}")]
    Rejected(String),

    #[error("exchange unavailable: {0}")]
    Transient(String),
}

/// Why a pending entry left the book without filling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Sat unfilled past the timeout.
    Timeout,
    /// Price ran away from the requested entry.
    Divergence,
    /// Cancelled or rejected on the venue side.
    External,
}

/// Outcome of polling one pending entry.
#[derive(Debug)]
pub enum PendingResolution {
    Filled(Position),
    Cancelled {
        order_id: String,
        strategy_id: &'static str,
        reason: CancelReason,
    },
}

struct PendingEntry {
    signal: Signal,
    handle: OrderHandle,
}

/// Owns every order-path interaction with the exchange. Submissions
/// check the shared halt flag first, so an engaged kill switch blocks
/// new exposure immediately regardless of which loop asks.
pub struct OrderManager {
    client: Arc<dyn ExchangeClient>,
    halted: Arc<AtomicBool>,
    order_timeout: Duration,
    entry_divergence_pct: f64,
    pending: Mutex<HashMap<String, PendingEntry>>,
    /// Last (stop, target) applied per symbol, for idempotent modifies.
    last_applied: Mutex<HashMap<String, (f64, f64)>>,
}

impl OrderManager {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        halted: Arc<AtomicBool>,
        order_timeout_secs: u64,
        entry_divergence_pct: f64,
    ) -> Self {
        Self {
            client,
            halted,
            order_timeout: Duration::seconds(order_timeout_secs as i64),
            entry_divergence_pct,
            pending: Mutex::new(HashMap::new()),
            last_applied: Mutex::new(HashMap::new()),
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Submit a validated signal as entry + protective bracket.
    ///
    /// On a venue without atomic brackets the legs go out separately;
    /// if a protective leg fails, the entry is cancelled so no naked
    /// position can survive the degraded path.
    pub async fn submit(&self, signal: &Signal) -> Result<OrderHandle, SubmitError> {
        if self.halted.load(Ordering::SeqCst) {
            return Err(SubmitError::Halted);
        }

        let req = BracketRequest {
            symbol: signal.symbol.clone(),
            direction: signal.direction,
            size: signal.size,
            entry_price: signal.entry_price,
            stop_price: signal.stop_price,
            target_price: signal.target_price,
            leverage: signal.leverage,
            client_order_id: Uuid::new_v4().simple().to_string(),
        };

        // Leverage may already be set from a previous trade; a failure
        // here is not fatal to the submission
        if let Err(e) = self.client.set_leverage(&req.symbol, req.leverage).await {
            warn!(symbol = %req.symbol, error = %e, "set_leverage failed");
        }

        let handle = if self.client.supports_bracket() {
            self.submit_bracket(&req).await?
        } else {
            self.submit_degraded(&req).await?
        };

        info!(
            strategy = signal.strategy_id,
            symbol = %req.symbol,
            direction = %signal.direction,
            entry = signal.entry_price,
            stop = signal.stop_price,
            target = signal.target_price,
            "📬 entry order submitted"
        );

        self.pending.lock().await.insert(
            handle.order_id.clone(),
            PendingEntry {
                signal: signal.clone(),
                handle: handle.clone(),
            },
        );
        Ok(handle)
    }

    async fn submit_bracket(&self, req: &BracketRequest) -> Result<OrderHandle, SubmitError> {
        match self.with_retry(|| self.client.place_bracket(req)).await {
            Ok(handle) => Ok(handle),
            Err(e) => Err(map_submit_error(e)),
        }
    }

    async fn submit_degraded(&self, req: &BracketRequest) -> Result<OrderHandle, SubmitError> {
        warn!(
            symbol = %req.symbol,
            "venue lacks atomic brackets, placing protective legs separately"
        );
        let handle = self
            .with_retry(|| self.client.place_entry(req))
            .await
            .map_err(map_submit_error)?;

        let protection = self
            .with_retry(|| {
                self.client.place_protection(
                    &req.symbol,
                    req.direction,
                    req.size,
                    req.stop_price,
                    req.target_price,
                )
            })
            .await;

        if let Err(e) = protection {
            // Roll the entry back rather than leave it unprotected
            error!(symbol = %req.symbol, error = %e, "protective leg failed, cancelling entry");
            if let Err(cancel_err) = self
                .client
                .cancel_order(&req.symbol, &handle.order_id)
                .await
            {
                error!(
                    symbol = %req.symbol,
                    order_id = %handle.order_id,
                    error = %cancel_err,
                    "🚨 rollback cancel failed, manual intervention may be required"
                );
            }
            return Err(SubmitError::ProtectiveLegFailed(e.to_string()));
        }
        Ok(handle)
    }

    /// Poll every pending entry: detect fills, drop external cancels,
    /// and cancel entries that timed out or whose market ran away.
    pub async fn check_pending(
        &self,
        current_price: f64,
        now: DateTime<Utc>,
    ) -> Vec<PendingResolution> {
        let snapshot: Vec<(String, Signal, OrderHandle)> = {
            let pending = self.pending.lock().await;
            pending
                .values()
                .map(|p| (p.handle.order_id.clone(), p.signal.clone(), p.handle.clone()))
                .collect()
        };

        let mut resolutions = Vec::new();
        for (order_id, signal, handle) in snapshot {
            let status = match self.client.order_status(&signal.symbol, &order_id).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(order_id = %order_id, error = %e, "order status poll failed");
                    continue;
                }
            };

            match status {
                OrderStatus::Filled { fill_price } => {
                    self.pending.lock().await.remove(&order_id);
                    self.last_applied.lock().await.insert(
                        signal.symbol.clone(),
                        (signal.stop_price, signal.target_price),
                    );
                    info!(
                        symbol = %signal.symbol,
                        fill_price,
                        "✅ entry filled"
                    );
                    resolutions.push(PendingResolution::Filled(Position {
                        symbol: signal.symbol.clone(),
                        direction: signal.direction,
                        entry_price: fill_price,
                        size: signal.size,
                        leverage: signal.leverage,
                        stop_price: signal.stop_price,
                        target_price: signal.target_price,
                        trailing_stage: TrailingStage::None,
                        strategy_id: signal.strategy_id,
                        opened_at: now,
                        needs_review: false,
                    }));
                }
                OrderStatus::Cancelled | OrderStatus::Rejected(_) => {
                    self.pending.lock().await.remove(&order_id);
                    debug!(order_id = %order_id, "pending entry cancelled on venue side");
                    resolutions.push(PendingResolution::Cancelled {
                        order_id,
                        strategy_id: signal.strategy_id,
                        reason: CancelReason::External,
                    });
                }
                OrderStatus::Live => {
                    let divergence_pct = if signal.entry_price > 0.0 {
                        ((current_price - signal.entry_price) / signal.entry_price * 100.0).abs()
                    } else {
                        0.0
                    };

                    if now - handle.submitted_at > self.order_timeout {
                        if self.cancel_pending(&signal.symbol, &order_id).await {
                            info!(order_id = %order_id, "⏱️ entry cancelled after timeout");
                            resolutions.push(PendingResolution::Cancelled {
                                order_id,
                                strategy_id: signal.strategy_id,
                                reason: CancelReason::Timeout,
                            });
                        }
                    } else if divergence_pct > self.entry_divergence_pct {
                        if self.cancel_pending(&signal.symbol, &order_id).await {
                            info!(
                                order_id = %order_id,
                                divergence_pct,
                                "📉 entry cancelled, price diverged from requested level"
                            );
                            resolutions.push(PendingResolution::Cancelled {
                                order_id,
                                strategy_id: signal.strategy_id,
                                reason: CancelReason::Divergence,
                            });
                        }
                    }
                }
            }
        }
        resolutions
    }

    /// Cancel one pending entry if it has outlived the timeout.
    /// Returns whether a cancel went out.
    pub async fn cancel_if_stale(&self, order_id: &str, now: DateTime<Utc>) -> TradingResult<bool> {
        let (symbol, submitted_at) = {
            let pending = self.pending.lock().await;
            match pending.get(order_id) {
                Some(p) => (p.signal.symbol.clone(), p.handle.submitted_at),
                None => return Ok(false),
            }
        };
        if now - submitted_at <= self.order_timeout {
            return Ok(false);
        }
        self.client.cancel_order(&symbol, order_id).await?;
        self.pending.lock().await.remove(order_id);
        Ok(true)
    }

    async fn cancel_pending(&self, symbol: &str, order_id: &str) -> bool {
        match self.client.cancel_order(symbol, order_id).await {
            Ok(()) => {
                self.pending.lock().await.remove(order_id);
                true
            }
            Err(e) => {
                // The order may have filled in the meantime; the next
                // poll resolves it either way
                warn!(order_id = %order_id, error = %e, "cancel failed");
                false
            }
        }
    }

    /// Move the protective stop and/or target. Idempotent: repeating
    /// the values already on the venue is a no-op without a network
    /// call.
    pub async fn modify(
        &self,
        position: &Position,
        new_stop: Option<f64>,
        new_target: Option<f64>,
    ) -> Result<(), ModifyError> {
        if new_stop.is_none() && new_target.is_none() {
            return Ok(());
        }

        // Held across the amend so concurrent modifies for one symbol
        // serialize and the recorded state matches the venue
        let mut last = self.last_applied.lock().await;
        let (cur_stop, cur_target) = last
            .get(&position.symbol)
            .copied()
            .unwrap_or((position.stop_price, position.target_price));

        let want_stop = new_stop.unwrap_or(cur_stop);
        let want_target = new_target.unwrap_or(cur_target);
        if approx_eq(want_stop, cur_stop) && approx_eq(want_target, cur_target) {
            debug!(symbol = %position.symbol, "modify skipped, already applied");
            return Ok(());
        }

        let result = self
            .with_retry(|| {
                self.client
                    .amend_protection(&position.symbol, new_stop, new_target)
            })
            .await;

        match result {
            Ok(()) => {
                last.insert(position.symbol.clone(), (want_stop, want_target));
                info!(
                    symbol = %position.symbol,
                    stop = want_stop,
                    target = want_target,
                    "🔧 protective orders amended"
                );
                Ok(())
            }
            Err(TradingError::ExchangeTransient(msg)) => Err(ModifyError::Transient(msg)),
            Err(e) => Err(ModifyError::Rejected(e.to_string())),
        }
    }

    /// Emergency path: cancel every pending entry and market-close
    /// every listed position. Best-effort per item; the halt flag (set
    /// by the caller) is what guarantees no new exposure.
    pub async fn flatten_all(&self, symbols: &[String]) -> Vec<(String, TradingResult<()>)> {
        let drained: Vec<(String, String)> = {
            let mut pending = self.pending.lock().await;
            pending
                .drain()
                .map(|(id, p)| (p.signal.symbol.clone(), id))
                .collect()
        };
        for (symbol, order_id) in drained {
            if let Err(e) = self.client.cancel_order(&symbol, &order_id).await {
                error!(order_id = %order_id, error = %e, "flatten: pending cancel failed");
            }
        }

        let mut results = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let result = self.client.close_position(symbol).await;
            if let Err(e) = &result {
                error!(symbol = %symbol, error = %e, "🚨 flatten: close failed");
            } else {
                info!(symbol = %symbol, "🧯 position closed");
            }
            results.push((symbol.clone(), result));
        }
        self.last_applied.lock().await.clear();
        results
    }

    /// One retry for transient failures, nothing for rejections.
    async fn with_retry<T, F, Fut>(&self, mut op: F) -> TradingResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = TradingResult<T>>,
    {
        match op().await {
            Ok(v) => Ok(v),
            Err(e) if e.is_retryable() => {
                debug!(error = %e, "transient failure, retrying once");
                tokio::time::sleep(std::time::Duration::from_millis(RETRY_DELAY_MS)).await;
                op().await
            }
            Err(e) => Err(e),
        }
    }
}

fn map_submit_error(e: TradingError) -> SubmitError {
    match e {
        TradingError::ExchangeTransient(msg) => SubmitError::Transient(msg),
        other => SubmitError::Rejected(other.to_string()),
    }
}

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}
