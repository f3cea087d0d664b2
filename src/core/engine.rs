// Trading engine: signal loop, position monitor loop, lifecycle

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::core::kill_switch::{Action, KillSwitch};
use crate::core::orders::{OrderManager, PendingResolution, SubmitError};
use crate::core::risk::RiskEngine;
use crate::core::snapshot::BarWindow;
use crate::core::strategy::StrategyManager;
use crate::core::trailing::TrailingEngine;
use crate::core::types::{AccountState, Position, TrailingStage};
use crate::core::indicators::IndicatorParams;
use crate::error::TradingResult;
use crate::exchange::{okx_ws, ExchangeClient};
use crate::journal::Journal;
use crate::notify::{Event, Notifier};

const CANDLE_FETCH_LIMIT: usize = 100;

/// Orchestrates the two loops:
///
/// - signal loop (fast): refresh account, run the kill switch, poll
///   candles, evaluate strategies, validate and submit entries,
///   resolve pending orders
/// - monitor loop (slower): reconcile positions with the venue and
///   drive the trailing state machine
///
/// Both loops share the account state behind an RwLock and the open
/// positions behind a mutex; per-symbol async locks keep order-path
/// work for one symbol serialized across loops.
pub struct TradingEngine {
    config: Config,
    client: Arc<dyn ExchangeClient>,
    manager: Mutex<StrategyManager>,
    risk: RiskEngine,
    pub orders: Arc<OrderManager>,
    trailing: TrailingEngine,
    pub kill_switch: Arc<KillSwitch>,
    positions: Mutex<HashMap<String, Position>>,
    symbol_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    account: RwLock<AccountState>,
    window: Mutex<BarWindow>,
    latest_price: RwLock<f64>,
    entries_paused: AtomicBool,
    last_action: Mutex<Action>,
    day: Mutex<NaiveDate>,
    notifier: Notifier,
    journal: std::sync::Mutex<Journal>,
}

impl TradingEngine {
    pub fn new(
        config: Config,
        client: Arc<dyn ExchangeClient>,
        notifier: Notifier,
        journal: Journal,
    ) -> Self {
        let kill_switch = Arc::new(KillSwitch::new(config.risk));
        let orders = Arc::new(OrderManager::new(
            Arc::clone(&client),
            kill_switch.halted_flag(),
            config.trading.order_timeout_secs,
            config.trading.entry_divergence_pct,
        ));
        let params = IndicatorParams::default();
        Self {
            manager: Mutex::new(StrategyManager::from_config(&config)),
            risk: RiskEngine::new(config.risk),
            trailing: TrailingEngine::new(config.trailing),
            kill_switch,
            orders,
            client,
            positions: Mutex::new(HashMap::new()),
            symbol_locks: Mutex::new(HashMap::new()),
            account: RwLock::new(AccountState {
                equity: 0.0,
                margin_used: 0.0,
                daily_starting_equity: 0.0,
                peak_equity: 0.0,
            }),
            window: Mutex::new(BarWindow::new(CANDLE_FETCH_LIMIT * 2, params)),
            latest_price: RwLock::new(0.0),
            entries_paused: AtomicBool::new(false),
            last_action: Mutex::new(Action::Continue),
            day: Mutex::new(Utc::now().date_naive()),
            notifier,
            journal: std::sync::Mutex::new(journal),
            config,
        }
    }

    pub async fn account(&self) -> AccountState {
        *self.account.read().await
    }

    pub async fn open_positions(&self) -> Vec<Position> {
        self.positions.lock().await.values().cloned().collect()
    }

    fn journal_event<T: serde::Serialize>(&self, kind: &str, payload: &T) {
        let result = match self.journal.lock() {
            Ok(j) => j.append(kind, payload),
            Err(_) => return,
        };
        if let Err(e) = result {
            // Journaling must never take down a trading loop
            error!(error = %e, kind, "journal write failed");
        }
    }

    async fn symbol_lock(&self, symbol: &str) -> Arc<Mutex<()>> {
        let mut locks = self.symbol_locks.lock().await;
        Arc::clone(
            locks
                .entry(symbol.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Startup: baseline the account, adopt any positions already on
    /// the venue, and seed the candle window.
    pub async fn startup(&self, now: DateTime<Utc>) -> TradingResult<()> {
        let balance = self.client.account_balance().await?;
        {
            let mut account = self.account.write().await;
            account.equity = balance.equity;
            account.margin_used = balance.margin_used;
            account.daily_starting_equity = balance.equity;
            account.peak_equity = balance.equity;
        }
        *self.day.lock().await = now.date_naive();
        info!(equity = balance.equity, "💰 account baselined");

        for ep in self.client.positions().await? {
            warn!(
                symbol = %ep.symbol,
                direction = %ep.direction,
                size = ep.size,
                "found existing position on venue, adopting for review"
            );
            let s = ep.direction.sign();
            let position = Position {
                symbol: ep.symbol.clone(),
                direction: ep.direction,
                entry_price: ep.entry_price,
                size: ep.size,
                leverage: ep.leverage,
                // Placeholder bracket until the operator reviews it
                stop_price: ep.entry_price * (1.0 - s * 0.02),
                target_price: ep.entry_price * (1.0 + s * 0.04),
                trailing_stage: TrailingStage::None,
                strategy_id: "adopted",
                opened_at: now,
                needs_review: true,
            };
            self.journal_event("adopted_position", &position);
            self.positions.lock().await.insert(ep.symbol, position);
        }

        let symbol = &self.config.trading.symbol;
        let bars = self
            .client
            .candles(symbol, &self.config.trading.candle_interval, CANDLE_FETCH_LIMIT)
            .await?;
        self.window.lock().await.replace(bars);

        let price = self.client.ticker(symbol).await?;
        *self.latest_price.write().await = price;
        info!(symbol = %symbol, price, "📊 market data seeded");
        Ok(())
    }

    /// One pass of the fast loop.
    pub async fn signal_cycle(&self, now: DateTime<Utc>) -> TradingResult<()> {
        self.refresh_account(now).await?;
        self.run_kill_switch(now).await;

        let symbol = self.config.trading.symbol.clone();
        match self
            .client
            .candles(&symbol, &self.config.trading.candle_interval, CANDLE_FETCH_LIMIT)
            .await
        {
            Ok(bars) => {
                let mut window = self.window.lock().await;
                for bar in bars {
                    window.push(bar);
                }
            }
            Err(e) => warn!(error = %e, "candle poll failed"),
        }

        let price = self.current_price(&symbol).await;
        if price <= 0.0 {
            warn!("no usable price this cycle");
            return Ok(());
        }
        self.resolve_pending(price, now).await;

        let snapshot = {
            let window = self.window.lock().await;
            if !window.is_warm() {
                debug!(bars = window.len(), "window warming up");
                return Ok(());
            }
            window.snapshot(&symbol, price)?
        };

        let account = self.account().await;
        let open = self.positions.lock().await.len() + self.orders.pending_count().await;
        let paused =
            self.entries_paused.load(Ordering::SeqCst) || self.kill_switch.is_halted();

        let outcome = {
            let mut manager = self.manager.lock().await;
            manager.evaluate(&snapshot, &account, open, paused, now)
        };

        let Some(signal) = outcome.signal else {
            return Ok(());
        };

        self.notifier.send(Event::SignalGenerated {
            strategy: signal.strategy_id,
            symbol: signal.symbol.clone(),
            direction: signal.direction,
            entry: signal.entry_price,
            confidence: signal.confidence,
        });
        self.journal_event("signal", &signal);

        if let Err(reason) = self.risk.validate(&signal, &account, open) {
            warn!(
                strategy = signal.strategy_id,
                %reason,
                "🚫 signal rejected by risk engine"
            );
            self.journal_event(
                "signal_rejected",
                &json!({ "strategy": signal.strategy_id, "reason": reason }),
            );
            self.notifier.send(Event::SignalRejected {
                strategy: signal.strategy_id,
                symbol: signal.symbol.clone(),
                reason,
            });
            return Ok(());
        }

        let lock = self.symbol_lock(&signal.symbol).await;
        let _guard = lock.lock().await;
        match self.orders.submit(&signal).await {
            Ok(handle) => {
                self.journal_event(
                    "entry_submitted",
                    &json!({ "order_id": handle.order_id, "strategy": signal.strategy_id }),
                );
            }
            Err(SubmitError::Halted) => {
                debug!("submission refused, kill switch engaged");
            }
            Err(e) => {
                warn!(error = %e, "entry submission failed");
                self.journal_event(
                    "entry_failed",
                    &json!({ "strategy": signal.strategy_id, "error": e.to_string() }),
                );
            }
        }
        Ok(())
    }

    /// One pass of the slow loop: reconcile with the venue and advance
    /// trailing protection.
    pub async fn monitor_cycle(&self, now: DateTime<Utc>) -> TradingResult<()> {
        self.reconcile_positions(now).await;

        let symbol = self.config.trading.symbol.clone();
        let price = self.current_price(&symbol).await;
        if price <= 0.0 {
            return Ok(());
        }

        let tracked: Vec<Position> = self.positions.lock().await.values().cloned().collect();
        for position in tracked {
            let lock = self.symbol_lock(&position.symbol).await;
            let _guard = lock.lock().await;

            // Re-read under the lock; the position may have closed
            let Some(current) = self.positions.lock().await.get(&position.symbol).cloned()
            else {
                continue;
            };
            let Some(update) = self.trailing.plan(&current, price) else {
                continue;
            };

            match self
                .orders
                .modify(&current, update.new_stop, update.new_target)
                .await
            {
                Ok(()) => {
                    // Commit only after the venue accepted the change
                    let mut positions = self.positions.lock().await;
                    if let Some(p) = positions.get_mut(&current.symbol) {
                        if let Some(stop) = update.new_stop {
                            p.stop_price = stop;
                        }
                        if let Some(target) = update.new_target {
                            p.target_price = target;
                        }
                        let transitioned = p.trailing_stage != update.stage;
                        p.trailing_stage = update.stage;
                        if transitioned {
                            info!(
                                symbol = %p.symbol,
                                stage = %p.trailing_stage,
                                "📈 trailing stage advanced"
                            );
                            self.notifier.send(Event::TrailingTransition {
                                symbol: p.symbol.clone(),
                                stage: p.trailing_stage,
                                stop: update.new_stop,
                                target: update.new_target,
                            });
                        }
                        self.journal_event("trailing_update", &*p);
                    }
                }
                Err(e) => {
                    // Stage stays put; next cycle retries the same plan
                    warn!(symbol = %current.symbol, error = %e, "trailing modify failed");
                }
            }
        }
        Ok(())
    }

    /// Refresh balances and roll the daily baseline at UTC midnight.
    async fn refresh_account(&self, now: DateTime<Utc>) -> TradingResult<()> {
        let balance = self.client.account_balance().await?;
        let mut account = self.account.write().await;
        account.equity = balance.equity;
        account.margin_used = balance.margin_used;
        if balance.equity > account.peak_equity {
            account.peak_equity = balance.equity;
        }

        let today = now.date_naive();
        let mut day = self.day.lock().await;
        if today != *day {
            *day = today;
            account.daily_starting_equity = balance.equity;
            info!(equity = balance.equity, "🌅 daily baseline reset");
            self.journal_event("daily_reset", &json!({ "equity": balance.equity }));
        }
        Ok(())
    }

    async fn run_kill_switch(&self, _now: DateTime<Utc>) {
        if self.kill_switch.is_halted() {
            return;
        }
        let account = self.account().await;
        let action = self.kill_switch.check(&account);

        let mut last = self.last_action.lock().await;
        let changed = *last != action;
        *last = action;
        drop(last);

        match action {
            Action::Continue => {
                self.entries_paused.store(false, Ordering::SeqCst);
            }
            Action::PauseNewEntries => {
                self.entries_paused.store(true, Ordering::SeqCst);
                if changed {
                    self.journal_event("kill_switch", &json!({ "action": action }));
                    self.notifier.send(Event::KillSwitch {
                        action,
                        detail: "loss limit warning band".to_string(),
                    });
                }
            }
            Action::FlattenAll => {
                let detail = format!(
                    "daily loss {:.2}%, drawdown {:.2}%",
                    account.daily_loss_fraction() * 100.0,
                    account.drawdown_fraction() * 100.0
                );
                self.flatten_and_halt(&detail).await;
            }
        }
    }

    /// Engage the halt first so nothing new can go out, then close
    /// everything.
    pub async fn flatten_and_halt(&self, detail: &str) {
        self.kill_switch.engage(detail);
        self.entries_paused.store(true, Ordering::SeqCst);

        let symbols: Vec<String> = self.positions.lock().await.keys().cloned().collect();
        let results = self.orders.flatten_all(&symbols).await;
        let mut positions = self.positions.lock().await;
        for (symbol, result) in results {
            if result.is_ok() {
                positions.remove(&symbol);
            }
        }
        drop(positions);

        self.journal_event(
            "kill_switch",
            &json!({ "action": Action::FlattenAll, "detail": detail }),
        );
        self.notifier.send(Event::KillSwitch {
            action: Action::FlattenAll,
            detail: detail.to_string(),
        });
    }

    /// Resolve pending entries into positions or cancellations.
    async fn resolve_pending(&self, price: f64, now: DateTime<Utc>) {
        for resolution in self.orders.check_pending(price, now).await {
            match resolution {
                PendingResolution::Filled(position) => {
                    self.notifier.send(Event::EntryFilled {
                        symbol: position.symbol.clone(),
                        direction: position.direction,
                        fill_price: position.entry_price,
                        size: position.size,
                    });
                    self.journal_event("fill", &position);
                    self.positions
                        .lock()
                        .await
                        .insert(position.symbol.clone(), position);
                }
                PendingResolution::Cancelled {
                    order_id,
                    strategy_id,
                    reason,
                } => {
                    self.journal_event(
                        "entry_cancelled",
                        &json!({
                            "order_id": order_id,
                            "strategy": strategy_id,
                            "reason": format!("{:?}", reason),
                        }),
                    );
                    self.notifier.send(Event::EntryCancelled {
                        symbol: self.config.trading.symbol.clone(),
                        detail: format!("{:?}", reason),
                    });
                }
            }
        }
    }

    /// Compare local positions against the venue. A tracked position
    /// missing on the venue was closed by its bracket; an unknown one
    /// is adopted for review.
    async fn reconcile_positions(&self, now: DateTime<Utc>) {
        let venue = match self.client.positions().await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "position reconcile failed");
                return;
            }
        };

        let mut positions = self.positions.lock().await;

        let closed: Vec<String> = positions
            .keys()
            .filter(|s| !venue.iter().any(|v| &v.symbol == *s))
            .cloned()
            .collect();
        for symbol in closed {
            if let Some(position) = positions.remove(&symbol) {
                info!(symbol = %symbol, "🏁 position closed on venue");
                self.journal_event("position_closed", &position);
                self.notifier.send(Event::PositionClosed {
                    symbol,
                    detail: "bracket order executed".to_string(),
                });
            }
        }

        for ep in venue {
            if positions.contains_key(&ep.symbol) {
                continue;
            }
            warn!(symbol = %ep.symbol, "untracked position on venue, adopting for review");
            let s = ep.direction.sign();
            let position = Position {
                symbol: ep.symbol.clone(),
                direction: ep.direction,
                entry_price: ep.entry_price,
                size: ep.size,
                leverage: ep.leverage,
                stop_price: ep.entry_price * (1.0 - s * 0.02),
                target_price: ep.entry_price * (1.0 + s * 0.04),
                trailing_stage: TrailingStage::None,
                strategy_id: "adopted",
                opened_at: now,
                needs_review: true,
            };
            self.journal_event("adopted_position", &position);
            positions.insert(ep.symbol, position);
        }
    }

    /// Feed the latest traded price in; called by the websocket bridge.
    pub async fn update_price(&self, price: f64) {
        if price > 0.0 {
            *self.latest_price.write().await = price;
        }
    }

    async fn current_price(&self, symbol: &str) -> f64 {
        let price = *self.latest_price.read().await;
        if price > 0.0 {
            return price;
        }
        match self.client.ticker(symbol).await {
            Ok(p) => {
                *self.latest_price.write().await = p;
                p
            }
            Err(e) => {
                warn!(error = %e, "ticker fallback failed");
                0.0
            }
        }
    }

    /// Graceful shutdown: optionally close everything, always cancel
    /// pending entries.
    pub async fn shutdown(&self) {
        info!("shutting down");
        if self.config.trading.close_positions_on_shutdown {
            let symbols: Vec<String> = self.positions.lock().await.keys().cloned().collect();
            if !symbols.is_empty() {
                info!(count = symbols.len(), "closing open positions before exit");
            }
            let results = self.orders.flatten_all(&symbols).await;
            let mut positions = self.positions.lock().await;
            for (symbol, result) in results {
                if result.is_ok() {
                    positions.remove(&symbol);
                }
            }
        } else {
            // Still cancel unfilled entries so nothing fills unattended
            let _ = self.orders.flatten_all(&[]).await;
        }
        self.journal_event("shutdown", &json!({ "at": Utc::now().to_rfc3339() }));
    }

    /// Run both loops until ctrl-c.
    pub async fn run(self: Arc<Self>) -> TradingResult<()> {
        self.startup(Utc::now()).await?;

        // Price feed task publishes into a watch channel; a bridge task
        // mirrors it into the engine
        let initial = *self.latest_price.read().await;
        let (tx, mut rx) = watch::channel(initial);
        tokio::spawn(okx_ws::run_price_feed(
            self.config.exchange.ws_url.clone(),
            self.config.trading.symbol.clone(),
            tx,
        ));
        let engine = Arc::clone(&self);
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let price = *rx.borrow();
                engine.update_price(price).await;
            }
        });

        let mut signal_tick = tokio::time::interval(std::time::Duration::from_secs(
            self.config.trading.signal_interval_secs,
        ));
        let mut monitor_tick = tokio::time::interval(std::time::Duration::from_secs(
            self.config.trading.monitor_interval_secs,
        ));

        info!(
            symbol = %self.config.trading.symbol,
            "🚀 trading engine started"
        );

        loop {
            tokio::select! {
                _ = signal_tick.tick() => {
                    if let Err(e) = self.signal_cycle(Utc::now()).await {
                        warn!(error = %e, category = e.category(), "signal cycle failed");
                    }
                }
                _ = monitor_tick.tick() => {
                    if let Err(e) = self.monitor_cycle(Utc::now()).await {
                        warn!(error = %e, category = e.category(), "monitor cycle failed");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("received shutdown signal");
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }
}
