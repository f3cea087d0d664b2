// Account-level kill switch and drawdown monitor

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::RiskConfig;
use crate::core::types::AccountState;

/// What the engine must do after a kill-switch check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Continue,
    /// A limit is within its warning band: stop opening, keep managing.
    PauseNewEntries,
    /// A hard limit is breached: close everything and halt.
    FlattenAll,
}

/// Monitors daily loss and drawdown against hard limits. Once a hard
/// limit trips and the switch is engaged, it stays engaged until an
/// operator resets it; a later equity recovery never self-clears it.
pub struct KillSwitch {
    limits: RiskConfig,
    halted: Arc<AtomicBool>,
    reason: Mutex<Option<String>>,
}

impl KillSwitch {
    pub fn new(limits: RiskConfig) -> Self {
        Self {
            limits,
            halted: Arc::new(AtomicBool::new(false)),
            reason: Mutex::new(None),
        }
    }

    /// The halt flag, shared with the order manager so submissions are
    /// refused the instant the switch engages.
    pub fn halted_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.halted)
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub fn halt_reason(&self) -> Option<String> {
        self.reason.lock().ok().and_then(|r| r.clone())
    }

    /// Evaluate the account against both limits. Checking never
    /// mutates the switch; engaging the halt is a separate, explicit
    /// step the engine takes once flattening is underway.
    pub fn check(&self, account: &AccountState) -> Action {
        let daily = account.daily_loss_fraction();
        let drawdown = account.drawdown_fraction();
        let daily_limit = self.limits.max_daily_loss_pct / 100.0;
        let dd_limit = self.limits.max_drawdown_pct / 100.0;

        if daily >= daily_limit {
            error!(
                daily_loss_pct = daily * 100.0,
                limit_pct = self.limits.max_daily_loss_pct,
                "🚨 daily loss limit breached"
            );
            return Action::FlattenAll;
        }
        if drawdown >= dd_limit {
            error!(
                drawdown_pct = drawdown * 100.0,
                limit_pct = self.limits.max_drawdown_pct,
                "🚨 drawdown limit breached"
            );
            return Action::FlattenAll;
        }

        let w = self.limits.warning_fraction;
        if daily >= w * daily_limit || drawdown >= w * dd_limit {
            warn!(
                daily_loss_pct = daily * 100.0,
                drawdown_pct = drawdown * 100.0,
                "⚠️ approaching a loss limit, pausing new entries"
            );
            return Action::PauseNewEntries;
        }

        Action::Continue
    }

    /// Latch the halt. Idempotent; the first reason sticks.
    pub fn engage(&self, reason: &str) {
        if self.halted.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut r) = self.reason.lock() {
            *r = Some(reason.to_string());
        }
        error!(reason, "🛑 kill switch engaged, trading halted");
    }

    /// Operator-initiated reset. Nothing in the trading loops calls
    /// this.
    pub fn reset(&self) {
        self.halted.store(false, Ordering::SeqCst);
        if let Ok(mut r) = self.reason.lock() {
            *r = None;
        }
        info!("kill switch reset by operator");
    }
}
