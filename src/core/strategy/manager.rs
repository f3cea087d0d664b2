// Strategy registry and signal resolution

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::config::{Config, ResolutionPolicy};
use crate::core::snapshot::MarketSnapshot;
use crate::core::strategy::breakout::BreakoutStrategy;
use crate::core::strategy::mean_reversion::MeanReversionStrategy;
use crate::core::strategy::scalping::ScalpingStrategy;
use crate::core::strategy::swing::SwingStrategy;
use crate::core::strategy::volume_spike::VolumeSpikeStrategy;
use crate::core::strategy::Evaluator;
use crate::core::types::{AccountState, Signal};

/// One registered strategy. Enablement, priority and cooldown live
/// here so adding a strategy is a registry entry plus an evaluator,
/// with no change to the resolution loop.
pub struct StrategyEntry {
    pub id: &'static str,
    pub enabled: bool,
    pub priority: u32,
    pub cooldown: Duration,
    pub last_fired: Option<DateTime<Utc>>,
    evaluator: Box<dyn Evaluator>,
}

impl StrategyEntry {
    fn cooling_down(&self, now: DateTime<Utc>) -> bool {
        match self.last_fired {
            Some(t) => now - t < self.cooldown,
            None => false,
        }
    }
}

/// Result of one evaluation cycle, for journaling.
#[derive(Debug, Clone)]
pub struct StrategyOutcome {
    pub signal: Option<Signal>,
    /// Ids of strategies that emitted a candidate this cycle,
    /// including the winner.
    pub fired: Vec<&'static str>,
}

impl StrategyOutcome {
    fn quiet() -> Self {
        Self {
            signal: None,
            fired: Vec::new(),
        }
    }
}

pub struct StrategyManager {
    entries: Vec<StrategyEntry>,
    policy: ResolutionPolicy,
}

impl StrategyManager {
    /// Build the registry from configuration, in registration order.
    pub fn from_config(config: &Config) -> Self {
        let mut entries: Vec<StrategyEntry> = Vec::new();
        for (id, toggle) in config.strategy_toggles() {
            let evaluator: Box<dyn Evaluator> = match id {
                "swing" => Box::new(SwingStrategy::new(toggle)),
                "scalping" => Box::new(ScalpingStrategy::new(toggle)),
                "breakout" => Box::new(BreakoutStrategy::new(toggle)),
                "volume_spike" => Box::new(VolumeSpikeStrategy::new(toggle)),
                "mean_reversion" => Box::new(MeanReversionStrategy::new(toggle)),
                other => {
                    warn!("unknown strategy id '{}' skipped", other);
                    continue;
                }
            };
            entries.push(StrategyEntry {
                id,
                enabled: toggle.enabled,
                priority: toggle.priority,
                cooldown: Duration::seconds(toggle.cooldown_secs as i64),
                last_fired: None,
                evaluator,
            });
        }
        Self {
            entries,
            policy: config.trading.resolution_policy,
        }
    }

    #[cfg(test)]
    pub fn with_entries(entries: Vec<StrategyEntry>, policy: ResolutionPolicy) -> Self {
        Self { entries, policy }
    }

    #[cfg(test)]
    pub fn register(
        &mut self,
        id: &'static str,
        priority: u32,
        cooldown_secs: i64,
        evaluator: Box<dyn Evaluator>,
    ) {
        self.entries.push(StrategyEntry {
            id,
            enabled: true,
            priority,
            cooldown: Duration::seconds(cooldown_secs),
            last_fired: None,
            evaluator,
        });
    }

    /// Run one evaluation cycle and resolve at most one signal.
    ///
    /// Returns quietly when a position is already open or entries are
    /// paused. An evaluator error is logged and skipped without
    /// affecting the other strategies. A strategy that emitted a
    /// candidate goes on cooldown whether or not it won resolution.
    pub fn evaluate(
        &mut self,
        snapshot: &MarketSnapshot,
        account: &AccountState,
        open_positions: usize,
        entries_paused: bool,
        now: DateTime<Utc>,
    ) -> StrategyOutcome {
        if open_positions > 0 {
            debug!("skipping signal evaluation: position already open");
            return StrategyOutcome::quiet();
        }
        if entries_paused {
            debug!("skipping signal evaluation: new entries paused");
            return StrategyOutcome::quiet();
        }

        let mut order: Vec<usize> = (0..self.entries.len())
            .filter(|&i| self.entries[i].enabled)
            .collect();
        if self.policy == ResolutionPolicy::Priority {
            // Stable sort keeps registration order as the tie-break
            order.sort_by_key(|&i| self.entries[i].priority);
        }

        let mut fired = Vec::new();
        let mut winner: Option<Signal> = None;

        for i in order {
            let entry = &mut self.entries[i];
            if entry.cooling_down(now) {
                continue;
            }
            match entry.evaluator.evaluate(snapshot, account, now) {
                Ok(Some(signal)) => {
                    debug!(
                        strategy = entry.id,
                        direction = %signal.direction,
                        confidence = signal.confidence,
                        "strategy fired"
                    );
                    entry.last_fired = Some(now);
                    fired.push(entry.id);
                    if winner.is_none() {
                        winner = Some(signal);
                        if self.policy == ResolutionPolicy::FirstMatch {
                            break;
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(strategy = entry.id, error = %e, "strategy evaluation failed");
                }
            }
        }

        StrategyOutcome {
            signal: winner,
            fired,
        }
    }
}
