// Configuration management with TOML files and validation

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// How the strategy manager resolves multiple candidate signals in one
/// evaluation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// First enabled strategy (in registration order) that fires wins.
    FirstMatch,
    /// All enabled strategies are evaluated; lowest priority value wins.
    Priority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub rest_url: String,
    pub ws_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: String,
    /// Route orders to the exchange demo environment.
    pub simulated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Instrument to trade, e.g. "SOL-USDT-SWAP".
    pub symbol: String,
    /// Candle interval used for the signal window.
    pub candle_interval: String,
    pub signal_interval_secs: u64,
    pub monitor_interval_secs: u64,
    /// Unfilled entry orders older than this are cancelled.
    pub order_timeout_secs: u64,
    /// Cancel a pending entry when price has moved this far (percent)
    /// from the requested entry price.
    pub entry_divergence_pct: f64,
    pub resolution_policy: ResolutionPolicy,
    /// Market-close all open positions on graceful shutdown.
    pub close_positions_on_shutdown: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskConfig {
    pub max_leverage: f64,
    /// Max position notional as a percent of equity.
    pub max_position_pct: f64,
    pub max_concurrent_positions: usize,
    /// Daily loss limit as a percent of daily starting equity.
    pub max_daily_loss_pct: f64,
    /// Drawdown limit as a percent of peak equity.
    pub max_drawdown_pct: f64,
    /// Fraction of a limit at which the kill switch pauses new entries.
    pub warning_fraction: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrailingConfig {
    /// Leveraged PnL percent that locks the stop at breakeven.
    pub t1_pnl_pct: f64,
    /// Leveraged PnL percent that tightens the take-profit.
    pub t2_pnl_pct: f64,
    /// Leveraged PnL percent that starts the aggressive trail.
    pub t3_pnl_pct: f64,
    /// Stop offset beyond entry once breakeven locks (price percent).
    pub breakeven_buffer_pct: f64,
    /// Tightened take-profit distance from entry (price percent).
    pub tp_tighten_pct: f64,
    /// Aggressive-trail target distance from current price (price percent).
    pub trail_offset_pct: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StrategyToggle {
    pub enabled: bool,
    /// Lower value = higher priority under the priority policy.
    pub priority: u32,
    pub cooldown_secs: u64,
    /// Position notional opened by this strategy, percent of equity
    /// before leverage.
    pub position_size_pct: f64,
    pub leverage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategiesConfig {
    pub swing: StrategyToggle,
    pub scalping: StrategyToggle,
    pub breakout: StrategyToggle,
    pub mean_reversion: StrategyToggle,
    pub volume_spike: StrategyToggle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Optional webhook receiving JSON event payloads.
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub trading: TradingConfig,
    pub risk: RiskConfig,
    pub trailing: TrailingConfig,
    pub strategies: StrategiesConfig,
    pub notify: NotifyConfig,
    pub journal: JournalConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exchange: ExchangeConfig {
                rest_url: "https://www.okx.com".to_string(),
                ws_url: "wss://ws.okx.com:8443/ws/v5/public".to_string(),
                api_key: String::new(),
                api_secret: String::new(),
                passphrase: String::new(),
                simulated: true,
            },
            trading: TradingConfig {
                symbol: "SOL-USDT-SWAP".to_string(),
                candle_interval: "1m".to_string(),
                signal_interval_secs: 1,
                monitor_interval_secs: 3,
                order_timeout_secs: 30,
                entry_divergence_pct: 0.5,
                resolution_policy: ResolutionPolicy::FirstMatch,
                close_positions_on_shutdown: true,
            },
            risk: RiskConfig {
                max_leverage: 10.0,
                max_position_pct: 20.0,
                max_concurrent_positions: 1,
                max_daily_loss_pct: 5.0,
                max_drawdown_pct: 15.0,
                warning_fraction: 0.8,
            },
            trailing: TrailingConfig {
                t1_pnl_pct: 7.0,
                t2_pnl_pct: 10.0,
                t3_pnl_pct: 12.0,
                breakeven_buffer_pct: 0.5,
                tp_tighten_pct: 2.4,
                trail_offset_pct: 0.4,
            },
            strategies: StrategiesConfig {
                swing: StrategyToggle {
                    enabled: true,
                    priority: 1,
                    cooldown_secs: 300,
                    position_size_pct: 10.0,
                    leverage: 5.0,
                },
                scalping: StrategyToggle {
                    enabled: true,
                    priority: 2,
                    cooldown_secs: 60,
                    position_size_pct: 10.0,
                    leverage: 5.0,
                },
                breakout: StrategyToggle {
                    enabled: true,
                    priority: 3,
                    cooldown_secs: 30,
                    position_size_pct: 10.0,
                    leverage: 5.0,
                },
                volume_spike: StrategyToggle {
                    enabled: true,
                    priority: 4,
                    cooldown_secs: 30,
                    position_size_pct: 10.0,
                    leverage: 5.0,
                },
                mean_reversion: StrategyToggle {
                    enabled: false,
                    priority: 5,
                    cooldown_secs: 30,
                    position_size_pct: 10.0,
                    leverage: 5.0,
                },
            },
            notify: NotifyConfig { webhook_url: None },
            journal: JournalConfig {
                path: "journal.db".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, validating before use.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, writing the defaults out if the file is
    /// missing so the operator has a template to edit.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            let config = Config::default();
            config.save(path)?;
            info!("📝 Created default configuration at {}", path.display());
            Ok(config)
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trading.symbol.is_empty() {
            return Err(ConfigError::Validation("symbol must not be empty".into()));
        }
        if self.trading.signal_interval_secs == 0 || self.trading.monitor_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "loop intervals must be positive".into(),
            ));
        }
        if self.trading.order_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "order_timeout_secs must be positive".into(),
            ));
        }
        if self.trading.entry_divergence_pct <= 0.0 {
            return Err(ConfigError::Validation(
                "entry_divergence_pct must be positive".into(),
            ));
        }
        if self.risk.max_leverage <= 0.0 {
            return Err(ConfigError::Validation(
                "max_leverage must be positive".into(),
            ));
        }
        if self.risk.max_position_pct <= 0.0 || self.risk.max_position_pct > 100.0 {
            return Err(ConfigError::Validation(
                "max_position_pct must be in (0, 100]".into(),
            ));
        }
        if self.risk.max_concurrent_positions == 0 {
            return Err(ConfigError::Validation(
                "max_concurrent_positions must be at least 1".into(),
            ));
        }
        if self.risk.max_daily_loss_pct <= 0.0 || self.risk.max_drawdown_pct <= 0.0 {
            return Err(ConfigError::Validation(
                "loss limits must be positive".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.risk.warning_fraction) {
            return Err(ConfigError::Validation(
                "warning_fraction must be in [0, 1)".into(),
            ));
        }
        if !(self.trailing.t1_pnl_pct < self.trailing.t2_pnl_pct
            && self.trailing.t2_pnl_pct < self.trailing.t3_pnl_pct)
        {
            return Err(ConfigError::Validation(
                "trailing thresholds must be strictly increasing (t1 < t2 < t3)".into(),
            ));
        }
        if self.trailing.t1_pnl_pct <= 0.0 {
            return Err(ConfigError::Validation(
                "t1_pnl_pct must be positive".into(),
            ));
        }
        if self.trailing.breakeven_buffer_pct < 0.0
            || self.trailing.tp_tighten_pct <= 0.0
            || self.trailing.trail_offset_pct <= 0.0
        {
            return Err(ConfigError::Validation(
                "trailing offsets must be positive".into(),
            ));
        }
        for (name, s) in self.strategy_toggles() {
            if s.position_size_pct <= 0.0 || s.position_size_pct > 100.0 {
                return Err(ConfigError::Validation(format!(
                    "{}: position_size_pct must be in (0, 100]",
                    name
                )));
            }
            if s.leverage <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "{}: leverage must be positive",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Strategy toggles in registration order (the order first-match
    /// resolution walks them).
    pub fn strategy_toggles(&self) -> Vec<(&'static str, StrategyToggle)> {
        vec![
            ("swing", self.strategies.swing),
            ("scalping", self.strategies.scalping),
            ("breakout", self.strategies.breakout),
            ("volume_spike", self.strategies.volume_spike),
            ("mean_reversion", self.strategies.mean_reversion),
        ]
    }
}
