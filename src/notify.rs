// Outbound event notifications (webhook, fire-and-forget)

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::core::kill_switch::Action;
use crate::core::risk::RejectReason;
use crate::core::types::{Direction, TrailingStage};

/// Operator-facing events. Delivery is best-effort: a down webhook
/// never slows a trading loop.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    SignalGenerated {
        strategy: &'static str,
        symbol: String,
        direction: Direction,
        entry: f64,
        confidence: f64,
    },
    SignalRejected {
        strategy: &'static str,
        symbol: String,
        reason: RejectReason,
    },
    EntryFilled {
        symbol: String,
        direction: Direction,
        fill_price: f64,
        size: f64,
    },
    EntryCancelled {
        symbol: String,
        detail: String,
    },
    PositionClosed {
        symbol: String,
        detail: String,
    },
    TrailingTransition {
        symbol: String,
        stage: TrailingStage,
        stop: Option<f64>,
        target: Option<f64>,
    },
    KillSwitch {
        action: Action,
        detail: String,
    },
}

#[derive(Clone)]
pub struct Notifier {
    tx: Option<mpsc::UnboundedSender<Event>>,
}

impl Notifier {
    /// Spawns a forwarding task when a webhook is configured;
    /// otherwise events are dropped silently.
    pub fn new(webhook_url: Option<String>) -> Self {
        let Some(url) = webhook_url else {
            return Self { tx: None };
        };
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        tokio::spawn(async move {
            let client = reqwest::Client::new();
            while let Some(event) = rx.recv().await {
                match client.post(&url).json(&event).send().await {
                    Ok(resp) if !resp.status().is_success() => {
                        warn!(status = %resp.status(), "webhook returned error status");
                    }
                    Err(e) => warn!(error = %e, "webhook delivery failed"),
                    _ => {}
                }
            }
        });
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn send(&self, event: Event) {
        debug!(?event, "notify");
        if let Some(tx) = &self.tx {
            // Receiver gone means shutdown is underway; nothing to do
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_payload_shape() {
        let event = Event::SignalRejected {
            strategy: "scalping",
            symbol: "SOL-USDT-SWAP".to_string(),
            reason: RejectReason::PositionTooLarge,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "signal_rejected");
        assert_eq!(json["reason"], "position_too_large");
    }

    #[test]
    fn test_disabled_notifier_accepts_events() {
        let n = Notifier::disabled();
        n.send(Event::EntryCancelled {
            symbol: "SOL-USDT-SWAP".to_string(),
            detail: "timeout".to_string(),
        });
    }
}
