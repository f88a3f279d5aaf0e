use chrono::{DateTime, Utc};
use core_types::{BotState, ExitReason, SignalAction};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One structured line per bot cycle (spec §4.6 "Observability"):
/// state before/after, signal, confidence, price, balances, order id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub bot_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub state_before: BotState,
    pub state_after: BotState,
    pub signal: Option<SignalAction>,
    pub confidence: Option<Decimal>,
    pub price: Option<Decimal>,
    pub available_quote: Option<Decimal>,
    pub order_id: Option<Uuid>,
}

/// Emitted whenever a bot's `BotState` changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub bot_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub from: BotState,
    pub to: BotState,
    pub reason: String,
}

/// Emitted when a position exits (spec P4: reason is always one of the
/// closed enum of `ExitReason`s).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitEvent {
    pub bot_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub reason: ExitReason,
    pub realized_pnl: Decimal,
}

/// Emitted by the supervisor when a trading loop exits non-cleanly
/// (spec §4.7.3: no auto-restart).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashEvent {
    pub bot_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub last_error: String,
}

/// Emitted by the supervisor on HALT (auth failure, delisted symbol,
/// operator command, corrupt snapshot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaltEvent {
    pub bot_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub last_error: String,
}

/// Emitted when the supervisor auto-adopts an orphaned exchange balance
/// (spec §4.7.4) as a new stopped bot config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrphanAdoptedEvent {
    pub bot_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub estimated_value: Decimal,
}

/// The top-level broadcast message every long-running task publishes
/// onto the shared `tokio::sync::broadcast` channel. The dashboard and
/// the notifier are both independent subscribers of the same stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum BotEvent {
    Cycle(CycleSummary),
    StateTransition(StateTransition),
    Exit(ExitEvent),
    Crash(CrashEvent),
    Halt(HaltEvent),
    OrphanAdopted(OrphanAdoptedEvent),
}

impl BotEvent {
    pub fn bot_id(&self) -> Uuid {
        match self {
            BotEvent::Cycle(e) => e.bot_id,
            BotEvent::StateTransition(e) => e.bot_id,
            BotEvent::Exit(e) => e.bot_id,
            BotEvent::Crash(e) => e.bot_id,
            BotEvent::Halt(e) => e.bot_id,
            BotEvent::OrphanAdopted(e) => e.bot_id,
        }
    }

    /// Whether this event is important enough to forward to the
    /// notifier's egress (HALT/crash — spec §7: "anything touching
    /// order flow is surfaced, never silently retried").
    pub fn is_critical(&self) -> bool {
        matches!(self, BotEvent::Crash(_) | BotEvent::Halt(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn bot_id_dispatches_across_every_variant() {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let events = vec![
            BotEvent::Cycle(CycleSummary {
                bot_id: id,
                timestamp: now,
                state_before: BotState::Flat,
                state_after: BotState::Long,
                signal: Some(SignalAction::Buy),
                confidence: Some(dec!(0.8)),
                price: Some(dec!(100)),
                available_quote: Some(dec!(50)),
                order_id: None,
            }),
            BotEvent::StateTransition(StateTransition { bot_id: id, timestamp: now, from: BotState::Flat, to: BotState::Long, reason: "buy".into() }),
            BotEvent::Exit(ExitEvent { bot_id: id, timestamp: now, reason: ExitReason::StopLoss, realized_pnl: dec!(-3) }),
            BotEvent::Crash(CrashEvent { bot_id: id, timestamp: now, last_error: "panic".into() }),
            BotEvent::Halt(HaltEvent { bot_id: id, timestamp: now, last_error: "auth".into() }),
            BotEvent::OrphanAdopted(OrphanAdoptedEvent { bot_id: id, timestamp: now, symbol: "BTCUSDT".into(), estimated_value: dec!(100) }),
        ];
        for event in &events {
            assert_eq!(event.bot_id(), id);
        }
    }

    #[test]
    fn only_crash_and_halt_are_critical() {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let crash = BotEvent::Crash(CrashEvent { bot_id: id, timestamp: now, last_error: "x".into() });
        let halt = BotEvent::Halt(HaltEvent { bot_id: id, timestamp: now, last_error: "x".into() });
        let cycle = BotEvent::Cycle(CycleSummary {
            bot_id: id,
            timestamp: now,
            state_before: BotState::Flat,
            state_after: BotState::Flat,
            signal: None,
            confidence: None,
            price: None,
            available_quote: None,
            order_id: None,
        });
        assert!(crash.is_critical());
        assert!(halt.is_critical());
        assert!(!cycle.is_critical());
    }

    #[test]
    fn tagged_enum_round_trips_through_json() {
        let event = BotEvent::Halt(HaltEvent { bot_id: Uuid::new_v4(), timestamp: Utc::now(), last_error: "bad credentials".into() });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Halt\""));
        let round_tripped: BotEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(round_tripped, event);
    }
}
