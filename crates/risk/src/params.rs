use crate::error::RiskError;
use chrono::Duration;
use configuration::RiskDefaults;
use core_types::{RiskLevel, Sentiment, Signal, Urgency};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// The risk parameters in force for one upcoming action (spec §4.4).
/// Computed fresh from `RiskDefaults` each cycle, then perturbed by
/// `apply_dynamic_adjustment` — never persisted back into the bot's
/// stored defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskParams {
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
    pub min_confidence: Decimal,
    pub max_hold: Duration,
    /// Whether add-to-position resets `max_hold_until` for the combined
    /// position (spec §9 open question, resolved in DESIGN.md).
    pub reset_hold_on_add: bool,
}

impl RiskParams {
    pub fn from_defaults(defaults: &RiskDefaults) -> Result<Self, RiskError> {
        if defaults.stop_loss_pct <= Decimal::ZERO || defaults.stop_loss_pct >= Decimal::ONE {
            return Err(RiskError::InvalidParameters(
                "stop_loss_pct must be between 0 and 1".to_string(),
            ));
        }
        if defaults.take_profit_pct <= Decimal::ZERO {
            return Err(RiskError::InvalidParameters(
                "take_profit_pct must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            stop_loss_pct: defaults.stop_loss_pct,
            take_profit_pct: defaults.take_profit_pct,
            min_confidence: defaults.min_confidence,
            max_hold: Duration::hours(defaults.max_hold_hours),
            reset_hold_on_add: defaults.reset_hold_on_add,
        })
    }

    /// Applies the spec §4.4 dynamic risk-adjustment table to these
    /// defaults, for the action this `signal` is about to drive. The
    /// result is scoped to the single upcoming action; callers must
    /// recompute from defaults every cycle rather than carrying this
    /// forward.
    pub fn apply_dynamic_adjustment(&self, signal: &Signal) -> Self {
        let mut adjusted = *self;

        match signal.risk_level {
            RiskLevel::High => {
                adjusted.stop_loss_pct = dec!(0.02);
                adjusted.take_profit_pct = dec!(0.03);
            }
            RiskLevel::Low => {
                adjusted.stop_loss_pct = dec!(0.04);
                adjusted.take_profit_pct = dec!(0.08);
            }
            RiskLevel::Medium => {}
        }

        match signal.urgency {
            Urgency::Immediate => adjusted.min_confidence = adjusted.min_confidence.min(dec!(0.50)),
            Urgency::High => adjusted.min_confidence = adjusted.min_confidence.min(dec!(0.65)),
            Urgency::Moderate => {}
        }

        if signal.sentiment == Sentiment::VeryBullish && signal.confidence >= dec!(0.85) {
            adjusted.max_hold = Duration::hours(48);
        } else if signal.sentiment == Sentiment::VeryBearish && signal.confidence >= dec!(0.75) {
            adjusted.max_hold = Duration::hours(12);
        }

        adjusted
    }

    /// Stop-loss price for a LONG entry at `entry_price` (spec invariant
    /// P3: `stop_loss_price < entry_price < take_profit_price`).
    pub fn stop_loss_price(&self, entry_price: Decimal) -> Result<Decimal, RiskError> {
        if entry_price <= Decimal::ZERO {
            return Err(RiskError::InvalidEntryPrice(entry_price));
        }
        Ok(entry_price * (Decimal::ONE - self.stop_loss_pct))
    }

    pub fn take_profit_price(&self, entry_price: Decimal) -> Result<Decimal, RiskError> {
        if entry_price <= Decimal::ZERO {
            return Err(RiskError::InvalidEntryPrice(entry_price));
        }
        Ok(entry_price * (Decimal::ONE + self.take_profit_pct))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::SignalAction;
    use uuid::Uuid;

    fn defaults() -> RiskDefaults {
        RiskDefaults {
            stop_loss_pct: dec!(0.03),
            take_profit_pct: dec!(0.05),
            min_confidence: dec!(0.70),
            max_hold_hours: 24,
            check_interval_secs: 900,
            reset_hold_on_add: true,
        }
    }

    fn signal(risk_level: RiskLevel, urgency: Urgency, sentiment: Sentiment, confidence: Decimal) -> Signal {
        Signal {
            signal_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action: SignalAction::Buy,
            confidence,
            sentiment,
            urgency,
            risk_level,
            reasoning: "test".to_string(),
            symbol_hint: None,
            source_article_ids: Vec::new(),
        }
    }

    #[test]
    fn high_risk_tightens_stops() {
        let base = RiskParams::from_defaults(&defaults()).unwrap();
        let sig = signal(RiskLevel::High, Urgency::Moderate, Sentiment::Neutral, dec!(0.80));
        let adjusted = base.apply_dynamic_adjustment(&sig);
        assert_eq!(adjusted.stop_loss_pct, dec!(0.02));
        assert_eq!(adjusted.take_profit_pct, dec!(0.03));
    }

    #[test]
    fn immediate_urgency_lowers_gate() {
        let base = RiskParams::from_defaults(&defaults()).unwrap();
        let sig = signal(RiskLevel::Low, Urgency::Immediate, Sentiment::VeryBullish, dec!(0.85));
        let adjusted = base.apply_dynamic_adjustment(&sig);
        assert_eq!(adjusted.min_confidence, dec!(0.50));
        assert_eq!(adjusted.max_hold, Duration::hours(48));
    }

    #[test]
    fn bearish_high_confidence_compresses_hold() {
        let base = RiskParams::from_defaults(&defaults()).unwrap();
        let sig = signal(RiskLevel::Medium, Urgency::Moderate, Sentiment::VeryBearish, dec!(0.90));
        let adjusted = base.apply_dynamic_adjustment(&sig);
        assert_eq!(adjusted.max_hold, Duration::hours(12));
    }

    #[test]
    fn stop_loss_below_entry_below_take_profit() {
        let params = RiskParams::from_defaults(&defaults()).unwrap();
        let entry = dec!(60_000);
        let sl = params.stop_loss_price(entry).unwrap();
        let tp = params.take_profit_price(entry).unwrap();
        assert!(sl < entry);
        assert!(entry < tp);
    }
}
