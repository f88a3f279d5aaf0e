use crate::context::{StrategyContext, SymbolMode};
use crate::error::StrategyError;
use crate::{Strategy, StrategyOutcome};
use async_trait::async_trait;
use chrono::Utc;
use core_types::{RiskLevel, Sentiment, Signal, SignalAction, Urgency};
use indicators::{adx, atr, bollinger, macd, rsi, volume_ratio};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

const MIN_HISTORY: usize = 35;

/// Multi-indicator weighted score over RSI, MACD, Bollinger bands,
/// ADX trend strength, and volume confirmation. Stops are computed
/// from ATR rather than a fixed percentage, and position size scales
/// down as ATR (volatility) rises.
pub struct TechnicalStrategy;

impl TechnicalStrategy {
    pub fn new() -> Self {
        Self
    }

    /// Returns the composite score in `[0, 100]` (50 = neutral) and a
    /// short human-readable rationale.
    fn score(klines: &[core_types::Kline]) -> Result<(Decimal, String), StrategyError> {
        if klines.len() < MIN_HISTORY {
            return Err(StrategyError::InsufficientData(format!(
                "need at least {MIN_HISTORY} klines, got {}",
                klines.len()
            )));
        }

        let closes: Vec<Decimal> = klines.iter().map(|k| k.close).collect();
        let last = closes.len() - 1;
        let close = closes[last];

        let rsi_values = rsi(&closes, 14);
        let macd_values = macd(&closes);
        let bands = bollinger(&closes, 20);
        let adx_values = adx(klines, 14);
        let vol_ratio = volume_ratio(klines, 20);

        let mut raw = Decimal::ZERO;
        let mut notes = Vec::new();

        if let Some(r) = rsi_values[last] {
            if r < dec!(30) {
                raw += dec!(25);
                notes.push(format!("RSI {r:.1} oversold"));
            } else if r > dec!(70) {
                raw -= dec!(25);
                notes.push(format!("RSI {r:.1} overbought"));
            }
        }

        if let Some(hist) = macd_values.histogram[last] {
            if hist > Decimal::ZERO {
                raw += dec!(25);
                notes.push("MACD histogram positive".to_string());
            } else if hist < Decimal::ZERO {
                raw -= dec!(25);
                notes.push("MACD histogram negative".to_string());
            }
        }

        if let Some(lower) = bands.lower[last] {
            if close < lower {
                raw += dec!(20);
                notes.push("close below lower Bollinger band".to_string());
            }
        }
        if let Some(upper) = bands.upper[last] {
            if close > upper {
                raw -= dec!(20);
                notes.push("close above upper Bollinger band".to_string());
            }
        }

        if let Some(trend) = adx_values[last] {
            if trend > dec!(25) && raw != Decimal::ZERO {
                raw *= dec!(1.15);
                notes.push(format!("ADX {trend:.1} confirms trend"));
            }
        }

        if let Some(vr) = vol_ratio[last] {
            if vr > dec!(1.2) {
                if raw > Decimal::ZERO {
                    raw += dec!(10);
                } else if raw < Decimal::ZERO {
                    raw -= dec!(10);
                }
                notes.push(format!("volume ratio {vr:.2} confirms"));
            }
        }

        let score = (dec!(50) + raw).clamp(Decimal::ZERO, dec!(100));
        let rationale = if notes.is_empty() {
            "no indicator deviation from neutral".to_string()
        } else {
            notes.join("; ")
        };
        Ok((score, rationale))
    }

    /// ATR as a fraction of the current close, and the dynamic
    /// position-size fraction banded against it (spec §4.4).
    fn atr_band(klines: &[core_types::Kline]) -> (Decimal, Decimal) {
        let closes_len = klines.len();
        let atr_values = atr(klines, 14);
        let last_atr = atr_values.last().copied().flatten().unwrap_or(Decimal::ZERO);
        let close = klines[closes_len - 1].close;
        if close.is_zero() {
            return (Decimal::ZERO, dec!(1.0));
        }
        let atr_pct = last_atr / close * dec!(100);
        let fraction = if atr_pct < dec!(1.5) {
            dec!(1.0)
        } else if atr_pct < dec!(2.5) {
            dec!(0.75)
        } else if atr_pct < dec!(4.0) {
            dec!(0.5)
        } else {
            dec!(0.3)
        };
        (last_atr, fraction)
    }
}

impl Default for TechnicalStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Strategy for TechnicalStrategy {
    fn symbol_mode(&self) -> SymbolMode {
        SymbolMode::Fixed
    }

    async fn analyse(&self, ctx: &StrategyContext<'_>) -> Result<StrategyOutcome, StrategyError> {
        let (score, rationale) = Self::score(ctx.klines)?;
        let (last_atr, size_fraction) = Self::atr_band(ctx.klines);

        let action = if score > dec!(50) {
            SignalAction::Buy
        } else if score < dec!(50) {
            SignalAction::Sell
        } else {
            SignalAction::Hold
        };
        let confidence = ((score - dec!(50)).abs() / dec!(50)).clamp(Decimal::ZERO, Decimal::ONE);

        let signal = Signal {
            signal_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action,
            confidence,
            sentiment: Sentiment::Neutral,
            urgency: Urgency::Moderate,
            risk_level: RiskLevel::Medium,
            reasoning: format!("technical score {score:.1}/100: {rationale}"),
            symbol_hint: None,
            source_article_ids: Vec::new(),
        };

        let has_stops = action != SignalAction::Hold && last_atr > Decimal::ZERO;
        Ok(StrategyOutcome {
            signal,
            position_size_fraction: size_fraction,
            stop_loss_distance_override: has_stops.then_some(last_atr * dec!(2)),
            take_profit_distance_override: has_stops.then_some(last_atr * dec!(4)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use core_types::{AccountSnapshot, BotState, Kline};

    fn kline_at(i: i64, close: Decimal, high: Decimal, low: Decimal, volume: Decimal) -> Kline {
        let t = Utc.timestamp_opt(1_700_000_000 + i * 900, 0).unwrap();
        Kline {
            open_time: t,
            open: close,
            high,
            low,
            close,
            volume,
            close_time: t,
            interval: "15m".to_string(),
        }
    }

    fn flat_klines(n: usize, base: Decimal) -> Vec<Kline> {
        (0..n as i64)
            .map(|i| kline_at(i, base, base + dec!(10), base - dec!(10), dec!(100)))
            .collect()
    }

    #[tokio::test]
    async fn insufficient_history_errors() {
        let klines = flat_klines(5, dec!(60_000));
        let account = AccountSnapshot {
            bot_id: uuid::Uuid::new_v4(),
            state: BotState::Flat,
            usdt_allocated: dec!(100),
            usdt_free: dec!(100),
            position: None,
            unrealized_pnl: None,
            last_cycle_at: None,
        };
        let ctx = StrategyContext {
            symbol: "BTCUSDT",
            klines: &klines,
            position: None,
            account: &account,
            news: &[],
        };
        let strategy = TechnicalStrategy::new();
        let result = strategy.analyse(&ctx).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn flat_market_holds_with_full_size_fraction() {
        let klines = flat_klines(40, dec!(60_000));
        let account = AccountSnapshot {
            bot_id: uuid::Uuid::new_v4(),
            state: BotState::Flat,
            usdt_allocated: dec!(100),
            usdt_free: dec!(100),
            position: None,
            unrealized_pnl: None,
            last_cycle_at: None,
        };
        let ctx = StrategyContext {
            symbol: "BTCUSDT",
            klines: &klines,
            position: None,
            account: &account,
            news: &[],
        };
        let strategy = TechnicalStrategy::new();
        let outcome = strategy.analyse(&ctx).await.unwrap();
        assert_eq!(outcome.signal.action, SignalAction::Hold);
        assert_eq!(outcome.position_size_fraction, dec!(1.0));
    }
}
