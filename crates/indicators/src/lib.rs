//! Pure, deterministic indicator functions over ordered price sequences.
//!
//! Every function returns a `Vec<Option<Decimal>>` the same length as its
//! input; `None` stands in for the warm-up period (`Decimal` has no NaN).

use core_types::Kline;
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

/// Simple moving average. `None` until `period` samples have accumulated.
pub fn sma(values: &[Decimal], period: usize) -> Vec<Option<Decimal>> {
    let mut out = Vec::with_capacity(values.len());
    let mut sum = Decimal::ZERO;
    for (i, &v) in values.iter().enumerate() {
        sum += v;
        if i >= period {
            sum -= values[i - period];
        }
        if i + 1 >= period {
            out.push(Some(sum / Decimal::from(period as u64)));
        } else {
            out.push(None);
        }
    }
    out
}

/// Exponential moving average, α = 2/(n+1), seeded with the SMA of the
/// first `period` samples (spec semantics — not EMA(first value)=first
/// value, which would bias early-sequence readings).
pub fn ema(values: &[Decimal], period: usize) -> Vec<Option<Decimal>> {
    let mut out = vec![None; values.len()];
    if values.len() < period {
        return out;
    }
    let alpha = Decimal::from(2u64) / Decimal::from(period as u64 + 1);
    let seed: Decimal = values[..period].iter().sum::<Decimal>() / Decimal::from(period as u64);
    out[period - 1] = Some(seed);
    let mut prev = seed;
    for (i, &v) in values.iter().enumerate().skip(period) {
        let next = (v - prev) * alpha + prev;
        out[i] = Some(next);
        prev = next;
    }
    out
}

/// Relative Strength Index, Wilder's smoothing, default period 14.
pub fn rsi(closes: &[Decimal], period: usize) -> Vec<Option<Decimal>> {
    let mut out = vec![None; closes.len()];
    if closes.len() <= period {
        return out;
    }

    let mut gain_sum = Decimal::ZERO;
    let mut loss_sum = Decimal::ZERO;
    for i in 1..=period {
        let change = closes[i] - closes[i - 1];
        if change > Decimal::ZERO {
            gain_sum += change;
        } else {
            loss_sum += -change;
        }
    }
    let mut avg_gain = gain_sum / Decimal::from(period as u64);
    let mut avg_loss = loss_sum / Decimal::from(period as u64);
    out[period] = Some(rsi_from_averages(avg_gain, avg_loss));

    let period_dec = Decimal::from(period as u64);
    for i in (period + 1)..closes.len() {
        let change = closes[i] - closes[i - 1];
        let (gain, loss) = if change > Decimal::ZERO {
            (change, Decimal::ZERO)
        } else {
            (Decimal::ZERO, -change)
        };
        avg_gain = (avg_gain * (period_dec - Decimal::ONE) + gain) / period_dec;
        avg_loss = (avg_loss * (period_dec - Decimal::ONE) + loss) / period_dec;
        out[i] = Some(rsi_from_averages(avg_gain, avg_loss));
    }
    out
}

fn rsi_from_averages(avg_gain: Decimal, avg_loss: Decimal) -> Decimal {
    if avg_loss.is_zero() {
        return dec!(100);
    }
    let rs = avg_gain / avg_loss;
    dec!(100) - (dec!(100) / (Decimal::ONE + rs))
}

/// MACD: EMA12 − EMA26 line, with a 9-period EMA signal line.
pub struct Macd {
    pub macd_line: Vec<Option<Decimal>>,
    pub signal_line: Vec<Option<Decimal>>,
    pub histogram: Vec<Option<Decimal>>,
}

pub fn macd(closes: &[Decimal]) -> Macd {
    let ema12 = ema(closes, 12);
    let ema26 = ema(closes, 26);
    let macd_line: Vec<Option<Decimal>> = ema12
        .iter()
        .zip(ema26.iter())
        .map(|(a, b)| match (a, b) {
            (Some(a), Some(b)) => Some(*a - *b),
            _ => None,
        })
        .collect();

    let first_valid = macd_line.iter().position(|v| v.is_some());
    let signal_line = match first_valid {
        Some(start) => {
            let tail: Vec<Decimal> = macd_line[start..]
                .iter()
                .map(|v| v.expect("checked Some above"))
                .collect();
            let mut padded = vec![None; start];
            padded.extend(ema(&tail, 9));
            padded
        }
        None => vec![None; macd_line.len()],
    };

    let histogram = macd_line
        .iter()
        .zip(signal_line.iter())
        .map(|(m, s)| match (m, s) {
            (Some(m), Some(s)) => Some(*m - *s),
            _ => None,
        })
        .collect();

    Macd {
        macd_line,
        signal_line,
        histogram,
    }
}

/// Bollinger bands: SMA20 ± 2·σ20, sample standard deviation.
pub struct BollingerBands {
    pub middle: Vec<Option<Decimal>>,
    pub upper: Vec<Option<Decimal>>,
    pub lower: Vec<Option<Decimal>>,
}

pub fn bollinger(closes: &[Decimal], period: usize) -> BollingerBands {
    let middle = sma(closes, period);
    let mut upper = vec![None; closes.len()];
    let mut lower = vec![None; closes.len()];

    for i in 0..closes.len() {
        if let Some(mean) = middle[i] {
            let window = &closes[i + 1 - period..=i];
            let variance: Decimal = window
                .iter()
                .map(|v| (*v - mean) * (*v - mean))
                .sum::<Decimal>()
                / Decimal::from((period - 1) as u64);
            let std_dev = variance.sqrt().unwrap_or(Decimal::ZERO);
            upper[i] = Some(mean + dec!(2) * std_dev);
            lower[i] = Some(mean - dec!(2) * std_dev);
        }
    }

    BollingerBands {
        middle,
        upper,
        lower,
    }
}

fn true_range(curr: &Kline, prev_close: Decimal) -> Decimal {
    let hl = curr.high - curr.low;
    let hc = (curr.high - prev_close).abs();
    let lc = (curr.low - prev_close).abs();
    hl.max(hc).max(lc)
}

/// Average True Range, Wilder's smoothing, default period 14.
pub fn atr(klines: &[Kline], period: usize) -> Vec<Option<Decimal>> {
    let mut out = vec![None; klines.len()];
    if klines.len() <= period {
        return out;
    }

    let mut tr_sum = Decimal::ZERO;
    for i in 1..=period {
        tr_sum += true_range(&klines[i], klines[i - 1].close);
    }
    let mut avg_tr = tr_sum / Decimal::from(period as u64);
    out[period] = Some(avg_tr);

    let period_dec = Decimal::from(period as u64);
    for i in (period + 1)..klines.len() {
        let tr = true_range(&klines[i], klines[i - 1].close);
        avg_tr = (avg_tr * (period_dec - Decimal::ONE) + tr) / period_dec;
        out[i] = Some(avg_tr);
    }
    out
}

/// Average Directional Index, Wilder's smoothing, default period 14.
pub fn adx(klines: &[Kline], period: usize) -> Vec<Option<Decimal>> {
    let mut out = vec![None; klines.len()];
    if klines.len() <= period * 2 {
        return out;
    }

    let mut plus_dm = vec![Decimal::ZERO; klines.len()];
    let mut minus_dm = vec![Decimal::ZERO; klines.len()];
    let mut tr = vec![Decimal::ZERO; klines.len()];

    for i in 1..klines.len() {
        let up_move = klines[i].high - klines[i - 1].high;
        let down_move = klines[i - 1].low - klines[i].low;
        plus_dm[i] = if up_move > down_move && up_move > Decimal::ZERO {
            up_move
        } else {
            Decimal::ZERO
        };
        minus_dm[i] = if down_move > up_move && down_move > Decimal::ZERO {
            down_move
        } else {
            Decimal::ZERO
        };
        tr[i] = true_range(&klines[i], klines[i - 1].close);
    }

    let period_dec = Decimal::from(period as u64);
    let mut smoothed_tr: Decimal = tr[1..=period].iter().sum();
    let mut smoothed_plus_dm: Decimal = plus_dm[1..=period].iter().sum();
    let mut smoothed_minus_dm: Decimal = minus_dm[1..=period].iter().sum();

    let mut dx = vec![None; klines.len()];
    dx[period] = di_to_dx(smoothed_plus_dm, smoothed_minus_dm, smoothed_tr);

    for i in (period + 1)..klines.len() {
        smoothed_tr = smoothed_tr - (smoothed_tr / period_dec) + tr[i];
        smoothed_plus_dm = smoothed_plus_dm - (smoothed_plus_dm / period_dec) + plus_dm[i];
        smoothed_minus_dm = smoothed_minus_dm - (smoothed_minus_dm / period_dec) + minus_dm[i];
        dx[i] = di_to_dx(smoothed_plus_dm, smoothed_minus_dm, smoothed_tr);
    }

    let dx_values: Vec<Decimal> = dx[period..]
        .iter()
        .filter_map(|v| *v)
        .collect();
    let adx_seed = sma(&dx_values, period);
    for (offset, value) in adx_seed.into_iter().enumerate() {
        if let Some(v) = value {
            out[period + offset] = Some(v);
        }
    }
    out
}

fn di_to_dx(plus_dm: Decimal, minus_dm: Decimal, tr: Decimal) -> Option<Decimal> {
    if tr.is_zero() {
        return None;
    }
    let plus_di = dec!(100) * plus_dm / tr;
    let minus_di = dec!(100) * minus_dm / tr;
    let sum = plus_di + minus_di;
    if sum.is_zero() {
        return Some(Decimal::ZERO);
    }
    Some(dec!(100) * (plus_di - minus_di).abs() / sum)
}

/// On-balance volume: running signed volume. A tie (close == prior close)
/// contributes zero change.
pub fn obv(klines: &[Kline]) -> Vec<Decimal> {
    let mut out = Vec::with_capacity(klines.len());
    let mut running = Decimal::ZERO;
    for (i, k) in klines.iter().enumerate() {
        if i > 0 {
            if k.close > klines[i - 1].close {
                running += k.volume;
            } else if k.close < klines[i - 1].close {
                running -= k.volume;
            }
        }
        out.push(running);
    }
    out
}

/// Current volume divided by the mean volume of the trailing `period` bars.
pub fn volume_ratio(klines: &[Kline], period: usize) -> Vec<Option<Decimal>> {
    let volumes: Vec<Decimal> = klines.iter().map(|k| k.volume).collect();
    let mean_volume = sma(&volumes, period);
    volumes
        .iter()
        .zip(mean_volume.iter())
        .map(|(v, mean)| match mean {
            Some(mean) if !mean.is_zero() => Some(*v / *mean),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn make_klines(closes: &[i64]) -> Vec<Kline> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Kline {
                open_time: Utc.timestamp_opt(i as i64 * 60, 0).single().unwrap(),
                open: Decimal::from(c),
                high: Decimal::from(c + 1),
                low: Decimal::from(c - 1),
                close: Decimal::from(c),
                volume: Decimal::from(100 + i as i64),
                close_time: Utc.timestamp_opt(i as i64 * 60 + 59, 0).single().unwrap(),
                interval: "1m".to_string(),
            })
            .collect()
    }

    #[test]
    fn sma_warms_up_then_tracks_window() {
        let values: Vec<Decimal> = (1..=5).map(Decimal::from).collect();
        let result = sma(&values, 3);
        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert_eq!(result[2], Some(dec!(2)));
        assert_eq!(result[4], Some(dec!(4)));
    }

    #[test]
    fn ema_seeded_with_sma_of_first_n() {
        let values: Vec<Decimal> = vec![dec!(1), dec!(2), dec!(3), dec!(4), dec!(5)];
        let result = ema(&values, 3);
        assert_eq!(result[1], None);
        assert_eq!(result[2], Some(dec!(2)));
        assert!(result[3].is_some());
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let closes: Vec<Decimal> = (1..=20).map(Decimal::from).collect();
        let result = rsi(&closes, 14);
        assert_eq!(result[14], Some(dec!(100)));
    }

    #[test]
    fn obv_ties_contribute_zero() {
        let klines = make_klines(&[10, 10, 11, 11, 9]);
        let result = obv(&klines);
        assert_eq!(result[0], Decimal::ZERO);
        assert_eq!(result[1], Decimal::ZERO);
        assert!(result[2] > Decimal::ZERO);
        assert_eq!(result[3], result[2]);
        assert!(result[4] < result[3]);
    }

    #[test]
    fn volume_ratio_above_one_when_spiking() {
        let klines = make_klines(&[10; 25]);
        let result = volume_ratio(&klines, 20);
        assert!(result[24].unwrap() > Decimal::ONE);
    }
}
