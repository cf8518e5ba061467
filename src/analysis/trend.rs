// EMA tunnel trend classification

use crate::core::types::{Kline, TrendState};

/// Band around the tunnel midpoint treated as neutral (1%).
const TUNNEL_BAND: f64 = 0.01;

/// Classify the trend of a series against its EMA fast/slow tunnel.
///
/// Fewer bars than the slower EMA yields `Neutral`.
pub fn determine_trend(klines: &[Kline], ema_fast: usize, ema_slow: usize) -> TrendState {
    if klines.is_empty() || klines.len() < ema_fast.max(ema_slow) {
        return TrendState::Neutral;
    }

    let closes: Vec<f64> = klines.iter().map(|k| k.close).collect();
    let mid = (calculate_ema(&closes, ema_fast) + calculate_ema(&closes, ema_slow)) / 2.0;

    let current = closes[closes.len() - 1];

    if current > mid * (1.0 + TUNNEL_BAND) {
        TrendState::Bullish
    } else if current < mid * (1.0 - TUNNEL_BAND) {
        TrendState::Bearish
    } else {
        TrendState::Neutral
    }
}

/// EMA seeded with the SMA of the first `period` values.
///
/// Shorter input falls back to the plain mean.
pub fn calculate_ema(values: &[f64], period: usize) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    if period == 0 || values.len() < period {
        return values.iter().sum::<f64>() / values.len() as f64;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    values[period..]
        .iter()
        .fold(seed, |ema, &price| alpha * price + (1.0 - alpha) * ema)
}
