// Common test utilities and helpers
#![allow(dead_code)]

use key_level_grid::core::scoring::{FractalPoint, LevelScore, MTFLevelCandidate, TargetLevel};
use key_level_grid::core::types::{FractalKind, Kline, Layer};
use key_level_grid::analysis::KlinesByTimeframe;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use tempfile::TempDir;

const BAR_MS: i64 = 4 * 60 * 60 * 1000;

/// Bar centred on `close` with a symmetric high/low spread
pub fn bar(index: usize, close: f64, spread: f64, volume: f64) -> Kline {
    Kline::new(index as i64 * BAR_MS, close, close + spread, close - spread, close, volume)
}

/// Bars with explicit highs; lows sit one unit below
pub fn klines_from_highs(highs: &[f64]) -> Vec<Kline> {
    highs
        .iter()
        .enumerate()
        .map(|(i, &h)| Kline::new(i as i64 * BAR_MS, h - 0.5, h, h - 1.0, h - 0.5, 10.0))
        .collect()
}

/// Flat bars with constant volume
pub fn flat_klines(count: usize, price: f64) -> Vec<Kline> {
    (0..count).map(|i| bar(i, price, 1.0, 10.0)).collect()
}

/// Triangle wave on top of a linear drift.
///
/// Troughs sit at multiples of `2 × half_cycle`, peaks half a cycle later.
/// Legs are strictly monotone while `amplitude / half_cycle > |drift|`.
pub fn trending_zigzag(base: f64, drift: f64, amplitude: f64, half_cycle: usize, count: usize) -> Vec<Kline> {
    let cycle = 2 * half_cycle;
    (0..count)
        .map(|i| {
            let phase = i % cycle;
            let tri = if phase <= half_cycle {
                phase as f64 / half_cycle as f64
            } else {
                (cycle - phase) as f64 / half_cycle as f64
            };
            let close = base + drift * i as f64 + amplitude * tri;
            bar(i, close, 0.5, 100.0)
        })
        .collect()
}

/// Seeded random walk (deterministic across runs)
pub fn random_walk_klines(seed: u64, base: f64, count: usize, volatility: f64) -> Vec<Kline> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut close = base;
    let mut klines = Vec::with_capacity(count);

    for i in 0..count {
        let open = close;
        close *= 1.0 + rng.gen_range(-volatility..volatility);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..volatility));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..volatility));
        let volume = rng.gen_range(10.0..1000.0);
        klines.push(Kline::new(i as i64 * BAR_MS, open, high, low, close, volume));
    }

    klines
}

pub fn mtf(series: Vec<(&str, Vec<Kline>)>) -> KlinesByTimeframe {
    series.into_iter().map(|(tf, k)| (tf.to_string(), k)).collect()
}

pub fn fractal(price: f64, timeframe: &str, period: usize, kind: FractalKind) -> FractalPoint {
    FractalPoint {
        price,
        timestamp: 0,
        kind,
        timeframe: timeframe.to_string(),
        period,
        kline_index: 0,
        layer: None,
    }
}

pub fn tactical_fractal(price: f64, period: usize) -> FractalPoint {
    FractalPoint {
        layer: Some(Layer::L4Tactical),
        ..fractal(price, "15m", period, FractalKind::Low)
    }
}

/// Candidate from (timeframe, period) sources, all at `price`
pub fn candidate(price: f64, sources: &[(&str, usize)]) -> MTFLevelCandidate {
    let fractals = sources
        .iter()
        .map(|&(tf, period)| fractal(price, tf, period, FractalKind::Low))
        .collect();
    MTFLevelCandidate::new(price, price, fractals)
}

/// Single-timeframe level carrying a flat score
pub fn level(price: f64, score: f64) -> TargetLevel {
    TargetLevel::from_candidate(candidate(price, &[("4h", 55)]), Some(LevelScore::flat(score)))
}

pub fn levels(prices_and_scores: &[(f64, f64)]) -> Vec<TargetLevel> {
    prices_and_scores.iter().map(|&(p, s)| level(p, s)).collect()
}

pub fn prices(levels: &[TargetLevel]) -> Vec<f64> {
    levels.iter().map(|l| l.price).collect()
}

pub fn assert_strictly_descending(prices: &[f64]) {
    for pair in prices.windows(2) {
        assert!(pair[0] > pair[1], "not strictly descending: {:?}", prices);
    }
}

pub fn assert_gaps_within(prices: &[f64], min_gap: f64, max_gap: f64) {
    for pair in prices.windows(2) {
        let gap = pair[0] - pair[1];
        assert!(
            gap >= min_gap - 1e-9 && gap <= max_gap + 1e-9,
            "gap {} outside [{}, {}] in {:?}",
            gap,
            min_gap,
            max_gap,
            prices
        );
    }
}

pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

/// Create a temporary directory holding a config path
pub fn create_temp_config_path() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("levels.toml");
    (temp_dir, config_path)
}
