// Psychological price anchors: Fibonacci levels and round numbers

use crate::config::PsychologyConfig;
use crate::core::types::{Kline, PsychologyKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsychologyLevel {
    pub price: f64,
    pub kind: PsychologyKind,
    pub ratio: Option<f64>,  // Fibonacci ratio for fib levels
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct PsychologyMatcher {
    config: PsychologyConfig,
    weight: f64,
}

impl Default for PsychologyMatcher {
    fn default() -> Self {
        Self::new(PsychologyConfig::default(), 1.2)
    }
}

impl PsychologyMatcher {
    pub fn new(config: PsychologyConfig, weight: f64) -> Self {
        Self { config, weight }
    }

    /// Retracements (and extensions for ratios above 1.0) of a high/low range,
    /// descending, deduplicated at cent precision.
    pub fn calculate_fib_levels(&self, high: f64, low: f64) -> Vec<PsychologyLevel> {
        if high <= low {
            return Vec::new();
        }

        let diff = high - low;
        let mut levels = Vec::new();

        for &ratio in &self.config.fib_ratios {
            levels.push(PsychologyLevel {
                price: high - diff * ratio,
                kind: PsychologyKind::Fib,
                ratio: Some(ratio),
                label: format!("Fib {:.3}", ratio),
            });

            if ratio > 1.0 {
                levels.push(PsychologyLevel {
                    price: high + diff * (ratio - 1.0),
                    kind: PsychologyKind::Fib,
                    ratio: Some(ratio),
                    label: format!("Fib Ext {:.3}", ratio),
                });

                let extension_down = low - diff * (ratio - 1.0);
                if extension_down > 0.0 {
                    levels.push(PsychologyLevel {
                        price: extension_down,
                        kind: PsychologyKind::Fib,
                        ratio: Some(ratio),
                        label: format!("Fib Ext -{:.3}", ratio),
                    });
                }
            }
        }

        levels.sort_by(|a, b| b.price.total_cmp(&a.price));

        let mut seen = HashSet::new();
        levels.retain(|lvl| seen.insert((lvl.price * 100.0).round() as i64));
        levels
    }

    /// Multiples of magnitude-dependent intervals inside [price_min, price_max].
    pub fn find_round_numbers(&self, price_min: f64, price_max: f64) -> Vec<PsychologyLevel> {
        if !(price_max >= price_min) || price_max <= 0.0 {
            return Vec::new();
        }

        let intervals: [f64; 3] = if price_max >= 10_000.0 {
            [10_000.0, 5_000.0, 1_000.0]
        } else if price_max >= 1_000.0 {
            [1_000.0, 500.0, 100.0]
        } else if price_max >= 100.0 {
            [100.0, 50.0, 10.0]
        } else {
            [10.0, 5.0, 1.0]
        };

        let mut prices = Vec::new();

        for interval in intervals {
            let first = (price_min / interval).floor() as i64;
            let last = (price_max / interval).ceil() as i64;

            for k in first..=last {
                let price = k as f64 * interval;
                if price_min <= price && price <= price_max {
                    prices.push(price);
                }
            }
        }

        prices.sort_by(|a, b| b.total_cmp(a));
        prices.dedup();

        prices
            .into_iter()
            .map(|price| PsychologyLevel {
                price,
                kind: PsychologyKind::Round,
                ratio: None,
                label: format!("Round {:.0}", price),
            })
            .collect()
    }

    /// Closest level within the relative tolerance.
    ///
    /// Returns the level's price and the level, or the unchanged price and
    /// None. Ties keep the earlier level; only a strictly closer one replaces it.
    pub fn snap_to_psychology<'a>(
        &self,
        price: f64,
        levels: &'a [PsychologyLevel],
        tolerance: Option<f64>,
    ) -> (f64, Option<&'a PsychologyLevel>) {
        if levels.is_empty() || price <= 0.0 {
            return (price, None);
        }

        let tolerance = tolerance.unwrap_or(self.config.snap_tolerance);
        let mut best: Option<(&PsychologyLevel, f64)> = None;

        for level in levels.iter().filter(|l| l.price > 0.0) {
            let distance = (price - level.price).abs() / price;
            if distance < tolerance && best.map_or(true, |(_, d)| distance < d) {
                best = Some((level, distance));
            }
        }

        match best {
            Some((level, _)) => (level.price, Some(level)),
            None => (price, None),
        }
    }

    pub fn get_psychology_weight(&self, matched: Option<&PsychologyLevel>) -> f64 {
        match matched {
            Some(_) => self.weight,
            None => 1.0,
        }
    }

    /// Fibonacci and round-number levels for the full range of a series.
    pub fn find_all_psychology_levels(&self, klines: &[Kline]) -> Vec<PsychologyLevel> {
        if klines.is_empty() {
            return Vec::new();
        }

        let price_max = klines.iter().map(|k| k.high).fold(f64::NEG_INFINITY, f64::max);
        let price_min = klines.iter().map(|k| k.low).fold(f64::INFINITY, f64::min);

        let mut levels = self.calculate_fib_levels(price_max, price_min);
        levels.extend(self.find_round_numbers(price_min, price_max));
        levels.sort_by(|a, b| b.price.total_cmp(&a.price));
        levels
    }
}
