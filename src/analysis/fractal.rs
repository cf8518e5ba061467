// Swing-point extraction per timeframe and layer

use crate::config::FractalConfig;
use crate::core::scoring::{sort_descending_by, FractalPoint};
use crate::core::types::{FractalKind, Kline, Layer};
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct FractalExtractor {
    config: FractalConfig,
}

impl FractalExtractor {
    pub fn new(config: FractalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FractalConfig {
        &self.config
    }

    /// Extract swing highs and lows, sorted by descending price.
    ///
    /// Periods come from `periods`, else from `layer`'s configured set, else
    /// from the default lookback. A period whose window (2p+1 bars) does not
    /// fit the input is skipped.
    pub fn extract_fractals(
        &self,
        klines: &[Kline],
        timeframe: &str,
        periods: Option<&[usize]>,
        layer: Option<Layer>,
    ) -> Vec<FractalPoint> {
        if klines.len() < 3 {
            return Vec::new();
        }

        let periods: &[usize] = match (periods, layer) {
            (Some(p), _) => p,
            (None, Some(layer)) => self.config.layers.get(layer).periods.as_slice(),
            (None, None) => self.config.lookback.as_slice(),
        };

        let mut all_fractals = Vec::new();

        for &period in periods {
            if period == 0 || klines.len() < period * 2 + 1 {
                continue;
            }

            all_fractals.extend(find_swings(klines, period, timeframe, layer, FractalKind::High));
            all_fractals.extend(find_swings(klines, period, timeframe, layer, FractalKind::Low));
        }

        let mut unique = deduplicate_fractals(all_fractals, self.config.dedup_tolerance);
        sort_descending_by(&mut unique, |f| f.price);

        debug!("{} fractals extracted from {} bars ({})", unique.len(), klines.len(), timeframe);
        unique
    }

    /// Extract with the period set of one layer.
    pub fn extract_layer(&self, klines: &[Kline], timeframe: &str, layer: Layer) -> Vec<FractalPoint> {
        self.extract_fractals(klines, timeframe, None, Some(layer))
    }

    /// Extract every timeframe of a multi-timeframe feed.
    ///
    /// Timeframes matching an enabled layer interval use that layer's periods.
    pub fn extract_from_mtf(
        &self,
        klines_by_tf: &BTreeMap<String, Vec<Kline>>,
    ) -> BTreeMap<String, Vec<FractalPoint>> {
        klines_by_tf
            .par_iter()
            .map(|(tf, klines)| {
                let layer = self.config.layers.layer_for_interval(tf);
                (tf.clone(), self.extract_fractals(klines, tf, None, layer))
            })
            .collect()
    }
}

fn find_swings(
    klines: &[Kline],
    period: usize,
    timeframe: &str,
    layer: Option<Layer>,
    kind: FractalKind,
) -> Vec<FractalPoint> {
    let value = |k: &Kline| match kind {
        FractalKind::High => k.high,
        FractalKind::Low => k.low,
    };
    // Strict: any tie in the window disqualifies the bar
    let dominates = |current: f64, other: f64| match kind {
        FractalKind::High => current > other,
        FractalKind::Low => current < other,
    };

    let n = klines.len();
    let mut points = Vec::new();

    for i in period..n - period {
        let current = value(&klines[i]);
        let is_swing = klines[i - period..i]
            .iter()
            .chain(&klines[i + 1..=i + period])
            .all(|k| dominates(current, value(k)));

        if is_swing {
            points.push(FractalPoint {
                price: current,
                timestamp: klines[i].timestamp,
                kind,
                timeframe: timeframe.to_string(),
                period,
                kline_index: i,
                layer,
            });
        }
    }

    points
}

/// Group points lying within `tolerance` of a group's first member and keep
/// the largest-period point of each group (first one on ties).
fn deduplicate_fractals(fractals: Vec<FractalPoint>, tolerance: f64) -> Vec<FractalPoint> {
    let mut groups: Vec<(f64, FractalPoint)> = Vec::new();

    for fractal in fractals {
        let matched = groups.iter_mut().find(|(key, _)| {
            fractal.price != 0.0 && ((key - fractal.price) / fractal.price).abs() < tolerance
        });

        match matched {
            Some((_, best)) => {
                if fractal.period > best.period {
                    *best = fractal;
                }
            }
            None => groups.push((fractal.price, fractal)),
        }
    }

    groups.into_iter().map(|(_, best)| best).collect()
}

/// Midpoint of the highest high and lowest low over the last `lookback` bars.
pub fn get_anchor_price(klines: &[Kline], lookback: usize) -> Option<f64> {
    if klines.is_empty() {
        return None;
    }

    let start = klines.len().saturating_sub(lookback);
    let recent = &klines[start..];

    let highest = recent.iter().map(|k| k.high).fold(f64::NEG_INFINITY, f64::max);
    let lowest = recent.iter().map(|k| k.low).fold(f64::INFINITY, f64::min);

    Some((highest + lowest) / 2.0)
}
