//! ATR spacing audit
//!
//! Final gate for every generated level list. Adjacent levels must sit between
//! `gap_min_atr_ratio × ATR` and `gap_max_atr_ratio × ATR` apart:
//!
//! 1. **Density trim**: levels closer than the minimum gap collide and only the
//!    higher-energy one survives (HVN and POC levels are favoured, LVN levels
//!    are penalised).
//! 2. **Sparse fill**: gaps wider than the maximum are filled through the
//!    configured chain (tactical fractal pool, then VPVR anchors, then a
//!    Fibonacci point), repeated until no gap is too wide or the iteration cap
//!    is reached.
//!
//! The auditor holds no per-symbol state. ATR is passed per call, computed
//! from K-lines, or read from an explicit [`AtrCache`].

use crate::config::AtrConfig;
use crate::core::scoring::{sort_descending_by, FilledLevel, FractalPoint, TargetLevel, VPVRData, VpvrAnchor};
use crate::core::types::{FillType, Kline, Layer, VolumeZone};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Upper bound on sparse-fill passes.
pub const MAX_FILL_ITERATIONS: usize = 100;

/// Diagnostic record of one audit run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    pub original_count: usize,
    pub final_count: usize,
    pub trimmed_count: usize,
    pub filled_count: usize,
    pub trimmed_prices: Vec<f64>,
    pub filled_levels: Vec<FilledLevel>,
    pub atr_value: f64,
    pub iterations: usize,
    pub iteration_cap_hit: bool,
    pub residual_gaps: Vec<(f64, f64)>,  // (upper, lower) still wider than max_gap
}

impl AuditResult {
    fn pass_through(count: usize) -> Self {
        Self {
            original_count: count,
            final_count: count,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AtrKey {
    pub symbol: String,
    pub timeframe: String,
}

impl AtrKey {
    pub fn new(symbol: &str, timeframe: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
        }
    }
}

/// Last known ATR per (symbol, timeframe).
#[derive(Debug, Clone, Default)]
pub struct AtrCache {
    values: HashMap<AtrKey, f64>,
}

impl AtrCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &str, timeframe: &str) -> Option<f64> {
        self.values.get(&AtrKey::new(symbol, timeframe)).copied()
    }

    pub fn insert(&mut self, symbol: &str, timeframe: &str, atr: f64) {
        self.values.insert(AtrKey::new(symbol, timeframe), atr);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

struct SparseOutcome {
    levels: Vec<TargetLevel>,
    filled: Vec<FilledLevel>,
    iterations: usize,
    stopped_by_cap: bool,
}

#[derive(Debug, Clone)]
pub struct ATRGapAuditor {
    config: AtrConfig,
    vpvr: Option<VPVRData>,
    tactical_pool: Vec<FractalPoint>,
    tactical_scores: HashMap<usize, f64>,
    max_iterations: usize,
}

impl Default for ATRGapAuditor {
    fn default() -> Self {
        Self::new(AtrConfig::default())
    }
}

impl ATRGapAuditor {
    pub fn new(config: AtrConfig) -> Self {
        let tactical_scores = config
            .fill_scores
            .tactical_periods
            .iter()
            .filter_map(|(key, &score)| key.trim().parse::<usize>().ok().map(|p| (p, score)))
            .collect();

        Self {
            config,
            vpvr: None,
            tactical_pool: Vec::new(),
            tactical_scores,
            max_iterations: MAX_FILL_ITERATIONS,
        }
    }

    /// Volume profile used for energy scoring and VPVR fills.
    pub fn with_vpvr(mut self, vpvr: Option<VPVRData>) -> Self {
        self.vpvr = vpvr;
        self
    }

    /// L4 fractal pool used for tactical fills.
    pub fn with_tactical_pool(mut self, pool: Vec<FractalPoint>) -> Self {
        self.tactical_pool = pool;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn config(&self) -> &AtrConfig {
        &self.config
    }

    /// Mean of the last `period` true ranges.
    ///
    /// Needs `period + 1` bars; returns None otherwise.
    pub fn calculate_atr(&self, klines: &[Kline], period: Option<usize>) -> Option<f64> {
        let period = period.unwrap_or(self.config.atr_period);

        if period == 0 || klines.len() < period + 1 {
            warn!("⚠️ Not enough K-lines for ATR: {} < {}", klines.len(), period + 1);
            return None;
        }

        let true_ranges: Vec<f64> = klines
            .windows(2)
            .map(|pair| true_range(&pair[1], pair[0].close))
            .collect();

        let recent = &true_ranges[true_ranges.len() - period..];
        Some(recent.iter().sum::<f64>() / period as f64)
    }

    /// Run both passes over a descending level list.
    ///
    /// ATR comes from `atr`, else from `klines`. A disabled audit or an
    /// unresolvable ATR returns the input unchanged.
    pub fn audit(
        &self,
        levels: Vec<TargetLevel>,
        atr: Option<f64>,
        klines: Option<&[Kline]>,
    ) -> (Vec<TargetLevel>, AuditResult) {
        let original_count = levels.len();

        if !self.config.enabled {
            return (levels, AuditResult::pass_through(original_count));
        }

        let atr = match atr.or_else(|| klines.and_then(|k| self.calculate_atr(k, None))) {
            Some(atr) if atr.is_finite() && atr > 0.0 => atr,
            _ => {
                warn!("⚠️ ATR unavailable, skipping gap audit");
                return (levels, AuditResult::pass_through(original_count));
            }
        };

        let min_gap = self.config.min_gap(atr);
        let max_gap = self.config.max_gap(atr);

        let mut levels: Vec<TargetLevel> = levels
            .into_iter()
            .filter(|l| l.price.is_finite() && l.price > 0.0)
            .collect();
        if levels.len() < original_count {
            warn!("⚠️ Dropped {} level(s) with non-positive price", original_count - levels.len());
        }
        sort_descending_by(&mut levels, |l| l.price);

        let (kept, trimmed_prices) = self.audit_density(levels, atr);
        debug!("Density pass: trimmed {} level(s) (min_gap={:.4})", trimmed_prices.len(), min_gap);

        let outcome = self.audit_sparse(kept, min_gap, max_gap);
        debug!(
            "Sparse pass: filled {} level(s) in {} iteration(s) (max_gap={:.4})",
            outcome.filled.len(),
            outcome.iterations,
            max_gap
        );

        let residual_gaps: Vec<(f64, f64)> = outcome
            .levels
            .windows(2)
            .filter(|pair| self.config.is_too_sparse(pair[0].price - pair[1].price, atr))
            .map(|pair| (pair[0].price, pair[1].price))
            .collect();

        let iteration_cap_hit = outcome.stopped_by_cap && !residual_gaps.is_empty();
        if iteration_cap_hit {
            warn!(
                "⚠️ Sparse fill stopped after {} iterations with {} gap(s) still open",
                outcome.iterations,
                residual_gaps.len()
            );
        }

        let result = AuditResult {
            original_count,
            final_count: outcome.levels.len(),
            trimmed_count: trimmed_prices.len(),
            filled_count: outcome.filled.len(),
            trimmed_prices,
            filled_levels: outcome.filled,
            atr_value: atr,
            iterations: outcome.iterations,
            iteration_cap_hit,
            residual_gaps,
        };

        info!(
            "📐 ATR audit: original={}, trimmed={}, filled={}, final={}, ATR={:.4}",
            result.original_count, result.trimmed_count, result.filled_count, result.final_count, atr
        );

        (outcome.levels, result)
    }

    /// Audit with ATR resolved through a per-(symbol, timeframe) cache.
    ///
    /// Fresh K-lines refresh the cache entry; without them the cached value
    /// is used.
    pub fn audit_with_cache(
        &self,
        levels: Vec<TargetLevel>,
        cache: &mut AtrCache,
        symbol: &str,
        timeframe: &str,
        klines: Option<&[Kline]>,
    ) -> (Vec<TargetLevel>, AuditResult) {
        let atr = match klines.and_then(|k| self.calculate_atr(k, None)) {
            Some(atr) => {
                cache.insert(symbol, timeframe, atr);
                Some(atr)
            }
            None => cache.get(symbol, timeframe),
        };

        self.audit(levels, atr, None)
    }

    fn audit_density(&self, levels: Vec<TargetLevel>, atr: f64) -> (Vec<TargetLevel>, Vec<f64>) {
        let mut kept: Vec<TargetLevel> = Vec::with_capacity(levels.len());
        let mut trimmed = Vec::new();

        for level in levels {
            let Some(prev) = kept.last() else {
                kept.push(level);
                continue;
            };

            if !self.config.is_too_dense((prev.price - level.price).abs(), atr) {
                kept.push(level);
                continue;
            }

            // Collision: the previous level survives ties
            if self.energy_score(&level) > self.energy_score(prev) {
                if let Some(loser) = kept.pop() {
                    trimmed.push(loser.price);
                }
                kept.push(level);
            } else {
                trimmed.push(level.price);
            }
        }

        (kept, trimmed)
    }

    fn audit_sparse(&self, levels: Vec<TargetLevel>, min_gap: f64, max_gap: f64) -> SparseOutcome {
        let mut levels = levels;
        let mut filled = Vec::new();
        let mut iterations = 0;
        let mut changed = levels.len() >= 2;

        while changed && iterations < self.max_iterations {
            changed = false;
            iterations += 1;

            // One fill per offending gap per pass
            let fills: Vec<FilledLevel> = levels
                .windows(2)
                .filter(|pair| pair[0].price - pair[1].price > max_gap)
                .filter_map(|pair| self.fill_gap(pair[0].price, pair[1].price, min_gap))
                .collect();

            if fills.is_empty() {
                break;
            }

            changed = true;
            for fill in fills {
                levels.push(TargetLevel::from_fill(fill.clone()));
                filled.push(fill);
            }
            sort_descending_by(&mut levels, |l| l.price);
        }

        SparseOutcome {
            levels,
            filled,
            iterations,
            stopped_by_cap: changed,
        }
    }

    fn fill_gap(&self, upper: f64, lower: f64, min_gap: f64) -> Option<FilledLevel> {
        for fill_type in &self.config.fill_priority {
            let fill = match fill_type {
                FillType::Tactical => self.fill_with_tactical(upper, lower, min_gap),
                FillType::Vpvr => self.fill_with_vpvr(upper, lower, min_gap),
                FillType::Fibonacci if self.config.fibonacci_enabled => {
                    Some(self.fill_with_fibonacci(upper, lower))
                }
                FillType::Fibonacci => None,
            };

            if fill.is_some() {
                return fill;
            }
        }
        None
    }

    fn fill_with_tactical(&self, upper: f64, lower: f64, min_gap: f64) -> Option<FilledLevel> {
        // Largest period wins, first one on ties
        let best = self
            .tactical_pool
            .iter()
            .filter(|f| fits_gap(f.price, upper, lower, min_gap))
            .fold(None::<&FractalPoint>, |best, f| match best {
                Some(b) if b.period >= f.period => Some(b),
                _ => Some(f),
            })?;

        Some(FilledLevel {
            price: best.price,
            fill_type: FillType::Tactical,
            score: self.tactical_score(best),
            source_layer: best.layer.or(Some(Layer::L4Tactical)),
            vpvr_anchor: None,
            gap_upper: upper,
            gap_lower: lower,
        })
    }

    fn fill_with_vpvr(&self, upper: f64, lower: f64, min_gap: f64) -> Option<FilledLevel> {
        let vpvr = self.vpvr.as_ref()?;
        let scores = &self.config.fill_scores;

        let (price, score, anchor) = if fits_gap(vpvr.poc_price, upper, lower, min_gap) {
            (vpvr.poc_price, scores.poc, VpvrAnchor::Poc)
        } else {
            let mid = vpvr
                .hvn_zones
                .iter()
                .map(|&(low, high)| (low + high) / 2.0)
                .find(|&mid| fits_gap(mid, upper, lower, min_gap))?;
            (mid, scores.hvn, VpvrAnchor::Hvn)
        };

        Some(FilledLevel {
            price,
            fill_type: FillType::Vpvr,
            score,
            source_layer: None,
            vpvr_anchor: Some(anchor),
            gap_upper: upper,
            gap_lower: lower,
        })
    }

    fn fill_with_fibonacci(&self, upper: f64, lower: f64) -> FilledLevel {
        FilledLevel {
            price: self.config.get_fibonacci_fill_price(upper, lower),
            fill_type: FillType::Fibonacci,
            score: self.config.fibonacci_fill_score,
            source_layer: None,
            vpvr_anchor: None,
            gap_upper: upper,
            gap_lower: lower,
        }
    }

    /// Collision priority used by the density pass.
    pub fn energy_score(&self, level: &TargetLevel) -> f64 {
        let energy = &self.config.energy;
        let mut score = level.score;

        if let Some(vpvr) = &self.vpvr {
            match vpvr.get_zone_type(level.price) {
                VolumeZone::Hvn => score *= energy.hvn,
                VolumeZone::Lvn => score *= energy.lvn,
                VolumeZone::Normal => {}
            }

            if (level.price - vpvr.poc_price).abs() < level.price * energy.poc_tolerance {
                score *= energy.poc;
            }
        }

        if level.is_resonance {
            score *= energy.resonance;
        }

        score
    }

    /// Period table score, adjusted by the VPVR zone and truncated.
    fn tactical_score(&self, fractal: &FractalPoint) -> f64 {
        let scores = &self.config.fill_scores;
        let base = self
            .tactical_scores
            .get(&fractal.period)
            .copied()
            .unwrap_or(scores.tactical_default);

        match self.vpvr.as_ref().map(|v| v.get_zone_type(fractal.price)) {
            Some(VolumeZone::Hvn) => (base * scores.tactical_hvn).trunc(),
            Some(VolumeZone::Lvn) => (base * scores.tactical_lvn).trunc(),
            _ => base,
        }
    }
}

fn true_range(kline: &Kline, prev_close: f64) -> f64 {
    (kline.high - kline.low)
        .max((kline.high - prev_close).abs())
        .max((kline.low - prev_close).abs())
}

/// Strictly inside the gap and at least `min_gap` from both edges.
///
/// Applied before the period ranking, so a larger-period point hugging an
/// edge loses to a smaller-period point that fits.
fn fits_gap(price: f64, upper: f64, lower: f64, min_gap: f64) -> bool {
    lower < price && price < upper && upper - price >= min_gap && price - lower >= min_gap
}
