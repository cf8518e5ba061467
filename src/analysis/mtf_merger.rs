// Cross-timeframe fractal clustering and resonance detection

use crate::config::MtfConfig;
use crate::core::scoring::{sort_descending_by, FractalPoint, LevelScore, MTFLevelCandidate, PriceKey};
use crate::core::types::FractalKind;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct MTFMerger {
    config: MtfConfig,
}

impl MTFMerger {
    pub fn new(config: MtfConfig) -> Self {
        Self { config }
    }

    /// Cluster fractals from every prioritised timeframe into level candidates.
    ///
    /// Points are taken in priority order, sorted by descending price, then
    /// each unclustered point seeds a cluster that absorbs every remaining
    /// point within `merge_tolerance` of the seed. Membership is relative to
    /// the seed only, so a point close to two seeds joins the first one.
    /// Timeframes missing from the priority list are ignored.
    pub fn merge_fractals(
        &self,
        fractals_by_tf: &BTreeMap<String, Vec<FractalPoint>>,
    ) -> Vec<MTFLevelCandidate> {
        let mut all_fractals: Vec<&FractalPoint> = self
            .config
            .timeframe_priority
            .iter()
            .filter_map(|tf| fractals_by_tf.get(tf))
            .flatten()
            .collect();

        if all_fractals.is_empty() {
            return Vec::new();
        }

        // Stable: equal prices keep priority order
        sort_descending_by(&mut all_fractals, |f| f.price);

        let mut used = vec![false; all_fractals.len()];
        let mut candidates = Vec::new();

        for i in 0..all_fractals.len() {
            if used[i] {
                continue;
            }
            used[i] = true;

            let seed = all_fractals[i];
            let mut group = vec![seed.clone()];

            for j in 0..all_fractals.len() {
                if !used[j] && self.is_price_near(seed.price, all_fractals[j].price) {
                    group.push(all_fractals[j].clone());
                    used[j] = true;
                }
            }

            candidates.push(self.create_candidate(group));
        }

        sort_descending_by(&mut candidates, |c| c.merged_price);

        debug!(
            "Merged {} fractals into {} candidates ({} resonant)",
            all_fractals.len(),
            candidates.len(),
            candidates.iter().filter(|c| c.is_resonance).count()
        );

        candidates
    }

    fn is_price_near(&self, p1: f64, p2: f64) -> bool {
        if p1 <= 0.0 || p2 <= 0.0 {
            return false;
        }
        (p1 - p2).abs() / p1.max(p2) <= self.config.merge_tolerance
    }

    fn create_candidate(&self, fractals: Vec<FractalPoint>) -> MTFLevelCandidate {
        let seed_price = fractals[0].price;
        let merged_price = self.priority_price(&fractals).unwrap_or(seed_price);
        MTFLevelCandidate::new(seed_price, merged_price, fractals)
    }

    /// Price of the first fractal from the highest-priority timeframe present.
    fn priority_price(&self, fractals: &[FractalPoint]) -> Option<f64> {
        self.config.timeframe_priority.iter().find_map(|tf| {
            fractals.iter().find(|f| &f.timeframe == tf).map(|f| f.price)
        })
    }

    /// Candidates holding at least one fractal of the given kind.
    pub fn filter_by_type(
        &self,
        candidates: Vec<MTFLevelCandidate>,
        kind: FractalKind,
    ) -> Vec<MTFLevelCandidate> {
        candidates.into_iter().filter(|c| c.has_kind(kind)).collect()
    }

    /// Candidates whose relative distance from `current_price` lies within
    /// [min_distance_pct, max_distance_pct]. A non-positive price disables it.
    pub fn filter_by_distance(
        &self,
        candidates: Vec<MTFLevelCandidate>,
        current_price: f64,
        min_distance_pct: f64,
        max_distance_pct: f64,
    ) -> Vec<MTFLevelCandidate> {
        if current_price <= 0.0 {
            return candidates;
        }

        candidates
            .into_iter()
            .filter(|c| {
                let distance = (c.merged_price - current_price).abs() / current_price;
                min_distance_pct <= distance && distance <= max_distance_pct
            })
            .collect()
    }
}

/// Top `max_levels` candidates by final score. Unscored candidates are skipped.
pub fn select_top_levels(
    candidates: &[MTFLevelCandidate],
    scores: &HashMap<PriceKey, LevelScore>,
    max_levels: usize,
) -> Vec<(f64, LevelScore)> {
    let mut scored: Vec<(f64, LevelScore)> = candidates
        .iter()
        .filter_map(|c| {
            scores
                .get(&PriceKey::from(c.merged_price))
                .map(|s| (c.merged_price, s.clone()))
        })
        .collect();

    scored.sort_by(|a, b| b.1.final_score.total_cmp(&a.1.final_score));
    scored.truncate(max_levels);
    scored
}
