// Multi-factor level scoring
//
// final = base × volume × psychology × trend × mtf

use crate::config::{ScoreThresholds, DEFAULT_MTF_RESONANCE, ScoringConfig, TrendCoefficients, VolumeWeights};
use crate::core::scoring::{LevelScore, MTFLevelCandidate, VPVRData};
use crate::core::types::{LevelRole, TrendState, VolumeZone};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct LevelScorer {
    timeframe_weights: BTreeMap<String, f64>,
    default_timeframe_weight: f64,
    period_scores: HashMap<usize, f64>,
    default_period_score: f64,
    volume_weights: VolumeWeights,
    psychology_weight: f64,
    trend_coefficients: TrendCoefficients,
    mtf_resonance: HashMap<BTreeSet<String>, f64>,
    default_mtf_resonance: HashMap<BTreeSet<String>, f64>,
    thresholds: ScoreThresholds,
}

impl Default for LevelScorer {
    fn default() -> Self {
        Self::new(&ScoringConfig::default())
    }
}

impl LevelScorer {
    /// Build typed lookups from the string-keyed tables of the config.
    pub fn new(config: &ScoringConfig) -> Self {
        let mut period_scores = HashMap::new();
        for (key, &score) in &config.period_scores {
            match key.trim().parse::<usize>() {
                Ok(period) => {
                    period_scores.insert(period, score);
                }
                Err(_) => warn!("⚠️ Ignoring period score with non-numeric key '{}'", key),
            }
        }

        let mtf_resonance = config
            .mtf_resonance
            .iter()
            .map(|(key, &coef)| (parse_timeframe_set(key), coef))
            .collect();

        let default_mtf_resonance = DEFAULT_MTF_RESONANCE
            .iter()
            .map(|&(key, coef)| (parse_timeframe_set(key), coef))
            .collect();

        Self {
            timeframe_weights: config.timeframe_weights.clone(),
            default_timeframe_weight: config.default_timeframe_weight,
            period_scores,
            default_period_score: config.default_period_score,
            volume_weights: config.volume_weights,
            psychology_weight: config.psychology_weight,
            trend_coefficients: config.trend_coefficients,
            mtf_resonance,
            default_mtf_resonance,
            thresholds: config.thresholds,
        }
    }

    pub fn calculate_score(
        &self,
        candidate: &MTFLevelCandidate,
        vpvr: Option<&VPVRData>,
        trend_state: TrendState,
        role: LevelRole,
        psychology_anchor: Option<f64>,
    ) -> LevelScore {
        let base_score = self.base_score(candidate);

        let (volume_weight, volume_zone) = match vpvr {
            Some(vpvr) => {
                let zone = vpvr.get_zone_type(candidate.merged_price);
                (self.volume_weight(zone), zone)
            }
            None => (1.0, VolumeZone::Normal),
        };

        let psychology_weight = if psychology_anchor.is_some() {
            self.psychology_weight
        } else {
            1.0
        };

        let trend_coefficient = self.trend_coefficient(trend_state, role);
        let mtf_coefficient = self.mtf_coefficient(&candidate.source_timeframes);

        let mut score = LevelScore {
            base_score,
            source_timeframes: candidate.source_timeframes.clone(),
            source_periods: candidate.source_fractals.iter().map(|f| f.period).collect(),
            volume_weight,
            volume_zone,
            psychology_weight,
            psychology_anchor,
            trend_coefficient,
            trend_state,
            mtf_coefficient,
            is_resonance: candidate.is_resonance,
            final_score: 0.0,
        };
        score.final_score = score.recalculate();
        score
    }

    /// Maximum weighted period score of the source fractals, or their sum
    /// when the candidate resonates across timeframes.
    fn base_score(&self, candidate: &MTFLevelCandidate) -> f64 {
        if candidate.source_fractals.is_empty() {
            return self.default_period_score;
        }

        let products = candidate.source_fractals.iter().map(|f| {
            self.timeframe_weight(&f.timeframe) * self.period_score(f.period)
        });

        if candidate.is_resonance {
            products.sum()
        } else {
            products.fold(f64::NEG_INFINITY, f64::max)
        }
    }

    pub fn timeframe_weight(&self, timeframe: &str) -> f64 {
        self.timeframe_weights
            .get(timeframe)
            .copied()
            .unwrap_or(self.default_timeframe_weight)
    }

    pub fn period_score(&self, period: usize) -> f64 {
        self.period_scores
            .get(&period)
            .copied()
            .unwrap_or(self.default_period_score)
    }

    pub fn volume_weight(&self, zone: VolumeZone) -> f64 {
        match zone {
            VolumeZone::Hvn => self.volume_weights.hvn,
            VolumeZone::Normal => self.volume_weights.normal,
            VolumeZone::Lvn => self.volume_weights.lvn,
        }
    }

    pub fn trend_coefficient(&self, trend_state: TrendState, role: LevelRole) -> f64 {
        self.trend_coefficients.lookup(trend_state, role)
    }

    /// Exact timeframe-set lookup in the configured table, then the built-in
    /// table, then a count-based default.
    pub fn mtf_coefficient(&self, source_timeframes: &BTreeSet<String>) -> f64 {
        if source_timeframes.len() <= 1 {
            return 1.0;
        }

        if let Some(&coef) = self
            .mtf_resonance
            .get(source_timeframes)
            .or_else(|| self.default_mtf_resonance.get(source_timeframes))
        {
            return coef;
        }

        match source_timeframes.len() {
            2 => 1.2,
            _ => 2.0,
        }
    }

    /// Position-size multiplier for a final score (consumed by order sizing).
    pub fn get_qty_multiplier(&self, final_score: f64) -> f64 {
        if final_score >= self.thresholds.mtf_resonance {
            1.5
        } else if final_score >= self.thresholds.strong {
            1.2
        } else if final_score >= self.thresholds.normal {
            1.0
        } else {
            0.0
        }
    }
}

/// "1d,4h" -> {"1d", "4h"}
fn parse_timeframe_set(key: &str) -> BTreeSet<String> {
    key.split(',')
        .map(str::trim)
        .filter(|tf| !tf.is_empty())
        .map(str::to_string)
        .collect()
}
