//! Level generation pipeline
//!
//! Multi-timeframe K-lines in, ranked levels out:
//!
//! 1. Extract fractals per timeframe
//! 2. Merge them across timeframes, flag resonance
//! 3. Keep the role's side of the current price and distance window
//! 4. Score against VPVR, psychology anchors and trend
//! 5. Drop weak levels, apply the manual boundary, keep the top N
//! 6. Optionally run the ATR spacing audit

use crate::analysis::atr_gap_auditor::{ATRGapAuditor, AuditResult};
use crate::analysis::fractal::{get_anchor_price, FractalExtractor};
use crate::analysis::mtf_merger::{select_top_levels, MTFMerger};
use crate::analysis::psychology::PsychologyMatcher;
use crate::analysis::scorer::LevelScorer;
use crate::analysis::trend::determine_trend;
use crate::analysis::vpvr::VPVRAnalyzer;
use crate::config::LevelConfig;
use crate::core::scoring::{
    sort_descending_by, FractalPoint, LevelScore, MTFLevelCandidate, PriceKey, TargetLevel, VPVRData,
};
use crate::core::types::{Kline, LevelRole, TrendState};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Relative distance within which `refresh_scores` re-attaches a fractal.
const REFRESH_TOLERANCE: f64 = 0.01;

pub type KlinesByTimeframe = BTreeMap<String, Vec<Kline>>;

/// Audited level set for one role.
#[derive(Debug, Clone, Serialize)]
pub struct LevelPlan {
    pub role: LevelRole,
    pub current_price: f64,
    pub main_timeframe: String,
    pub trend: TrendState,
    pub levels: Vec<TargetLevel>,
    pub audit: AuditResult,
}

/// Per-run market context derived from the main timeframe.
struct MarketContext {
    main_timeframe: String,
    fractals_by_tf: BTreeMap<String, Vec<FractalPoint>>,
    vpvr: Option<VPVRData>,
    trend: TrendState,
}

pub struct LevelCalculator {
    config: LevelConfig,
    fractal_extractor: FractalExtractor,
    vpvr_analyzer: VPVRAnalyzer,
    psychology_matcher: PsychologyMatcher,
    scorer: LevelScorer,
    mtf_merger: MTFMerger,
}

impl LevelCalculator {
    pub fn new(config: LevelConfig) -> Self {
        Self {
            fractal_extractor: FractalExtractor::new(config.fractal.clone()),
            vpvr_analyzer: VPVRAnalyzer::new(config.vpvr.clone(), config.scoring.volume_weights),
            psychology_matcher: PsychologyMatcher::new(
                config.psychology.clone(),
                config.scoring.psychology_weight,
            ),
            scorer: LevelScorer::new(&config.scoring),
            mtf_merger: MTFMerger::new(config.mtf.clone()),
            config,
        }
    }

    pub fn config(&self) -> &LevelConfig {
        &self.config
    }

    pub fn scorer(&self) -> &LevelScorer {
        &self.scorer
    }

    /// Scored levels for `role`, descending by price.
    ///
    /// Returns None for empty input, a non-positive price, or when every
    /// stage filters everything out.
    pub fn generate_target_levels(
        &self,
        klines_by_tf: &KlinesByTimeframe,
        current_price: f64,
        role: LevelRole,
        max_levels: Option<usize>,
    ) -> Option<Vec<(f64, LevelScore)>> {
        let context = self.market_context(klines_by_tf, current_price)?;
        let levels = self.build_levels(klines_by_tf, &context, current_price, role, max_levels)?;

        Some(
            levels
                .into_iter()
                .map(|(candidate, score)| (candidate.merged_price, score))
                .collect(),
        )
    }

    /// Target levels followed by the ATR audit.
    ///
    /// ATR is `atr` when given, otherwise computed from the main timeframe.
    /// The L4 fractals matching the role feed tactical fills.
    pub fn generate_audited_levels(
        &self,
        klines_by_tf: &KlinesByTimeframe,
        current_price: f64,
        role: LevelRole,
        atr: Option<f64>,
    ) -> Option<LevelPlan> {
        let context = self.market_context(klines_by_tf, current_price)?;
        let levels = self.build_levels(klines_by_tf, &context, current_price, role, None)?;

        let targets: Vec<TargetLevel> = levels
            .into_iter()
            .map(|(candidate, score)| TargetLevel::from_candidate(candidate, Some(score)))
            .collect();

        let auditor = ATRGapAuditor::new(self.config.atr.clone())
            .with_vpvr(context.vpvr.clone())
            .with_tactical_pool(self.tactical_pool(&context, role));

        let main_klines = klines_by_tf.get(&context.main_timeframe).map(Vec::as_slice);
        let (levels, audit) = auditor.audit(targets, atr, main_klines);

        if self.config.logging.log_audit_details {
            for price in &audit.trimmed_prices {
                info!("✂️ Trimmed {:.4}", price);
            }
            for fill in &audit.filled_levels {
                info!(
                    "➕ Filled {:.4} ({}, score {:.1}) in gap {:.4}..{:.4}",
                    fill.price, fill.fill_type, fill.score, fill.gap_lower, fill.gap_upper
                );
            }
        }

        Some(LevelPlan {
            role,
            current_price,
            main_timeframe: context.main_timeframe,
            trend: context.trend,
            levels,
            audit,
        })
    }

    /// Rescore existing levels without moving them.
    ///
    /// Each level is re-attached to the nearest fractal (within 1%) of its
    /// source timeframes. Levels without one keep their score under the
    /// current trend.
    pub fn refresh_scores(
        &self,
        existing: &[(f64, LevelScore)],
        klines_by_tf: &KlinesByTimeframe,
        role: LevelRole,
    ) -> Vec<(f64, LevelScore)> {
        if existing.is_empty() {
            return Vec::new();
        }

        let fractals_by_tf = self.fractal_extractor.extract_from_mtf(klines_by_tf);
        let main_timeframe = main_timeframe(klines_by_tf, &self.config.selection.main_timeframe);
        let main_klines = klines_by_tf.get(&main_timeframe).map(Vec::as_slice).unwrap_or(&[]);

        let vpvr = self.vpvr_analyzer.analyze(main_klines);
        let trend = self.trend_of(main_klines);

        existing
            .iter()
            .map(|(price, old_score)| {
                let new_score = match nearest_candidate(*price, &fractals_by_tf, &old_score.source_timeframes) {
                    Some(candidate) => self.scorer.calculate_score(
                        &candidate,
                        vpvr.as_ref(),
                        trend,
                        role,
                        old_score.psychology_anchor,
                    ),
                    None => {
                        let mut score = old_score.clone();
                        score.trend_state = trend;
                        score.trend_coefficient = self.scorer.trend_coefficient(trend, role);
                        score.final_score = score.recalculate();
                        score
                    }
                };
                (*price, new_score)
            })
            .collect()
    }

    /// Midpoint of the recent range of a series.
    pub fn get_anchor_price(&self, klines: &[Kline]) -> Option<f64> {
        get_anchor_price(klines, self.config.selection.anchor_lookback)
    }

    fn market_context(&self, klines_by_tf: &KlinesByTimeframe, current_price: f64) -> Option<MarketContext> {
        if klines_by_tf.is_empty() || !(current_price > 0.0) {
            warn!("⚠️ Invalid input: empty K-lines or non-positive price");
            return None;
        }

        let fractals_by_tf = self.fractal_extractor.extract_from_mtf(klines_by_tf);
        let total: usize = fractals_by_tf.values().map(Vec::len).sum();
        if total == 0 {
            warn!("⚠️ No fractals extracted from K-lines");
            return None;
        }
        debug!("Extracted {} fractals across {} timeframe(s)", total, fractals_by_tf.len());

        let main_timeframe = main_timeframe(klines_by_tf, &self.config.selection.main_timeframe);
        let main_klines = klines_by_tf.get(&main_timeframe).map(Vec::as_slice).unwrap_or(&[]);

        let vpvr = self.vpvr_analyzer.analyze(main_klines);
        let trend = self.trend_of(main_klines);
        debug!("Main timeframe {}, trend {:?}", main_timeframe, trend);

        Some(MarketContext {
            main_timeframe,
            fractals_by_tf,
            vpvr,
            trend,
        })
    }

    fn build_levels(
        &self,
        klines_by_tf: &KlinesByTimeframe,
        context: &MarketContext,
        current_price: f64,
        role: LevelRole,
        max_levels: Option<usize>,
    ) -> Option<Vec<(MTFLevelCandidate, LevelScore)>> {
        let selection = &self.config.selection;

        let candidates = self.mtf_merger.merge_fractals(&context.fractals_by_tf);
        let candidates: Vec<MTFLevelCandidate> = self
            .mtf_merger
            .filter_by_type(candidates, role.fractal_kind())
            .into_iter()
            .filter(|c| match role {
                LevelRole::Support => c.merged_price < current_price,
                LevelRole::Resistance => c.merged_price > current_price,
            })
            .collect();

        let candidates = self.mtf_merger.filter_by_distance(
            candidates,
            current_price,
            selection.min_distance_pct,
            selection.max_distance_pct,
        );

        if candidates.is_empty() {
            warn!("⚠️ No {} candidates after filtering", role);
            return None;
        }
        debug!("{} {} candidates after filtering", candidates.len(), role);

        let main_klines = klines_by_tf.get(&context.main_timeframe).map(Vec::as_slice).unwrap_or(&[]);
        let psychology_levels = self.psychology_matcher.find_all_psychology_levels(main_klines);

        // Psychology snap only adds a bonus; prices stay on the fractal
        let mut scores: HashMap<PriceKey, LevelScore> = HashMap::new();
        for candidate in &candidates {
            let (snapped, matched) =
                self.psychology_matcher
                    .snap_to_psychology(candidate.merged_price, &psychology_levels, None);

            let score = self.scorer.calculate_score(
                candidate,
                context.vpvr.as_ref(),
                context.trend,
                role,
                matched.map(|_| snapped),
            );
            scores.insert(PriceKey::from(candidate.merged_price), score);
        }

        let min_score = self.config.scoring.min_score_threshold;
        let mut strong: Vec<MTFLevelCandidate> = candidates
            .into_iter()
            .filter(|c| {
                let keep = scores
                    .get(&PriceKey::from(c.merged_price))
                    .map_or(false, |s| s.final_score >= min_score);
                if !keep {
                    debug!("Dropped {:.4}: score below {}", c.merged_price, min_score);
                }
                keep
            })
            .collect();

        if strong.is_empty() {
            warn!("⚠️ No {} candidates above min_score_threshold={}", role, min_score);
            return None;
        }

        let boundary = &self.config.boundary;
        if boundary.enabled {
            let before = strong.len();
            let prices: Vec<f64> = strong.iter().map(|c| c.merged_price).collect();
            let allowed: BTreeSet<PriceKey> = boundary
                .filter_levels(&prices)
                .into_iter()
                .map(PriceKey::from)
                .collect();

            strong.retain(|c| allowed.contains(&PriceKey::from(c.merged_price)));

            if strong.is_empty() {
                warn!("⚠️ No candidates left inside the manual boundary");
                return None;
            }
            debug!("Boundary filter: {} -> {} levels", before, strong.len());
        }

        let max_levels = max_levels.unwrap_or(selection.max_levels);
        let top = select_top_levels(&strong, &scores, max_levels);

        let mut by_price: HashMap<PriceKey, MTFLevelCandidate> = strong
            .into_iter()
            .map(|c| (PriceKey::from(c.merged_price), c))
            .collect();

        let mut levels: Vec<(MTFLevelCandidate, LevelScore)> = top
            .into_iter()
            .filter_map(|(price, score)| by_price.remove(&PriceKey::from(price)).map(|c| (c, score)))
            .collect();

        sort_descending_by(&mut levels, |(c, _)| c.merged_price);

        info!("🎯 Generated {} {} levels around {:.4}", levels.len(), role, current_price);
        Some(levels)
    }

    fn tactical_pool(&self, context: &MarketContext, role: LevelRole) -> Vec<FractalPoint> {
        let tactical = &self.config.fractal.layers.l4_tactical;
        if !tactical.enabled {
            return Vec::new();
        }

        context
            .fractals_by_tf
            .get(&tactical.interval)
            .map(|points| {
                points
                    .iter()
                    .filter(|f| f.kind == role.fractal_kind())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn trend_of(&self, klines: &[Kline]) -> TrendState {
        determine_trend(
            klines,
            self.config.selection.trend_ema_fast,
            self.config.selection.trend_ema_slow,
        )
    }
}

/// `preferred` when present, otherwise the series with the most bars.
pub fn main_timeframe(klines_by_tf: &KlinesByTimeframe, preferred: &str) -> String {
    if klines_by_tf.contains_key(preferred) {
        return preferred.to_string();
    }

    klines_by_tf
        .iter()
        .fold(None::<(&String, usize)>, |best, (tf, klines)| match best {
            Some((_, len)) if len >= klines.len() => best,
            _ => Some((tf, klines.len())),
        })
        .map(|(tf, _)| tf.clone())
        .unwrap_or_else(|| preferred.to_string())
}

fn nearest_candidate(
    price: f64,
    fractals_by_tf: &BTreeMap<String, Vec<FractalPoint>>,
    source_timeframes: &BTreeSet<String>,
) -> Option<MTFLevelCandidate> {
    if price <= 0.0 {
        return None;
    }

    let distance = |f: &FractalPoint| (f.price - price).abs() / price;

    let nearest = source_timeframes
        .iter()
        .filter_map(|tf| fractals_by_tf.get(tf))
        .flatten()
        .fold(None::<&FractalPoint>, |best, f| match best {
            Some(b) if distance(b) <= distance(f) => Some(b),
            _ => Some(f),
        })?;

    if distance(nearest) > REFRESH_TOLERANCE {
        return None;
    }

    Some(MTFLevelCandidate::new(price, price, vec![nearest.clone()]))
}
