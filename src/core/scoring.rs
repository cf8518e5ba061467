// Level scoring data structures shared by the analysis pipeline

use crate::core::types::{FillType, FractalKind, Layer, TrendState, VolumeZone};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A swing extreme confirmed by a symmetric lookback window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FractalPoint {
    pub price: f64,
    pub timestamp: i64,
    pub kind: FractalKind,
    pub timeframe: String,
    pub period: usize,
    pub kline_index: usize,
    pub layer: Option<Layer>,
}

/// Volume profile snapshot for one K-line series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VPVRData {
    pub poc_price: f64,
    pub hvn_zones: Vec<(f64, f64)>, // (low, high), ascending
    pub lvn_zones: Vec<(f64, f64)>,
    pub total_volume: f64,
    pub price_range: (f64, f64),    // (min, max)
}

impl VPVRData {
    /// Zone containing `price`. HVN wins when zones overlap.
    pub fn get_zone_type(&self, price: f64) -> VolumeZone {
        if self.hvn_zones.iter().any(|&(low, high)| low <= price && price <= high) {
            return VolumeZone::Hvn;
        }
        if self.lvn_zones.iter().any(|&(low, high)| low <= price && price <= high) {
            return VolumeZone::Lvn;
        }
        VolumeZone::Normal
    }
}

/// Score breakdown for one level.
///
/// `final_score` is always the product of the five stored factors:
/// base × volume × psychology × trend × mtf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelScore {
    pub base_score: f64,
    pub source_timeframes: BTreeSet<String>,
    pub source_periods: BTreeSet<usize>,

    pub volume_weight: f64,
    pub volume_zone: VolumeZone,

    pub psychology_weight: f64,
    pub psychology_anchor: Option<f64>,

    pub trend_coefficient: f64,
    pub trend_state: TrendState,

    pub mtf_coefficient: f64,
    pub is_resonance: bool,

    pub final_score: f64,
}

impl LevelScore {
    /// Product of the stored factors.
    pub fn recalculate(&self) -> f64 {
        self.base_score
            * self.volume_weight
            * self.psychology_weight
            * self.trend_coefficient
            * self.mtf_coefficient
    }

    /// Neutral score used for levels that carry no fractal evidence.
    pub fn flat(base_score: f64) -> Self {
        Self {
            base_score,
            source_timeframes: BTreeSet::new(),
            source_periods: BTreeSet::new(),
            volume_weight: 1.0,
            volume_zone: VolumeZone::Normal,
            psychology_weight: 1.0,
            psychology_anchor: None,
            trend_coefficient: 1.0,
            trend_state: TrendState::Neutral,
            mtf_coefficient: 1.0,
            is_resonance: false,
            final_score: base_score,
        }
    }
}

/// A cluster of fractal points from one or more timeframes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MTFLevelCandidate {
    pub price: f64,          // Seed price of the cluster
    pub merged_price: f64,   // Price of the highest-priority timeframe present
    pub source_fractals: Vec<FractalPoint>,
    pub source_timeframes: BTreeSet<String>,
    pub is_resonance: bool,
}

impl MTFLevelCandidate {
    pub fn new(price: f64, merged_price: f64, source_fractals: Vec<FractalPoint>) -> Self {
        let source_timeframes: BTreeSet<String> = source_fractals
            .iter()
            .map(|f| f.timeframe.clone())
            .collect();
        let is_resonance = source_timeframes.len() > 1;

        Self {
            price,
            merged_price,
            source_fractals,
            source_timeframes,
            is_resonance,
        }
    }

    /// Single-fractal candidate at the fractal's own price.
    pub fn from_fractal(fractal: FractalPoint) -> Self {
        let price = fractal.price;
        Self::new(price, price, vec![fractal])
    }

    pub fn has_kind(&self, kind: FractalKind) -> bool {
        self.source_fractals.iter().any(|f| f.kind == kind)
    }
}

/// Which VPVR feature produced a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VpvrAnchor {
    Poc,
    Hvn,
}

/// A level synthesised by the sparse-gap audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilledLevel {
    pub price: f64,
    pub fill_type: FillType,
    pub score: f64,
    pub source_layer: Option<Layer>,
    pub vpvr_anchor: Option<VpvrAnchor>,
    pub gap_upper: f64,
    pub gap_lower: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LevelSource {
    Fractal {
        candidate: MTFLevelCandidate,
        score: Option<LevelScore>,
    },
    Filled(FilledLevel),
}

/// Unit flowing through the ATR audit and handed to the grid manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetLevel {
    pub price: f64,
    pub score: f64,
    pub is_resonance: bool,
    pub source: LevelSource,
}

impl TargetLevel {
    pub fn from_candidate(candidate: MTFLevelCandidate, score: Option<LevelScore>) -> Self {
        Self {
            price: candidate.merged_price,
            score: score.as_ref().map(|s| s.final_score).unwrap_or(0.0),
            is_resonance: candidate.is_resonance,
            source: LevelSource::Fractal { candidate, score },
        }
    }

    pub fn from_fill(fill: FilledLevel) -> Self {
        Self {
            price: fill.price,
            score: fill.score,
            is_resonance: false,
            source: LevelSource::Filled(fill),
        }
    }

    pub fn breakdown(&self) -> Option<&LevelScore> {
        match &self.source {
            LevelSource::Fractal { score, .. } => score.as_ref(),
            LevelSource::Filled(_) => None,
        }
    }

    pub fn fill_type(&self) -> Option<FillType> {
        match &self.source {
            LevelSource::Fractal { .. } => None,
            LevelSource::Filled(fill) => Some(fill.fill_type),
        }
    }

    pub fn is_filled(&self) -> bool {
        matches!(self.source, LevelSource::Filled(_))
    }
}

/// Exact-price map key (bit pattern of the f64).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PriceKey(u64);

impl From<f64> for PriceKey {
    fn from(price: f64) -> Self {
        // Fold -0.0 into 0.0 so both hash alike
        PriceKey((price + 0.0).to_bits())
    }
}

/// Sort levels strictly by descending price.
pub fn sort_descending_by<T>(items: &mut [T], price: impl Fn(&T) -> f64) {
    items.sort_by(|a, b| price(b).total_cmp(&price(a)));
}
