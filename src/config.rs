// Configuration management for the level engine

use crate::core::boundary::ManualBoundary;
use crate::core::types::{FillType, Layer, LevelRole, TrendState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerConfig {
    pub interval: String,
    pub periods: Vec<usize>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl LayerConfig {
    fn for_layer(layer: Layer) -> Self {
        Self {
            interval: layer.default_interval().to_string(),
            periods: layer.default_periods(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSet {
    #[serde(default = "default_l1")]
    pub l1_strategy: LayerConfig,
    #[serde(default = "default_l2")]
    pub l2_skeleton: LayerConfig,
    #[serde(default = "default_l3")]
    pub l3_relay: LayerConfig,
    #[serde(default = "default_l4")]
    pub l4_tactical: LayerConfig,
}

impl Default for LayerSet {
    fn default() -> Self {
        Self {
            l1_strategy: default_l1(),
            l2_skeleton: default_l2(),
            l3_relay: default_l3(),
            l4_tactical: default_l4(),
        }
    }
}

impl LayerSet {
    pub fn get(&self, layer: Layer) -> &LayerConfig {
        match layer {
            Layer::L1Strategy => &self.l1_strategy,
            Layer::L2Skeleton => &self.l2_skeleton,
            Layer::L3Relay => &self.l3_relay,
            Layer::L4Tactical => &self.l4_tactical,
        }
    }

    /// First enabled layer whose interval matches the timeframe label.
    pub fn layer_for_interval(&self, timeframe: &str) -> Option<Layer> {
        Layer::ALL
            .into_iter()
            .find(|&layer| {
                let cfg = self.get(layer);
                cfg.enabled && cfg.interval == timeframe
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FractalConfig {
    pub lookback: Vec<usize>,       // Used for timeframes without a layer
    pub dedup_tolerance: f64,       // Relative price tolerance (0.1%)
    pub layers: LayerSet,
}

impl Default for FractalConfig {
    fn default() -> Self {
        Self {
            lookback: vec![8, 13, 21, 34, 55, 89],
            dedup_tolerance: 0.001,
            layers: LayerSet::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VpvrConfig {
    pub bucket_count: usize,
    pub hvn_threshold: f64,   // Top share of buckets treated as HVN
    pub lvn_threshold: f64,   // Bottom share of buckets treated as LVN
}

impl Default for VpvrConfig {
    fn default() -> Self {
        Self {
            bucket_count: 50,
            hvn_threshold: 0.20,
            lvn_threshold: 0.10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PsychologyConfig {
    pub fib_ratios: Vec<f64>,
    pub snap_tolerance: f64,
}

impl Default for PsychologyConfig {
    fn default() -> Self {
        Self {
            fib_ratios: vec![0.236, 0.382, 0.5, 0.618, 0.786, 1.0, 1.272, 1.618],
            snap_tolerance: 0.01,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MtfConfig {
    pub merge_tolerance: f64,
    pub timeframe_priority: Vec<String>,  // Highest priority first
}

impl Default for MtfConfig {
    fn default() -> Self {
        Self {
            merge_tolerance: 0.005,
            timeframe_priority: vec!["1d".to_string(), "4h".to_string(), "15m".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeWeights {
    pub hvn: f64,
    pub normal: f64,
    pub lvn: f64,
}

impl Default for VolumeWeights {
    fn default() -> Self {
        Self { hvn: 1.3, normal: 1.0, lvn: 0.6 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoleCoefficients {
    pub support: f64,
    pub resistance: f64,
}

impl RoleCoefficients {
    pub fn for_role(&self, role: LevelRole) -> f64 {
        match role {
            LevelRole::Support => self.support,
            LevelRole::Resistance => self.resistance,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendCoefficients {
    pub bullish: RoleCoefficients,
    pub bearish: RoleCoefficients,
    pub neutral: RoleCoefficients,
}

impl Default for TrendCoefficients {
    fn default() -> Self {
        Self {
            bullish: RoleCoefficients { support: 1.1, resistance: 0.9 },
            bearish: RoleCoefficients { support: 0.9, resistance: 1.1 },
            neutral: RoleCoefficients { support: 1.0, resistance: 1.0 },
        }
    }
}

impl TrendCoefficients {
    pub fn lookup(&self, trend: TrendState, role: LevelRole) -> f64 {
        let row = match trend {
            TrendState::Bullish => &self.bullish,
            TrendState::Bearish => &self.bearish,
            TrendState::Neutral => &self.neutral,
        };
        row.for_role(role)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreThresholds {
    pub mtf_resonance: f64,  // qty ×1.5
    pub strong: f64,         // qty ×1.2
    pub normal: f64,         // qty ×1.0
}

impl Default for ScoreThresholds {
    fn default() -> Self {
        Self { mtf_resonance: 100.0, strong: 60.0, normal: 30.0 }
    }
}

/// Built-in resonance coefficients, consulted after the configured table.
pub const DEFAULT_MTF_RESONANCE: [(&str, f64); 4] = [
    ("1d,4h,15m", 2.0),
    ("1d,4h", 1.5),
    ("1d,15m", 1.3),
    ("4h,15m", 1.2),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub timeframe_weights: BTreeMap<String, f64>,
    pub default_timeframe_weight: f64,
    pub period_scores: BTreeMap<String, f64>,  // "55" -> 80
    pub default_period_score: f64,
    pub volume_weights: VolumeWeights,
    pub psychology_weight: f64,
    pub trend_coefficients: TrendCoefficients,
    pub mtf_resonance: BTreeMap<String, f64>,  // "1d,4h" -> 1.5
    pub thresholds: ScoreThresholds,
    pub min_score_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            timeframe_weights: string_map(&[("1d", 1.5), ("4h", 1.0), ("15m", 0.6)]),
            default_timeframe_weight: 1.0,
            period_scores: string_map(&[
                ("89", 80.0),
                ("55", 80.0),
                ("34", 50.0),
                ("21", 50.0),
                ("13", 20.0),
                ("8", 20.0),
            ]),
            default_period_score: 20.0,
            volume_weights: VolumeWeights::default(),
            psychology_weight: 1.2,
            trend_coefficients: TrendCoefficients::default(),
            mtf_resonance: string_map(&DEFAULT_MTF_RESONANCE),
            thresholds: ScoreThresholds::default(),
            min_score_threshold: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub min_distance_pct: f64,
    pub max_distance_pct: f64,
    pub max_levels: usize,
    pub main_timeframe: String,  // Series used for VPVR, psychology, trend and ATR
    pub trend_ema_fast: usize,
    pub trend_ema_slow: usize,
    pub anchor_lookback: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_distance_pct: 0.001,
            max_distance_pct: 0.30,
            max_levels: 10,
            main_timeframe: "4h".to_string(),
            trend_ema_fast: 144,
            trend_ema_slow: 169,
            anchor_lookback: 55,
        }
    }
}

/// Energy multipliers used when two levels collide in the density pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyWeights {
    pub hvn: f64,
    pub lvn: f64,
    pub poc: f64,
    pub poc_tolerance: f64,
    pub resonance: f64,
}

impl Default for EnergyWeights {
    fn default() -> Self {
        Self {
            hvn: 1.5,
            lvn: 0.4,
            poc: 1.8,
            poc_tolerance: 0.003,
            resonance: 1.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FillScores {
    pub poc: f64,
    pub hvn: f64,
    pub tactical_periods: BTreeMap<String, f64>,
    pub tactical_default: f64,
    pub tactical_hvn: f64,
    pub tactical_lvn: f64,
}

impl Default for FillScores {
    fn default() -> Self {
        Self {
            poc: 80.0,
            hvn: 60.0,
            tactical_periods: string_map(&[("144", 60.0), ("55", 50.0), ("34", 40.0)]),
            tactical_default: 35.0,
            tactical_hvn: 1.3,
            tactical_lvn: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AtrConfig {
    pub enabled: bool,
    pub atr_period: usize,
    pub gap_min_atr_ratio: f64,
    pub gap_max_atr_ratio: f64,
    pub fill_priority: Vec<FillType>,
    pub fibonacci_enabled: bool,
    pub fibonacci_fill_ratio: f64,
    pub fibonacci_fill_score: f64,
    pub energy: EnergyWeights,
    pub fill_scores: FillScores,
}

impl Default for AtrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            atr_period: 14,
            gap_min_atr_ratio: 0.5,
            gap_max_atr_ratio: 3.0,
            fill_priority: vec![FillType::Tactical, FillType::Vpvr, FillType::Fibonacci],
            fibonacci_enabled: true,
            fibonacci_fill_ratio: 0.618,
            fibonacci_fill_score: 35.0,
            energy: EnergyWeights::default(),
            fill_scores: FillScores::default(),
        }
    }
}

impl AtrConfig {
    pub fn min_gap(&self, atr: f64) -> f64 {
        self.gap_min_atr_ratio * atr
    }

    pub fn max_gap(&self, atr: f64) -> f64 {
        self.gap_max_atr_ratio * atr
    }

    pub fn is_too_dense(&self, gap: f64, atr: f64) -> bool {
        gap < self.min_gap(atr)
    }

    pub fn is_too_sparse(&self, gap: f64, atr: f64) -> bool {
        gap > self.max_gap(atr)
    }

    /// Fill point measured up from the lower edge of the gap.
    pub fn get_fibonacci_fill_price(&self, upper: f64, lower: f64) -> f64 {
        lower + (upper - lower) * self.fibonacci_fill_ratio
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub log_audit_details: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_audit_details: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LevelConfig {
    #[serde(default)]
    pub fractal: FractalConfig,
    #[serde(default)]
    pub vpvr: VpvrConfig,
    #[serde(default)]
    pub psychology: PsychologyConfig,
    #[serde(default)]
    pub mtf: MtfConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub boundary: ManualBoundary,
    #[serde(default)]
    pub atr: AtrConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl LevelConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(e.to_string()))?;

        let config: LevelConfig = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        fs::write(path, content)
            .map_err(|e| ConfigError::FileWrite(e.to_string()))?;

        Ok(())
    }

    /// Load configuration from file, or create default if file doesn't exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            let config = Self::default();
            config.to_file(&path)?;
            tracing::info!("📁 Created default config file: {}", path.as_ref().display());
            Ok(config)
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fractal.dedup_tolerance < 0.0 {
            return Err(ConfigError::Validation("fractal.dedup_tolerance must be non-negative".to_string()));
        }

        if self.fractal.lookback.iter().any(|&p| p == 0) {
            return Err(ConfigError::Validation("fractal.lookback periods must be greater than 0".to_string()));
        }

        for layer in Layer::ALL {
            if self.fractal.layers.get(layer).periods.iter().any(|&p| p == 0) {
                return Err(ConfigError::Validation(format!("{} periods must be greater than 0", layer)));
            }
        }

        if self.vpvr.bucket_count == 0 {
            return Err(ConfigError::Validation("vpvr.bucket_count must be greater than 0".to_string()));
        }

        if !(0.0..1.0).contains(&self.vpvr.hvn_threshold) || !(0.0..1.0).contains(&self.vpvr.lvn_threshold) {
            return Err(ConfigError::Validation("vpvr thresholds must be in [0, 1)".to_string()));
        }

        if self.psychology.snap_tolerance < 0.0 {
            return Err(ConfigError::Validation("psychology.snap_tolerance must be non-negative".to_string()));
        }

        if self.mtf.merge_tolerance < 0.0 {
            return Err(ConfigError::Validation("mtf.merge_tolerance must be non-negative".to_string()));
        }

        let weights = &self.scoring.volume_weights;
        if weights.hvn < 0.0 || weights.normal < 0.0 || weights.lvn < 0.0 || self.scoring.psychology_weight < 0.0 {
            return Err(ConfigError::Validation("scoring weights must be non-negative".to_string()));
        }

        for key in self.scoring.period_scores.keys() {
            if key.trim().parse::<usize>().is_err() {
                return Err(ConfigError::Validation(format!("scoring.period_scores key '{}' is not a period", key)));
            }
        }

        if self.selection.min_distance_pct > self.selection.max_distance_pct {
            return Err(ConfigError::Validation("selection.min_distance_pct must not exceed max_distance_pct".to_string()));
        }

        if self.atr.atr_period == 0 {
            return Err(ConfigError::Validation("atr.atr_period must be greater than 0".to_string()));
        }

        if self.atr.gap_min_atr_ratio <= 0.0 || self.atr.gap_min_atr_ratio >= self.atr.gap_max_atr_ratio {
            return Err(ConfigError::Validation("atr.gap_min_atr_ratio must be positive and below gap_max_atr_ratio".to_string()));
        }

        if self.atr.fibonacci_fill_ratio <= 0.0 || self.atr.fibonacci_fill_ratio >= 1.0 {
            return Err(ConfigError::Validation("atr.fibonacci_fill_ratio must be between 0 and 1".to_string()));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(String),

    #[error("Failed to write config file: {0}")]
    FileWrite(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

fn default_true() -> bool { true }
fn default_l1() -> LayerConfig { LayerConfig::for_layer(Layer::L1Strategy) }
fn default_l2() -> LayerConfig { LayerConfig::for_layer(Layer::L2Skeleton) }
fn default_l3() -> LayerConfig { LayerConfig::for_layer(Layer::L3Relay) }
fn default_l4() -> LayerConfig { LayerConfig::for_layer(Layer::L4Tactical) }

fn string_map(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
    entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}
