// Key Level Grid Library
//
// Multi-timeframe support/resistance level generation with volume profile,
// psychological anchors, resonance scoring and ATR spacing audit

pub mod core;
pub mod analysis;
pub mod config;
pub mod data;   // K-line file loading
pub mod error;  // Unified error handling

// Re-export core types
pub use core::{
    FillType, FilledLevel, FractalKind, FractalPoint, Kline, Layer, LevelRole, LevelScore,
    MTFLevelCandidate, TargetLevel, TrendState, VPVRData, VolumeZone,
};

// Re-export error types
pub use error::{LevelError, LevelResult};

// Re-export configuration
pub use config::{AtrConfig, ConfigError, LevelConfig, LoggingConfig};

// Re-export analysis components
pub use analysis::{
    ATRGapAuditor, AtrCache, AuditResult, FractalExtractor, LevelCalculator, LevelPlan,
    LevelScorer, MTFMerger, PsychologyMatcher, VPVRAnalyzer,
};
