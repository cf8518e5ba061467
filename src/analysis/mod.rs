// Level analysis: extraction, profiling, merging, scoring and auditing

pub mod fractal;
pub mod vpvr;
pub mod psychology;
pub mod mtf_merger;
pub mod trend;
pub mod scorer;
pub mod atr_gap_auditor;
pub mod level_calculator;

pub use fractal::{get_anchor_price, FractalExtractor};
pub use vpvr::VPVRAnalyzer;
pub use psychology::{PsychologyLevel, PsychologyMatcher};
pub use mtf_merger::{select_top_levels, MTFMerger};
pub use trend::determine_trend;
pub use scorer::LevelScorer;
pub use atr_gap_auditor::{ATRGapAuditor, AtrCache, AuditResult};
pub use level_calculator::{KlinesByTimeframe, LevelCalculator, LevelPlan};
