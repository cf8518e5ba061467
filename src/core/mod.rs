// Core data model of the level engine

pub mod types;
pub mod scoring;
pub mod boundary;

// Re-export commonly used types
pub use types::{FillType, FractalKind, Kline, Layer, LevelRole, PsychologyKind, TrendState, VolumeZone};
pub use scoring::{FilledLevel, FractalPoint, LevelScore, LevelSource, MTFLevelCandidate, PriceKey, TargetLevel, VPVRData, VpvrAnchor};
pub use boundary::{BoundaryMode, ManualBoundary};
