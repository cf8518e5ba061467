// Common types used across the level engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One OHLCV bar. Supplied by the data feed, never mutated here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub timestamp: i64, // Open time in milliseconds
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl Kline {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self { timestamp, open, high, low, close, volume }
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FractalKind {
    High,  // Swing high (resistance candidate)
    Low,   // Swing low (support candidate)
}

/// Timeframe granularity tiers, coarsest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    L1Strategy,  // weekly / 3-day
    L2Skeleton,  // daily
    L3Relay,     // 4h
    L4Tactical,  // 15m
}

impl Layer {
    pub const ALL: [Layer; 4] = [
        Layer::L1Strategy,
        Layer::L2Skeleton,
        Layer::L3Relay,
        Layer::L4Tactical,
    ];

    pub fn default_periods(&self) -> Vec<usize> {
        match self {
            Layer::L1Strategy => vec![8, 21, 55],
            Layer::L2Skeleton => vec![13, 34, 55, 89],
            Layer::L3Relay => vec![8, 21, 55],
            Layer::L4Tactical => vec![34, 55, 144],
        }
    }

    pub fn default_interval(&self) -> &'static str {
        match self {
            Layer::L1Strategy => "1w",
            Layer::L2Skeleton => "1d",
            Layer::L3Relay => "4h",
            Layer::L4Tactical => "15m",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::L1Strategy => write!(f, "L1"),
            Layer::L2Skeleton => write!(f, "L2"),
            Layer::L3Relay => write!(f, "L3"),
            Layer::L4Tactical => write!(f, "L4"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VolumeZone {
    Hvn,     // High volume node
    #[default]
    Normal,
    Lvn,     // Low volume node
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendState {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelRole {
    Support,
    Resistance,
}

impl LevelRole {
    /// Fractal kind that produces levels for this role.
    pub fn fractal_kind(&self) -> FractalKind {
        match self {
            LevelRole::Support => FractalKind::Low,
            LevelRole::Resistance => FractalKind::High,
        }
    }
}

impl fmt::Display for LevelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelRole::Support => write!(f, "support"),
            LevelRole::Resistance => write!(f, "resistance"),
        }
    }
}

/// Sparse-gap fill strategies, tried in configured order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillType {
    Tactical,
    Vpvr,
    Fibonacci,
}

impl fmt::Display for FillType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FillType::Tactical => write!(f, "tactical"),
            FillType::Vpvr => write!(f, "vpvr"),
            FillType::Fibonacci => write!(f, "fibonacci"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PsychologyKind {
    Fib,
    Round,
}
