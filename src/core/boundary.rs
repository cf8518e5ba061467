// Manual price boundaries layered on top of the generated levels

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryMode {
    #[default]
    Strict,  // Drop levels outside the bounds
    Filter,  // Keep everything
    Expand,  // Keep everything and make sure the bounds themselves are present
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ManualBoundary {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub upper_price: Option<f64>,
    #[serde(default)]
    pub lower_price: Option<f64>,
    #[serde(default)]
    pub mode: BoundaryMode,
    #[serde(default)]
    pub buffer_pct: f64,
}

impl ManualBoundary {
    fn effective_upper(&self) -> Option<f64> {
        self.upper_price.map(|p| p * (1.0 + self.buffer_pct))
    }

    fn effective_lower(&self) -> Option<f64> {
        self.lower_price.map(|p| p * (1.0 - self.buffer_pct))
    }

    /// Whether a price survives the boundary in the current mode.
    pub fn contains(&self, price: f64) -> bool {
        if !self.enabled || self.mode != BoundaryMode::Strict {
            return true;
        }
        if let Some(upper) = self.effective_upper() {
            if price > upper {
                return false;
            }
        }
        if let Some(lower) = self.effective_lower() {
            if price < lower {
                return false;
            }
        }
        true
    }

    pub fn filter_levels(&self, levels: &[f64]) -> Vec<f64> {
        levels.iter().copied().filter(|&p| self.contains(p)).collect()
    }

    /// Filter, then (Expand mode) add the bounds. Result is descending and unique.
    pub fn apply(&self, auto_levels: &[f64]) -> Vec<f64> {
        if !self.enabled {
            return auto_levels.to_vec();
        }

        let mut result = self.filter_levels(auto_levels);
        result.sort_by(|a, b| b.total_cmp(a));

        if self.mode == BoundaryMode::Expand {
            if let Some(upper) = self.upper_price {
                if result.first().map_or(true, |&top| top < upper) {
                    result.insert(0, upper);
                }
            }
            if let Some(lower) = self.lower_price {
                if result.last().map_or(true, |&bottom| bottom > lower) {
                    result.push(lower);
                }
            }
        }

        result.sort_by(|a, b| b.total_cmp(a));
        result.dedup();
        result
    }
}
