// Volume profile (visible range) analysis

use crate::config::{VolumeWeights, VpvrConfig};
use crate::core::scoring::VPVRData;
use crate::core::types::{Kline, VolumeZone};
use tracing::debug;

/// Minimum number of bars for a meaningful profile.
pub const MIN_VPVR_BARS: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct VPVRAnalyzer {
    config: VpvrConfig,
    weights: VolumeWeights,
}

impl VPVRAnalyzer {
    pub fn new(config: VpvrConfig, weights: VolumeWeights) -> Self {
        Self { config, weights }
    }

    /// Build the volume profile of a K-line series.
    ///
    /// Returns None for fewer than 10 bars, a degenerate price range or a
    /// profile without volume.
    pub fn analyze(&self, klines: &[Kline]) -> Option<VPVRData> {
        if klines.len() < MIN_VPVR_BARS || self.config.bucket_count == 0 {
            return None;
        }

        let price_max = klines.iter().map(|k| k.high).fold(f64::NEG_INFINITY, f64::max);
        let price_min = klines.iter().map(|k| k.low).fold(f64::INFINITY, f64::min);

        if !(price_max > price_min) {
            return None;
        }

        let bucket_count = self.config.bucket_count;
        let bucket_size = (price_max - price_min) / bucket_count as f64;
        let bucket_of = |price: f64| -> usize {
            let idx = ((price - price_min) / bucket_size).floor();
            (idx.max(0.0) as usize).min(bucket_count - 1)
        };

        let mut buckets = vec![0.0_f64; bucket_count];

        for kline in klines {
            if !(kline.high > kline.low) || !(kline.volume > 0.0) {
                continue;
            }

            let start = bucket_of(kline.low);
            let end = bucket_of(kline.high);
            let share = kline.volume / (end - start + 1) as f64;

            for bucket in &mut buckets[start..=end] {
                *bucket += share;
            }
        }

        let total_volume: f64 = buckets.iter().sum();
        if total_volume <= 0.0 {
            return None;
        }

        // First maximum wins
        let poc_bucket = buckets
            .iter()
            .enumerate()
            .fold(0, |best, (i, &v)| if v > buckets[best] { i } else { best });
        let poc_price = price_min + (poc_bucket as f64 + 0.5) * bucket_size;

        let mut sorted = buckets.clone();
        sorted.sort_by(|a, b| b.total_cmp(a));
        let percentile = |share: f64| -> f64 {
            let idx = ((sorted.len() as f64 * share) as usize).min(sorted.len() - 1);
            sorted[idx]
        };
        let hvn_cutoff = percentile(self.config.hvn_threshold);
        let lvn_cutoff = percentile(1.0 - self.config.lvn_threshold);

        let mut hvn_zones = Vec::new();
        let mut lvn_zones = Vec::new();
        let bucket_low = |i: usize| price_min + i as f64 * bucket_size;

        let mut i = 0;
        while i < bucket_count {
            let volume = buckets[i];

            if volume >= hvn_cutoff {
                let start = i;
                while i < bucket_count && buckets[i] >= hvn_cutoff {
                    i += 1;
                }
                hvn_zones.push((bucket_low(start), bucket_low(i)));
            } else if volume <= lvn_cutoff {
                let start = i;
                while i < bucket_count && buckets[i] <= lvn_cutoff {
                    i += 1;
                }
                lvn_zones.push((bucket_low(start), bucket_low(i)));
            } else {
                i += 1;
            }
        }

        debug!(
            "VPVR: POC {:.4}, {} HVN zone(s), {} LVN zone(s) over {} bars",
            poc_price,
            hvn_zones.len(),
            lvn_zones.len(),
            klines.len()
        );

        Some(VPVRData {
            poc_price,
            hvn_zones,
            lvn_zones,
            total_volume,
            price_range: (price_min, price_max),
        })
    }

    /// Configured weight for the zone containing `price`.
    pub fn get_volume_weight(&self, price: f64, vpvr: &VPVRData) -> (f64, VolumeZone) {
        let zone = vpvr.get_zone_type(price);
        let weight = match zone {
            VolumeZone::Hvn => self.weights.hvn,
            VolumeZone::Normal => self.weights.normal,
            VolumeZone::Lvn => self.weights.lvn,
        };
        (weight, zone)
    }

    pub fn is_near_poc(&self, price: f64, vpvr: &VPVRData, tolerance: f64) -> bool {
        if vpvr.poc_price <= 0.0 {
            return false;
        }
        (price - vpvr.poc_price).abs() / vpvr.poc_price <= tolerance
    }
}
