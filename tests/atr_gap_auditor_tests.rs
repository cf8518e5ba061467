// Integration tests for the ATR spacing audit

mod common;

use common::{
    approx_eq, assert_gaps_within, assert_strictly_descending, bar, level, levels, prices,
    tactical_fractal,
};
use key_level_grid::analysis::{ATRGapAuditor, AtrCache};
use key_level_grid::config::AtrConfig;
use key_level_grid::core::scoring::{FractalPoint, MTFLevelCandidate, TargetLevel, VPVRData, VpvrAnchor};
use key_level_grid::core::types::{FillType, Kline, Layer};
use key_level_grid::LevelScore;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn vpvr(poc: f64, hvn: Vec<(f64, f64)>, lvn: Vec<(f64, f64)>) -> VPVRData {
    VPVRData {
        poc_price: poc,
        hvn_zones: hvn,
        lvn_zones: lvn,
        total_volume: 1_000.0,
        price_range: (0.0, 1_000.0),
    }
}

fn fibonacci_only() -> AtrConfig {
    AtrConfig {
        fill_priority: vec![FillType::Fibonacci],
        ..AtrConfig::default()
    }
}

/// Bars with a constant true range of 2
fn constant_range_klines(count: usize) -> Vec<Kline> {
    (0..count).map(|i| bar(i, 100.0, 1.0, 10.0)).collect()
}

#[test]
fn test_audit_scenario() {
    let auditor = ATRGapAuditor::default();
    let input = levels(&[(105.0, 50.0), (104.8, 40.0), (100.0, 50.0), (90.0, 50.0)]);

    let (audited, result) = auditor.audit(input, Some(2.0), None);
    let audited_prices = prices(&audited);

    // Density: 104.8 collides with 105 and has less energy
    assert_eq!(result.trimmed_prices, vec![104.8]);

    // Sparse: 100..90 is filled at its 0.618 point, the 6.18 remainder once more
    let first = &result.filled_levels[0];
    assert_eq!(first.fill_type, FillType::Fibonacci);
    assert!(approx_eq(first.price, 96.18));
    assert_eq!(first.score, 35.0);
    assert_eq!((first.gap_upper, first.gap_lower), (100.0, 90.0));

    assert_eq!(result.filled_count, 2);
    assert_eq!(result.final_count, 5);
    assert_eq!(result.original_count, 4);
    assert_eq!(result.atr_value, 2.0);
    assert!(!result.iteration_cap_hit);
    assert!(result.residual_gaps.is_empty());

    assert_strictly_descending(&audited_prices);
    assert_gaps_within(&audited_prices, 1.0, 6.0);
    assert_eq!(audited_prices[0], 105.0);
}

#[test]
fn test_higher_energy_replaces_kept_level() {
    let auditor = ATRGapAuditor::default();
    let input = levels(&[(105.0, 40.0), (104.8, 50.0), (100.0, 50.0)]);

    let (audited, result) = auditor.audit(input, Some(2.0), None);

    assert_eq!(result.trimmed_prices, vec![105.0]);
    assert_eq!(prices(&audited), vec![104.8, 100.0]);
}

#[test]
fn test_trim_prefers_hvn_over_lvn() {
    let profile = vpvr(200.0, vec![(94.99, 95.01)], vec![(94.9, 94.96)]);
    let auditor = ATRGapAuditor::default().with_vpvr(Some(profile));
    let input = levels(&[(95.0, 40.0), (94.95, 60.0)]);

    let (audited, result) = auditor.audit(input, Some(200.0), None);

    // 40 × 1.5 beats 60 × 0.4
    assert_eq!(prices(&audited), vec![95.0]);
    assert_eq!(result.trimmed_prices, vec![94.95]);
}

#[test]
fn test_poc_and_resonance_energy() {
    let profile = vpvr(100.0, Vec::new(), Vec::new());
    let auditor = ATRGapAuditor::default().with_vpvr(Some(profile));

    let near_poc = level(100.1, 50.0);
    assert!(approx_eq(auditor.energy_score(&near_poc), 90.0));

    let mut resonant = level(110.0, 50.0);
    resonant.is_resonance = true;
    assert!(approx_eq(auditor.energy_score(&resonant), 60.0));
}

#[test]
fn test_compliant_list_is_unchanged() {
    let profile = vpvr(104.0, vec![(103.5, 104.5)], vec![(99.0, 99.5)]);
    let pool = vec![tactical_fractal(107.0, 55), tactical_fractal(101.0, 34)];
    let auditor = ATRGapAuditor::default()
        .with_vpvr(Some(profile))
        .with_tactical_pool(pool);
    let input = levels(&[(110.0, 50.0), (106.0, 40.0), (102.0, 60.0), (98.0, 30.0)]);

    let (audited, result) = auditor.audit(input.clone(), Some(2.0), None);

    assert_eq!(audited, input);
    assert_eq!(result.trimmed_count, 0);
    assert_eq!(result.filled_count, 0);
    assert_eq!(result.iterations, 1);
}

#[test]
fn test_disabled_audit_passes_through() {
    let config = AtrConfig {
        enabled: false,
        ..AtrConfig::default()
    };
    let auditor = ATRGapAuditor::new(config);
    let input = levels(&[(100.0, 50.0), (99.9, 50.0), (50.0, 50.0)]);

    let (audited, result) = auditor.audit(input.clone(), Some(2.0), None);

    assert_eq!(audited, input);
    assert_eq!(result.original_count, 3);
    assert_eq!(result.final_count, 3);
    assert_eq!(result.trimmed_count + result.filled_count, 0);
}

#[test]
fn test_unresolvable_atr_passes_through() {
    let auditor = ATRGapAuditor::default();
    let input = levels(&[(100.0, 50.0), (99.9, 50.0)]);

    let (audited, result) = auditor.audit(input.clone(), None, None);
    assert_eq!(audited, input);
    assert_eq!(result.atr_value, 0.0);

    let (audited, _) = auditor.audit(input.clone(), Some(0.0), None);
    assert_eq!(audited, input);

    let short = constant_range_klines(5);
    let (audited, _) = auditor.audit(input.clone(), None, Some(&short));
    assert_eq!(audited, input);
}

#[test]
fn test_atr_from_klines() {
    let auditor = ATRGapAuditor::default();
    let klines = constant_range_klines(20);

    assert_eq!(auditor.calculate_atr(&klines, None), Some(2.0));
    assert_eq!(auditor.calculate_atr(&klines, Some(5)), Some(2.0));
    assert_eq!(auditor.calculate_atr(&klines[..14], None), None);
    assert_eq!(auditor.calculate_atr(&klines[..15], None), Some(2.0));

    let (_, result) = auditor.audit(levels(&[(100.0, 50.0), (95.0, 50.0)]), None, Some(&klines));
    assert_eq!(result.atr_value, 2.0);
}

#[test]
fn test_atr_uses_previous_close() {
    let auditor = ATRGapAuditor::default();
    let klines = vec![
        Kline::new(0, 100.0, 101.0, 99.0, 100.0, 1.0),
        Kline::new(1, 104.0, 105.0, 103.0, 104.0, 1.0),
        Kline::new(2, 104.0, 105.0, 103.0, 104.0, 1.0),
    ];

    // TR: max(2, 5, 3) = 5, then 2
    assert_eq!(auditor.calculate_atr(&klines, Some(2)), Some(3.5));
}

#[test]
fn test_tactical_fill_prefers_largest_period() {
    let pool = vec![
        tactical_fractal(95.0, 34),
        tactical_fractal(94.0, 55),
        // Too close to the upper edge for min_gap = 1
        tactical_fractal(99.5, 144),
    ];
    let auditor = ATRGapAuditor::default().with_tactical_pool(pool);

    let (audited, result) = auditor.audit(levels(&[(100.0, 50.0), (90.0, 50.0)]), Some(2.0), None);

    assert_eq!(result.filled_count, 1);
    let fill = &result.filled_levels[0];
    assert_eq!(fill.fill_type, FillType::Tactical);
    assert_eq!(fill.price, 94.0);
    assert_eq!(fill.score, 50.0);
    assert_eq!(fill.source_layer, Some(Layer::L4Tactical));
    assert_eq!(prices(&audited), vec![100.0, 94.0, 90.0]);

    let filled = &audited[1];
    assert!(filled.is_filled());
    assert_eq!(filled.fill_type(), Some(FillType::Tactical));
    assert!(filled.breakdown().is_none());
}

#[test]
fn test_tactical_score_follows_volume_zone() {
    let pool = vec![tactical_fractal(94.0, 55)];
    let profile = vpvr(200.0, vec![(93.0, 95.0)], Vec::new());
    let auditor = ATRGapAuditor::default()
        .with_tactical_pool(pool.clone())
        .with_vpvr(Some(profile));

    let (_, result) = auditor.audit(levels(&[(100.0, 50.0), (90.0, 50.0)]), Some(2.0), None);
    assert_eq!(result.filled_levels[0].score, 65.0);

    let profile = vpvr(200.0, Vec::new(), vec![(93.0, 95.0)]);
    let auditor = ATRGapAuditor::default()
        .with_tactical_pool(pool)
        .with_vpvr(Some(profile));

    let (_, result) = auditor.audit(levels(&[(100.0, 50.0), (90.0, 50.0)]), Some(2.0), None);
    assert_eq!(result.filled_levels[0].score, 35.0);
}

#[test]
fn test_vpvr_fill_uses_poc_then_hvn() {
    let config = AtrConfig {
        fill_priority: vec![FillType::Vpvr, FillType::Fibonacci],
        ..AtrConfig::default()
    };

    let auditor = ATRGapAuditor::new(config.clone()).with_vpvr(Some(vpvr(95.0, Vec::new(), Vec::new())));
    let (audited, result) = auditor.audit(levels(&[(100.0, 50.0), (90.0, 50.0)]), Some(2.0), None);
    let fill = &result.filled_levels[0];
    assert_eq!(fill.fill_type, FillType::Vpvr);
    assert_eq!(fill.vpvr_anchor, Some(VpvrAnchor::Poc));
    assert_eq!(fill.score, 80.0);
    assert_eq!(prices(&audited), vec![100.0, 95.0, 90.0]);

    let auditor = ATRGapAuditor::new(config).with_vpvr(Some(vpvr(120.0, vec![(93.0, 95.0)], Vec::new())));
    let (audited, result) = auditor.audit(levels(&[(100.0, 50.0), (90.0, 50.0)]), Some(2.0), None);
    let fill = &result.filled_levels[0];
    assert_eq!(fill.vpvr_anchor, Some(VpvrAnchor::Hvn));
    assert_eq!(fill.price, 94.0);
    assert_eq!(fill.score, 60.0);
    assert_eq!(prices(&audited), vec![100.0, 94.0, 90.0]);
}

#[test]
fn test_chain_falls_through_without_sources() {
    let auditor = ATRGapAuditor::default();
    let (_, result) = auditor.audit(levels(&[(100.0, 50.0), (90.0, 50.0)]), Some(2.0), None);

    assert!(result.filled_levels.iter().all(|f| f.fill_type == FillType::Fibonacci));
}

#[test]
fn test_fibonacci_disabled_leaves_residual_gap() {
    let config = AtrConfig {
        fibonacci_enabled: false,
        ..AtrConfig::default()
    };
    let auditor = ATRGapAuditor::new(config);

    let (audited, result) = auditor.audit(levels(&[(100.0, 50.0), (90.0, 50.0)]), Some(2.0), None);

    assert_eq!(prices(&audited), vec![100.0, 90.0]);
    assert_eq!(result.filled_count, 0);
    assert_eq!(result.residual_gaps, vec![(100.0, 90.0)]);
    assert!(!result.iteration_cap_hit);
}

#[test]
fn test_iteration_cap_is_flagged() {
    let auditor = ATRGapAuditor::new(fibonacci_only()).with_max_iterations(1);

    let (audited, result) = auditor.audit(levels(&[(100.0, 50.0), (80.0, 50.0)]), Some(2.0), None);

    assert_eq!(result.iterations, 1);
    assert_eq!(result.filled_count, 1);
    assert!(result.iteration_cap_hit);
    assert_eq!(result.residual_gaps.len(), 2);
    assert_strictly_descending(&prices(&audited));
}

#[test]
fn test_wide_gap_converges_below_cap() {
    let auditor = ATRGapAuditor::new(fibonacci_only());

    let (audited, result) = auditor.audit(levels(&[(1_000.0, 50.0), (100.0, 50.0)]), Some(2.0), None);
    let audited_prices = prices(&audited);

    assert!(!result.iteration_cap_hit);
    assert!(result.iterations < 100);
    assert_strictly_descending(&audited_prices);
    assert_gaps_within(&audited_prices, 1.0, 6.0);
}

#[test]
fn test_unsorted_input_is_sorted() {
    let auditor = ATRGapAuditor::default();
    let input = levels(&[(90.0, 50.0), (100.0, 50.0), (95.0, 50.0)]);

    let (audited, _) = auditor.audit(input, Some(2.0), None);
    assert_eq!(prices(&audited), vec![100.0, 95.0, 90.0]);
}

#[test]
fn test_audit_with_cache() {
    let auditor = ATRGapAuditor::default();
    let mut cache = AtrCache::new();
    let klines = constant_range_klines(20);
    let input = levels(&[(100.0, 50.0), (99.5, 40.0), (95.0, 50.0)]);

    let (_, first) = auditor.audit_with_cache(input.clone(), &mut cache, "BTCUSDT", "4h", Some(&klines));
    assert_eq!(first.atr_value, 2.0);
    assert_eq!(cache.get("BTCUSDT", "4h"), Some(2.0));

    let (_, second) = auditor.audit_with_cache(input.clone(), &mut cache, "BTCUSDT", "4h", None);
    assert_eq!(second, first);

    // Another symbol shares nothing
    let (audited, other) = auditor.audit_with_cache(input.clone(), &mut cache, "ETHUSDT", "4h", None);
    assert_eq!(audited, input);
    assert_eq!(other.atr_value, 0.0);
}

#[test]
fn test_random_lists_respect_bounds() {
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..50 {
        let count = rng.gen_range(0..20);
        let input: Vec<TargetLevel> = (0..count)
            .map(|_| {
                let price = (rng.gen_range(100.0..200.0_f64) * 10.0).round() / 10.0;
                let score = rng.gen_range(10.0..120.0);
                level(price, score)
            })
            .collect();
        let atr = rng.gen_range(0.5..5.0);

        let pool: Vec<FractalPoint> = (0..10)
            .map(|_| tactical_fractal(rng.gen_range(100.0..200.0), [34, 55, 144][rng.gen_range(0..3)]))
            .collect();
        let auditor = ATRGapAuditor::default()
            .with_tactical_pool(pool)
            .with_vpvr(Some(vpvr(150.0, vec![(140.0, 145.0)], vec![(180.0, 190.0)])));

        let (audited, result) = auditor.audit(input, Some(atr), None);
        let audited_prices = prices(&audited);

        assert!(!result.iteration_cap_hit);
        assert_eq!(result.final_count, audited.len());
        assert_eq!(result.trimmed_count, result.trimmed_prices.len());
        assert_eq!(result.filled_count, result.filled_levels.len());
        assert_strictly_descending(&audited_prices);
        assert_gaps_within(&audited_prices, 0.5 * atr, 3.0 * atr);
    }
}

#[test]
fn test_filled_levels_round_trip_through_json() {
    let auditor = ATRGapAuditor::default();
    let (_, result) = auditor.audit(levels(&[(100.0, 50.0), (90.0, 50.0)]), Some(2.0), None);

    let json = serde_json::to_string(&result).expect("serialize audit result");
    assert!(json.contains("\"filled_levels\""));
    assert!(json.contains("\"fibonacci\""));
}

#[test]
fn test_fractal_levels_keep_breakdown() {
    let score = LevelScore::flat(70.0);
    let candidate = MTFLevelCandidate::from_fractal(tactical_fractal(100.0, 55));
    let target = TargetLevel::from_candidate(candidate, Some(score.clone()));

    let (audited, _) = ATRGapAuditor::default().audit(vec![target], Some(2.0), None);

    assert_eq!(audited[0].breakdown(), Some(&score));
    assert_eq!(audited[0].score, 70.0);
}

#[test]
fn test_non_positive_prices_are_dropped() {
    let auditor = ATRGapAuditor::default();
    let input = levels(&[(100.0, 50.0), (100.0, 40.0), (0.0, 50.0), (-3.0, 50.0)]);

    let (audited, result) = auditor.audit(input, Some(2.0), None);

    assert_eq!(prices(&audited), vec![100.0]);
    assert_eq!(result.original_count, 4);
    assert_eq!(result.trimmed_prices, vec![100.0]);
    assert_eq!(result.filled_count, 0);
    assert_eq!(result.final_count, 1);
    assert!(result.residual_gaps.is_empty());
}
