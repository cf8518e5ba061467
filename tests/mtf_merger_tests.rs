// Integration tests for cross-timeframe merging

mod common;

use common::{candidate, fractal};
use key_level_grid::analysis::{select_top_levels, MTFMerger};
use key_level_grid::config::MtfConfig;
use key_level_grid::core::scoring::{FractalPoint, LevelScore, PriceKey};
use key_level_grid::core::types::FractalKind;
use std::collections::{BTreeMap, HashMap};

fn by_tf(points: Vec<FractalPoint>) -> BTreeMap<String, Vec<FractalPoint>> {
    let mut map: BTreeMap<String, Vec<FractalPoint>> = BTreeMap::new();
    for p in points {
        map.entry(p.timeframe.clone()).or_default().push(p);
    }
    map
}

#[test]
fn test_resonance_across_timeframes() {
    let merger = MTFMerger::default();
    let input = by_tf(vec![
        fractal(100.0, "1d", 55, FractalKind::Low),
        fractal(100.3, "4h", 21, FractalKind::Low),
        fractal(120.0, "15m", 34, FractalKind::High),
    ]);

    let candidates = merger.merge_fractals(&input);

    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].merged_price, 120.0);
    assert!(!candidates[0].is_resonance);

    let resonant = &candidates[1];
    assert!(resonant.is_resonance);
    assert_eq!(resonant.price, 100.3);
    assert_eq!(resonant.merged_price, 100.0);
    assert_eq!(resonant.source_fractals.len(), 2);
    assert!(resonant.source_timeframes.contains("1d"));
    assert!(resonant.source_timeframes.contains("4h"));
}

#[test]
fn test_clustering_is_seed_relative() {
    let merger = MTFMerger::default();
    let input = by_tf(vec![
        fractal(100.0, "4h", 21, FractalKind::Low),
        fractal(100.4, "4h", 21, FractalKind::Low),
        fractal(100.8, "4h", 21, FractalKind::Low),
    ]);

    let candidates = merger.merge_fractals(&input);

    // 100.4 joins the 100.8 seed; 100.0 is too far from that seed
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].source_fractals.len(), 2);
    assert_eq!(candidates[1].merged_price, 100.0);
    assert!(candidates.iter().all(|c| !c.is_resonance));
}

#[test]
fn test_unprioritised_timeframes_are_ignored() {
    let merger = MTFMerger::default();
    let input = by_tf(vec![fractal(100.0, "1w", 55, FractalKind::Low)]);
    assert!(merger.merge_fractals(&input).is_empty());
    assert!(merger.merge_fractals(&BTreeMap::new()).is_empty());
}

#[test]
fn test_custom_priority_picks_merged_price() {
    let merger = MTFMerger::new(MtfConfig {
        merge_tolerance: 0.005,
        timeframe_priority: vec!["15m".to_string(), "4h".to_string()],
    });
    let input = by_tf(vec![
        fractal(100.2, "4h", 21, FractalKind::Low),
        fractal(100.0, "15m", 34, FractalKind::Low),
    ]);

    let candidates = merger.merge_fractals(&input);

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].merged_price, 100.0);
}

#[test]
fn test_merge_is_deterministic() {
    let merger = MTFMerger::default();
    let input = by_tf(vec![
        fractal(101.0, "1d", 55, FractalKind::High),
        fractal(100.9, "4h", 21, FractalKind::High),
        fractal(95.0, "4h", 8, FractalKind::Low),
        fractal(95.1, "15m", 34, FractalKind::Low),
        fractal(90.0, "15m", 55, FractalKind::Low),
    ]);

    assert_eq!(merger.merge_fractals(&input), merger.merge_fractals(&input));
}

#[test]
fn test_filter_by_type() {
    let merger = MTFMerger::default();
    let input = by_tf(vec![
        fractal(110.0, "4h", 21, FractalKind::High),
        fractal(90.0, "4h", 21, FractalKind::Low),
    ]);
    let candidates = merger.merge_fractals(&input);

    let lows = merger.filter_by_type(candidates.clone(), FractalKind::Low);
    assert_eq!(lows.len(), 1);
    assert_eq!(lows[0].merged_price, 90.0);

    let highs = merger.filter_by_type(candidates, FractalKind::High);
    assert_eq!(highs.len(), 1);
    assert_eq!(highs[0].merged_price, 110.0);
}

#[test]
fn test_filter_by_distance() {
    let merger = MTFMerger::default();
    let candidates = vec![
        candidate(100.05, &[("4h", 21)]),
        candidate(95.0, &[("4h", 21)]),
        candidate(60.0, &[("4h", 21)]),
    ];

    let kept = merger.filter_by_distance(candidates.clone(), 100.0, 0.001, 0.30);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].merged_price, 95.0);

    // Non-positive price disables the filter
    assert_eq!(merger.filter_by_distance(candidates, 0.0, 0.001, 0.30).len(), 3);
}

#[test]
fn test_select_top_levels() {
    let candidates = vec![
        candidate(110.0, &[("4h", 21)]),
        candidate(100.0, &[("4h", 55)]),
        candidate(90.0, &[("4h", 8)]),
        candidate(80.0, &[("4h", 8)]),
    ];

    let mut scores = HashMap::new();
    scores.insert(PriceKey::from(110.0), LevelScore::flat(50.0));
    scores.insert(PriceKey::from(100.0), LevelScore::flat(80.0));
    scores.insert(PriceKey::from(90.0), LevelScore::flat(20.0));
    // 80.0 is unscored

    let top = select_top_levels(&candidates, &scores, 2);
    let prices: Vec<f64> = top.iter().map(|(p, _)| *p).collect();
    assert_eq!(prices, vec![100.0, 110.0]);

    let all = select_top_levels(&candidates, &scores, 10);
    assert_eq!(all.len(), 3);
}
