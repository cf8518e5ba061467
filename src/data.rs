// K-line file loading for the CLI and tests

use crate::analysis::level_calculator::KlinesByTimeframe;
use crate::core::types::Kline;
use crate::error::{LevelError, LevelResult};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Load a JSON file keyed by timeframe.
///
/// Bars may be objects (`{"timestamp": .., "open": .., ...}`) or exchange
/// style arrays (`[timestamp, open, high, low, close, volume]`, numbers or
/// numeric strings).
pub fn load_klines_json<P: AsRef<Path>>(path: P) -> LevelResult<KlinesByTimeframe> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(LevelError::FileNotFound(path.display().to_string()));
    }

    let content = fs::read_to_string(path)?;
    parse_klines_json(&content)
}

pub fn parse_klines_json(content: &str) -> LevelResult<KlinesByTimeframe> {
    let json: Value = serde_json::from_str(content)?;

    let series = json
        .as_object()
        .ok_or_else(|| LevelError::DataParse("top level must be an object keyed by timeframe".to_string()))?;

    let mut klines_by_tf = KlinesByTimeframe::new();

    for (timeframe, bars) in series {
        let bars = bars
            .as_array()
            .ok_or_else(|| LevelError::DataParse(format!("'{}' is not an array of bars", timeframe)))?;

        let mut klines = Vec::with_capacity(bars.len());
        for bar in bars {
            match bar {
                Value::Array(fields) => match parse_array_bar(fields) {
                    Some(kline) => klines.push(kline),
                    None => warn!("⚠️ Skipping malformed {} bar: {}", timeframe, bar),
                },
                Value::Object(_) => {
                    let kline: Kline = serde_json::from_value(bar.clone())?;
                    klines.push(kline);
                }
                _ => {
                    return Err(LevelError::DataParse(format!(
                        "unexpected bar in '{}': {}",
                        timeframe, bar
                    )))
                }
            }
        }

        klines.sort_by_key(|k| k.timestamp);
        debug!("Loaded {} {} bars", klines.len(), timeframe);
        klines_by_tf.insert(timeframe.clone(), klines);
    }

    Ok(klines_by_tf)
}

fn parse_array_bar(fields: &[Value]) -> Option<Kline> {
    if fields.len() < 6 {
        return None;
    }

    let timestamp = fields[0].as_i64().or_else(|| fields[0].as_f64().map(|t| t as i64))?;
    let number = |v: &Value| v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse::<f64>().ok()));

    Some(Kline::new(
        timestamp,
        number(&fields[1])?,
        number(&fields[2])?,
        number(&fields[3])?,
        number(&fields[4])?,
        number(&fields[5])?,
    ))
}
