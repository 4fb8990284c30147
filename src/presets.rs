//! Built-in per-timeframe parameter tables
//!
//! Each preset is an override layered over the base defaults when a stream
//! is resolved (see [`Config::resolve`](crate::config::Config::resolve)).

use crate::config::{AtrParamsOverride, ParamsLayer, StrategyParamsOverride};
use crate::{Symbol, Timeframe};

/// EURUSD one-minute defaults
pub fn eurusd_m1() -> ParamsLayer {
    ParamsLayer {
        indicator: AtrParamsOverride {
            period: None,
            shift: Some(0),
        },
        strategy: StrategyParamsOverride {
            lot_size: Some(0.0),
            signal_open_method: Some(0),
            signal_open_filter: Some(1),
            signal_open_level: Some(10.0),
            signal_open_boost: Some(0.0),
            signal_close_method: Some(0),
            signal_close_level: Some(0.0),
            price_stop_method: Some(1),
            price_stop_level: Some(2.0),
            tick_filter_method: Some(1),
            max_spread: Some(0.0),
            ..Default::default()
        },
    }
}

/// EURUSD five-minute defaults
pub fn eurusd_m5() -> ParamsLayer {
    ParamsLayer {
        indicator: AtrParamsOverride {
            period: None,
            shift: Some(0),
        },
        strategy: StrategyParamsOverride {
            lot_size: Some(0.0),
            signal_open_method: Some(0),
            signal_open_filter: Some(1),
            signal_open_level: Some(0.0),
            signal_open_boost: Some(0.0),
            signal_close_method: Some(0),
            signal_close_level: Some(0.0),
            price_stop_method: Some(0),
            price_stop_level: Some(2.0),
            tick_filter_method: Some(1),
            max_spread: Some(0.0),
            ..Default::default()
        },
    }
}

/// Preset for a pair, if one ships with the crate
pub fn lookup(symbol: &Symbol, timeframe: Timeframe) -> Option<ParamsLayer> {
    match (symbol.as_str(), timeframe) {
        ("EURUSD", Timeframe::M1) => Some(eurusd_m1()),
        ("EURUSD", Timeframe::M5) => Some(eurusd_m5()),
        _ => None,
    }
}
