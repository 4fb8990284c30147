//! Configuration management
//!
//! Parameters are plain values composed at construction time: a base record
//! (the strategy-wide defaults) plus per-timeframe overrides from the
//! built-in presets and from the JSON configuration file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{StrategyError, StrategyResult};
use crate::presets;
use crate::{Symbol, Timeframe};

/// Default ATR averaging period
pub const DEFAULT_ATR_PERIOD: usize = 14;

/// Largest `period + shift` accepted; bounds the true-range window allocation
pub const MAX_ATR_WINDOW: usize = 100_000;

/// ATR indicator parameters for one timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtrParams {
    /// Number of true-range samples averaged
    pub period: usize,
    /// Bars of lookback offset for reading the value
    pub shift: usize,
    pub timeframe: Timeframe,
}

impl AtrParams {
    /// Base indicator parameters bound to a timeframe
    pub fn for_timeframe(timeframe: Timeframe) -> Self {
        Self {
            period: DEFAULT_ATR_PERIOD,
            shift: 0,
            timeframe,
        }
    }

    pub fn with_override(mut self, o: &AtrParamsOverride) -> Self {
        if let Some(period) = o.period {
            self.period = period;
        }
        if let Some(shift) = o.shift {
            self.shift = shift;
        }
        self
    }

    pub fn validate(&self) -> StrategyResult<()> {
        if self.period == 0 {
            return Err(StrategyError::invalid("period", "must be a positive integer"));
        }
        match self.period.checked_add(self.shift) {
            Some(len) if len <= MAX_ATR_WINDOW => Ok(()),
            _ => Err(StrategyError::invalid(
                if self.period > MAX_ATR_WINDOW { "period" } else { "shift" },
                format!(
                    "period + shift must not exceed {MAX_ATR_WINDOW}, got period {} and shift {}",
                    self.period, self.shift
                ),
            )),
        }
    }

    /// Bars needed before the first value: `period + shift`.
    ///
    /// Saturates on parameters that failed [`validate`](Self::validate).
    pub fn window_len(&self) -> usize {
        self.period.saturating_add(self.shift)
    }
}

/// Optional indicator fields, applied over a base [`AtrParams`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtrParamsOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shift: Option<usize>,
}

/// Strategy parameters for one (instrument, timeframe) pair.
///
/// Method fields are raw ids; they are checked when the signal evaluator,
/// stop policy and tick filter are built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    /// Exposed on decisions only, never used for sizing
    pub lot_size: f64,
    pub signal_open_method: u8,
    pub signal_open_filter: u8,
    pub signal_open_level: f64,
    /// Confidence multiplier; never changes whether a signal fires
    pub signal_open_boost: f64,
    pub signal_close_method: u8,
    pub signal_close_level: f64,
    pub price_stop_method: u8,
    pub price_stop_level: f64,
    #[serde(default)]
    pub price_profit_method: u8,
    #[serde(default)]
    pub price_profit_level: f64,
    pub tick_filter_method: u8,
    /// Spread cap; 0 means no cap
    pub max_spread: f64,
    /// Bars a position may stay open before it is closed; 0 = unlimited
    #[serde(default)]
    pub order_close_time: u32,
}

impl Default for StrategyParams {
    fn default() -> Self {
        StrategyParams {
            lot_size: 0.0,
            signal_open_method: 0,
            signal_open_filter: 1,
            signal_open_level: 0.0,
            signal_open_boost: 0.0,
            signal_close_method: 0,
            signal_close_level: 0.0,
            price_stop_method: 1,
            price_stop_level: 2.0,
            price_profit_method: 0,
            price_profit_level: 0.0,
            tick_filter_method: 1,
            max_spread: 0.0,
            order_close_time: 0,
        }
    }
}

impl StrategyParams {
    pub fn with_override(mut self, o: &StrategyParamsOverride) -> Self {
        macro_rules! apply {
            ($($field:ident),* $(,)?) => {
                $(if let Some(v) = o.$field { self.$field = v; })*
            };
        }
        apply!(
            lot_size,
            signal_open_method,
            signal_open_filter,
            signal_open_level,
            signal_open_boost,
            signal_close_method,
            signal_close_level,
            price_stop_method,
            price_stop_level,
            price_profit_method,
            price_profit_level,
            tick_filter_method,
            max_spread,
            order_close_time,
        );
        self
    }

    pub fn validate(&self) -> StrategyResult<()> {
        if !self.lot_size.is_finite() || self.lot_size < 0.0 {
            return Err(StrategyError::invalid(
                "lot_size",
                format!("must be a finite value >= 0, got {}", self.lot_size),
            ));
        }
        Ok(())
    }
}

/// Optional strategy fields, applied over a base [`StrategyParams`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParamsOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lot_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_open_method: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_open_filter: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_open_level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_open_boost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_close_method: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_close_level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_stop_method: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_stop_level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_profit_method: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_profit_level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tick_filter_method: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_spread: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_close_time: Option<u32>,
}

/// Indicator and strategy overrides for one layer of configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamsLayer {
    pub indicator: AtrParamsOverride,
    pub strategy: StrategyParamsOverride,
}

/// One (instrument, timeframe) stream in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub symbol: String,
    #[serde(with = "timeframe_str")]
    pub timeframe: Timeframe,
    /// CSV bar file; relative paths resolve against `data_dir`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default)]
    pub indicator: AtrParamsOverride,
    #[serde(default)]
    pub strategy: StrategyParamsOverride,
}

impl StreamConfig {
    pub fn symbol(&self) -> Symbol {
        Symbol::new(&self.symbol)
    }

    /// Data file name, `{SYMBOL}_{TF}.csv` unless set explicitly
    pub fn data_file(&self) -> String {
        self.data
            .clone()
            .unwrap_or_else(|| format!("{}_{}.csv", self.symbol, self.timeframe))
    }
}

/// Accept "M5" as well as "5m" in config files
mod timeframe_str {
    use crate::Timeframe;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Timeframe, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value.as_str())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Timeframe, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Overrides applied to the base parameters of every stream
    #[serde(default)]
    pub defaults: ParamsLayer,
    #[serde(default)]
    pub streams: Vec<StreamConfig>,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String {
    "data".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            defaults: ParamsLayer::default(),
            streams: Vec::new(),
            data_dir: default_data_dir(),
        }
    }
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        if let Ok(data_dir) = std::env::var("ATR_STRATEGY_DATA_DIR") {
            config.data_dir = data_dir;
        }

        Ok(config)
    }

    /// Resolve the parameters of one stream.
    ///
    /// Layers, later wins: base defaults, the file's `defaults`, the built-in
    /// preset for the pair, then the stream's own entry.
    pub fn resolve(&self, symbol: &Symbol, timeframe: Timeframe) -> (AtrParams, StrategyParams) {
        let mut indicator = AtrParams::for_timeframe(timeframe).with_override(&self.defaults.indicator);
        let mut strategy = StrategyParams::default().with_override(&self.defaults.strategy);

        if let Some(preset) = presets::lookup(symbol, timeframe) {
            indicator = indicator.with_override(&preset.indicator);
            strategy = strategy.with_override(&preset.strategy);
        }

        if let Some(stream) = self.stream(symbol, timeframe) {
            indicator = indicator.with_override(&stream.indicator);
            strategy = strategy.with_override(&stream.strategy);
        }

        (indicator, strategy)
    }

    pub fn stream(&self, symbol: &Symbol, timeframe: Timeframe) -> Option<&StreamConfig> {
        self.streams
            .iter()
            .find(|s| s.symbol == symbol.as_str() && s.timeframe == timeframe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_only_touches_set_fields() {
        let o = StrategyParamsOverride {
            signal_open_level: Some(10.0),
            max_spread: Some(1.5),
            ..Default::default()
        };
        let params = StrategyParams::default().with_override(&o);
        assert_eq!(params.signal_open_level, 10.0);
        assert_eq!(params.max_spread, 1.5);
        assert_eq!(params.price_stop_level, StrategyParams::default().price_stop_level);
    }

    #[test]
    fn test_atr_override_layers() {
        let base = AtrParamsOverride {
            period: Some(20),
            shift: Some(1),
        };
        let top = AtrParamsOverride {
            period: None,
            shift: Some(0),
        };
        let params = AtrParams::for_timeframe(Timeframe::H1)
            .with_override(&base)
            .with_override(&top);
        assert_eq!(params.period, 20);
        assert_eq!(params.shift, 0);
        assert_eq!(params.window_len(), 20);
        assert_eq!(params.timeframe, Timeframe::H1);
    }

    #[test]
    fn test_config_layers() {
        let json = r#"{
            "defaults": { "indicator": { "period": 10 }, "strategy": { "lot_size": 0.1 } },
            "streams": [
                { "symbol": "EURUSD", "timeframe": "M1", "strategy": { "max_spread": 2.0 } },
                { "symbol": "GBPUSD", "timeframe": "1h", "indicator": { "shift": 2 } }
            ]
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.data_dir, "data");

        let (indi, stg) = config.resolve(&Symbol::new("EURUSD"), Timeframe::M1);
        assert_eq!(indi.period, 10);
        assert_eq!(stg.lot_size, 0.0, "preset table wins over file defaults");
        assert_eq!(stg.signal_open_level, 10.0);
        assert_eq!(stg.max_spread, 2.0);

        let (indi, stg) = config.resolve(&Symbol::new("GBPUSD"), Timeframe::H1);
        assert_eq!(indi.period, 10);
        assert_eq!(indi.shift, 2);
        assert_eq!(stg.lot_size, 0.1);
        assert_eq!(config.streams[1].data_file(), "GBPUSD_H1.csv");
    }

    #[test]
    fn test_unknown_timeframe_fails_parse() {
        let json = r#"{ "streams": [ { "symbol": "EURUSD", "timeframe": "M2" } ] }"#;
        assert!(serde_json::from_str::<Config>(json).is_err());
    }

    #[test]
    fn test_negative_lot_size_invalid() {
        let params = StrategyParams {
            lot_size: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(StrategyError::InvalidParameter { field: "lot_size", .. })
        ));
    }

    #[test]
    fn test_window_overflow_invalid() {
        let params = AtrParams {
            period: 2,
            shift: usize::MAX,
            timeframe: Timeframe::M1,
        };
        assert!(matches!(
            params.validate(),
            Err(StrategyError::InvalidParameter { field: "shift", .. })
        ));
        assert_eq!(params.window_len(), usize::MAX);
    }

    #[test]
    fn test_window_cap() {
        let mut params = AtrParams::for_timeframe(Timeframe::M5);
        params.period = MAX_ATR_WINDOW;
        assert!(params.validate().is_ok());

        params.shift = 1;
        assert!(matches!(
            params.validate(),
            Err(StrategyError::InvalidParameter { field: "shift", .. })
        ));

        params.period = usize::MAX;
        params.shift = 0;
        assert!(matches!(
            params.validate(),
            Err(StrategyError::InvalidParameter { field: "period", .. })
        ));
    }
}
