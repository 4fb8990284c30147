//! Core data types used across the strategy engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for bar data
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BarValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("spread ({0}) must be a finite value >= 0")]
    InvalidSpread(f64),

    #[error("open ({open}) must be between low ({low}) and high ({high})")]
    OpenOutOfRange { open: f64, low: f64, high: f64 },

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("prices must be positive and finite: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// OHLCV bar for one timeframe, with the spread quoted at bar close
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Spread in price units. Feeds without spread data leave it at zero.
    #[serde(default)]
    pub spread: f64,
}

impl Bar {
    /// Create a new bar with validation
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, BarValidationError> {
        let bar = Self::new_unchecked(timestamp, open, high, low, close, volume);
        bar.validate()?;
        Ok(bar)
    }

    /// Create a bar without validation (for trusted sources or when validation is done separately)
    pub fn new_unchecked(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            spread: 0.0,
        }
    }

    /// Attach a spread quote to the bar
    pub fn with_spread(mut self, spread: f64) -> Self {
        self.spread = spread;
        self
    }

    /// Validate the bar data
    pub fn validate(&self) -> Result<(), BarValidationError> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(BarValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(BarValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.volume < 0.0 {
            return Err(BarValidationError::NegativeVolume(self.volume));
        }

        if !self.spread.is_finite() || self.spread < 0.0 {
            return Err(BarValidationError::InvalidSpread(self.spread));
        }

        if self.open < self.low || self.open > self.high {
            return Err(BarValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }

        if self.close < self.low || self.close > self.high {
            return Err(BarValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        Ok(())
    }

    /// Check if the bar is valid without returning detailed error
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// High-low range of the bar
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// Instrument symbol using Arc<str> for cheap cloning
///
/// Symbols are cloned into every stream key and decision record, so an
/// Arc<str> keeps each clone to a reference-count bump.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

/// Custom serde for Arc<str>
mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bar sampling period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
    W1,
    MN1,
}

/// Error parsing timeframe
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid timeframe: {0}")]
pub struct ParseTimeframeError(pub String);

impl std::str::FromStr for Timeframe {
    type Err = ParseTimeframeError;

    /// Accepts both "M5" style and "5m" style names
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "M1" | "m1" | "1m" => Ok(Timeframe::M1),
            "M5" | "m5" | "5m" => Ok(Timeframe::M5),
            "M15" | "m15" | "15m" => Ok(Timeframe::M15),
            "M30" | "m30" | "30m" => Ok(Timeframe::M30),
            "H1" | "h1" | "1h" => Ok(Timeframe::H1),
            "H4" | "h4" | "4h" => Ok(Timeframe::H4),
            "D1" | "d1" | "1d" => Ok(Timeframe::D1),
            "W1" | "w1" | "1w" => Ok(Timeframe::W1),
            "MN1" | "mn1" | "1M" => Ok(Timeframe::MN1),
            other => Err(ParseTimeframeError(other.to_string())),
        }
    }
}

impl Timeframe {
    pub const ALL: [Timeframe; 9] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
        Timeframe::W1,
        Timeframe::MN1,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
            Timeframe::W1 => "W1",
            Timeframe::MN1 => "MN1",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

/// ATR reading for one bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtrValue {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// What the execution layer should do after a bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    None,
    OpenLong,
    OpenShort,
    CloseLong,
    CloseShort,
}

impl Action {
    pub fn open(side: Side) -> Self {
        match side {
            Side::Long => Action::OpenLong,
            Side::Short => Action::OpenShort,
        }
    }

    pub fn close(side: Side) -> Self {
        match side {
            Side::Long => Action::CloseLong,
            Side::Short => Action::CloseShort,
        }
    }

    pub fn is_open(self) -> bool {
        matches!(self, Action::OpenLong | Action::OpenShort)
    }

    pub fn is_close(self) -> bool {
        matches!(self, Action::CloseLong | Action::CloseShort)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Action::None => "none",
            Action::OpenLong => "open_long",
            Action::OpenShort => "open_short",
            Action::CloseLong => "close_long",
            Action::CloseShort => "close_short",
        };
        f.write_str(s)
    }
}

/// Diagnostic tag explaining a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    InsufficientHistory,
    Filtered,
    NoSignal,
    SignalOpen,
    SignalClose,
    /// Open signal ignored because a position is already held
    PositionOpen,
    /// Position held for the configured maximum number of bars
    Expired,
}

impl DecisionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionReason::InsufficientHistory => "insufficient_history",
            DecisionReason::Filtered => "filtered",
            DecisionReason::NoSignal => "no_signal",
            DecisionReason::SignalOpen => "signal_open",
            DecisionReason::SignalClose => "signal_close",
            DecisionReason::PositionOpen => "position_open",
            DecisionReason::Expired => "expired",
        }
    }
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one bar, consumed by the order-execution layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub timestamp: DateTime<Utc>,
    pub action: Action,
    pub stop_distance: Option<f64>,
    pub take_profit_distance: Option<f64>,
    /// Boosted signal confidence; 0 when no open signal fired
    pub strength: f64,
    /// Configured lot size, passed through untouched
    pub lot_size: f64,
    pub reason: DecisionReason,
}

impl Decision {
    /// A decision with no action
    pub fn none(timestamp: DateTime<Utc>, lot_size: f64, reason: DecisionReason) -> Self {
        Self {
            timestamp,
            action: Action::None,
            stop_distance: None,
            take_profit_distance: None,
            strength: 0.0,
            lot_size,
            reason,
        }
    }

    pub fn is_none(&self) -> bool {
        self.action == Action::None
    }
}

/// Lifecycle of one (instrument, timeframe) stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyState {
    /// Fewer than `period + shift` bars seen
    AwaitingHistory,
    /// ATR available, no position taken yet
    Ready,
    PositionFlat,
    PositionOpen(Side),
}

impl StrategyState {
    pub fn open_side(self) -> Option<Side> {
        match self {
            StrategyState::PositionOpen(side) => Some(side),
            _ => None,
        }
    }
}
