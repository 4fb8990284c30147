//! Error taxonomy for the strategy engine

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{BarValidationError, Symbol, Timeframe};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrategyError {
    /// Bad method id or out-of-range level, caught when a component is built
    #[error("invalid parameter `{field}`: {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    /// Not enough bars yet to produce an ATR value
    #[error("insufficient history: {seen} of {required} bars")]
    InsufficientHistory { required: usize, seen: usize },

    /// Bars must arrive in strictly increasing timestamp order
    #[error("out-of-order bar: received {received}, last accepted {last}")]
    OutOfOrderBar {
        last: DateTime<Utc>,
        received: DateTime<Utc>,
    },

    #[error("invalid bar: {0}")]
    InvalidBar(#[from] BarValidationError),

    #[error("no strategy registered for {symbol} {timeframe}")]
    UnknownStream { symbol: Symbol, timeframe: Timeframe },

    #[error("strategy already registered for {symbol} {timeframe}")]
    DuplicateStream { symbol: Symbol, timeframe: Timeframe },
}

impl StrategyError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        StrategyError::InvalidParameter {
            field,
            reason: reason.into(),
        }
    }

    /// True for the transient "no signal yet" condition
    pub fn is_insufficient_history(&self) -> bool {
        matches!(self, StrategyError::InsufficientHistory { .. })
    }
}

pub type StrategyResult<T> = Result<T, StrategyError>;
