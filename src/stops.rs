//! Stop-loss and take-profit distances

use serde::{Deserialize, Serialize};

use crate::config::StrategyParams;
use crate::error::{StrategyError, StrategyResult};
use crate::AtrValue;

/// Distance formula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceStopMethod {
    /// Distance is the level itself; a zero level means no stop
    Fixed,
    /// Distance is ATR times the level
    AtrMultiple,
}

impl TryFrom<u8> for PriceStopMethod {
    type Error = u8;

    fn try_from(id: u8) -> Result<Self, u8> {
        match id {
            0 => Ok(PriceStopMethod::Fixed),
            1 => Ok(PriceStopMethod::AtrMultiple),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DistanceRule {
    method: PriceStopMethod,
    level: f64,
}

impl DistanceRule {
    fn new(
        method_field: &'static str,
        method: u8,
        level_field: &'static str,
        level: f64,
    ) -> StrategyResult<Self> {
        let method = PriceStopMethod::try_from(method)
            .map_err(|id| StrategyError::invalid(method_field, format!("unknown price stop method {id}")))?;
        if !level.is_finite() || level < 0.0 {
            return Err(StrategyError::invalid(
                level_field,
                format!("must be a finite value >= 0, got {level}"),
            ));
        }
        Ok(Self { method, level })
    }

    fn distance(&self, atr: StrategyResult<AtrValue>) -> StrategyResult<f64> {
        match self.method {
            PriceStopMethod::Fixed => Ok(self.level),
            PriceStopMethod::AtrMultiple => Ok(atr?.value * self.level),
        }
    }
}

/// Derives stop-loss and take-profit distances from ATR
#[derive(Debug, Clone)]
pub struct StopPolicy {
    stop: DistanceRule,
    profit: DistanceRule,
}

impl StopPolicy {
    pub fn new(params: &StrategyParams) -> StrategyResult<Self> {
        Ok(Self {
            stop: DistanceRule::new(
                "price_stop_method",
                params.price_stop_method,
                "price_stop_level",
                params.price_stop_level,
            )?,
            profit: DistanceRule::new(
                "price_profit_method",
                params.price_profit_method,
                "price_profit_level",
                params.price_profit_level,
            )?,
        })
    }

    /// Stop-loss distance in price units.
    ///
    /// An ATR-based rule hands back the caller's ATR error unchanged, so a
    /// bar without history is skipped rather than stopped at a guess.
    pub fn compute_stop(&self, atr: StrategyResult<AtrValue>) -> StrategyResult<f64> {
        self.stop.distance(atr)
    }

    /// Take-profit distance in price units
    pub fn compute_take_profit(&self, atr: StrategyResult<AtrValue>) -> StrategyResult<f64> {
        self.profit.distance(atr)
    }

    pub fn stop_method(&self) -> PriceStopMethod {
        self.stop.method
    }
}
