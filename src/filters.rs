//! Tick filtering

use serde::{Deserialize, Serialize};

use crate::config::StrategyParams;
use crate::error::{StrategyError, StrategyResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickFilterMethod {
    Disabled,
    /// Reject spreads above `max_spread`; a zero cap allows everything
    SpreadCap,
}

impl TryFrom<u8> for TickFilterMethod {
    type Error = u8;

    fn try_from(id: u8) -> Result<Self, u8> {
        match id {
            0 => Ok(TickFilterMethod::Disabled),
            1 => Ok(TickFilterMethod::SpreadCap),
            other => Err(other),
        }
    }
}

/// Spread gate in front of signal evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickFilter {
    method: TickFilterMethod,
    max_spread: f64,
}

impl TickFilter {
    pub fn new(params: &StrategyParams) -> StrategyResult<Self> {
        let method = TickFilterMethod::try_from(params.tick_filter_method).map_err(|id| {
            StrategyError::invalid("tick_filter_method", format!("unknown tick filter method {id}"))
        })?;
        if !params.max_spread.is_finite() || params.max_spread < 0.0 {
            return Err(StrategyError::invalid(
                "max_spread",
                format!("must be a finite value >= 0, got {}", params.max_spread),
            ));
        }
        Ok(Self {
            method,
            max_spread: params.max_spread,
        })
    }

    pub fn allow(&self, current_spread: f64) -> bool {
        match self.method {
            TickFilterMethod::Disabled => true,
            TickFilterMethod::SpreadCap => {
                if self.max_spread == 0.0 {
                    return true;
                }
                current_spread.is_finite()
                    && current_spread >= 0.0
                    && current_spread <= self.max_spread
            }
        }
    }

    pub fn method(&self) -> TickFilterMethod {
        self.method
    }
}
