//! Signal rules
//!
//! ATR carries no direction, so every rule pairs an ATR condition with the
//! direction of the bar: a bar that closed above the previous close can only
//! open longs or close shorts, and the reverse for a lower close. Open and
//! close rules are evaluated independently and may both fire on one bar; the
//! orchestrator decides which one is acted on.

use serde::{Deserialize, Serialize};

use crate::config::StrategyParams;
use crate::error::{StrategyError, StrategyResult};
use crate::{AtrValue, Bar, Side};

/// ATR condition shared by open and close rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalMethod {
    /// Never signals
    Disabled,
    /// ATR higher than on the previous bar
    Rising,
    /// ATR strictly above the level
    AboveLevel,
    /// ATR moved from at-or-below the level to above it
    CrossingLevel,
    /// ATR grew by at least `level` percent since the previous bar
    RisingByPct,
    /// ATR lower than on the previous bar
    Falling,
}

impl TryFrom<u8> for SignalMethod {
    type Error = u8;

    fn try_from(id: u8) -> Result<Self, u8> {
        match id {
            0 => Ok(SignalMethod::Disabled),
            1 => Ok(SignalMethod::Rising),
            2 => Ok(SignalMethod::AboveLevel),
            3 => Ok(SignalMethod::CrossingLevel),
            4 => Ok(SignalMethod::RisingByPct),
            5 => Ok(SignalMethod::Falling),
            other => Err(other),
        }
    }
}

impl SignalMethod {
    fn parse(field: &'static str, id: u8, level: f64) -> StrategyResult<Self> {
        let method = SignalMethod::try_from(id)
            .map_err(|id| StrategyError::invalid(field, format!("unknown signal method {id}")))?;
        if !level.is_finite() {
            return Err(StrategyError::invalid(field, format!("level {level} is not finite")));
        }
        if matches!(method, SignalMethod::AboveLevel | SignalMethod::CrossingLevel) && level < 0.0 {
            return Err(StrategyError::invalid(
                field,
                format!("level {level} must be >= 0 for {method:?}"),
            ));
        }
        Ok(method)
    }

    /// Whether the ATR condition holds
    pub fn holds(self, atr: f64, previous: Option<f64>, level: f64) -> bool {
        match self {
            SignalMethod::Disabled => false,
            SignalMethod::Rising => previous.is_some_and(|prev| atr > prev),
            SignalMethod::AboveLevel => atr > level,
            SignalMethod::CrossingLevel => previous.is_some_and(|prev| prev <= level && atr > level),
            SignalMethod::RisingByPct => previous
                .filter(|prev| *prev > 0.0)
                .is_some_and(|prev| (atr - prev) / prev * 100.0 >= level),
            SignalMethod::Falling => previous.is_some_and(|prev| atr < prev),
        }
    }
}

/// Secondary confirmation required before an open signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenFilter {
    None,
    /// Bar body points the same way as the trade
    BarDirection,
    /// Bar range at least one ATR
    RangeExpansion,
}

impl TryFrom<u8> for OpenFilter {
    type Error = u8;

    fn try_from(id: u8) -> Result<Self, u8> {
        match id {
            0 => Ok(OpenFilter::None),
            1 => Ok(OpenFilter::BarDirection),
            2 => Ok(OpenFilter::RangeExpansion),
            other => Err(other),
        }
    }
}

impl OpenFilter {
    pub fn confirms(self, side: Side, bar: &Bar, atr: f64) -> bool {
        match self {
            OpenFilter::None => true,
            OpenFilter::BarDirection => match side {
                Side::Long => bar.close > bar.open,
                Side::Short => bar.close < bar.open,
            },
            OpenFilter::RangeExpansion => bar.range() >= atr,
        }
    }
}

/// Inputs besides the ATR reading
#[derive(Debug, Clone, Copy)]
pub struct SignalContext<'a> {
    pub bar: &'a Bar,
    pub previous_close: Option<f64>,
    pub previous_atr: Option<f64>,
}

impl SignalContext<'_> {
    /// Price direction of the bar relative to the previous close
    pub fn direction(&self) -> Option<Side> {
        let prev = self.previous_close?;
        if self.bar.close > prev {
            Some(Side::Long)
        } else if self.bar.close < prev {
            Some(Side::Short)
        } else {
            None
        }
    }
}

/// Signals raised on one bar
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalSet {
    pub open_long: bool,
    pub open_short: bool,
    pub close_long: bool,
    pub close_short: bool,
    /// `1 + boost` when an open signal fired, else 0
    pub strength: f64,
}

impl SignalSet {
    pub fn open_side(&self) -> Option<Side> {
        if self.open_long {
            Some(Side::Long)
        } else if self.open_short {
            Some(Side::Short)
        } else {
            None
        }
    }

    pub fn opens(&self, side: Side) -> bool {
        match side {
            Side::Long => self.open_long,
            Side::Short => self.open_short,
        }
    }

    pub fn closes(&self, side: Side) -> bool {
        match side {
            Side::Long => self.close_long,
            Side::Short => self.close_short,
        }
    }
}

/// Turns ATR readings into open/close signals
#[derive(Debug, Clone)]
pub struct SignalEvaluator {
    open_method: SignalMethod,
    open_filter: OpenFilter,
    open_level: f64,
    open_boost: f64,
    close_method: SignalMethod,
    close_level: f64,
}

impl SignalEvaluator {
    pub fn new(params: &StrategyParams) -> StrategyResult<Self> {
        let open_method = SignalMethod::parse(
            "signal_open_method",
            params.signal_open_method,
            params.signal_open_level,
        )?;
        let close_method = SignalMethod::parse(
            "signal_close_method",
            params.signal_close_method,
            params.signal_close_level,
        )?;
        let open_filter = OpenFilter::try_from(params.signal_open_filter).map_err(|id| {
            StrategyError::invalid("signal_open_filter", format!("unknown filter method {id}"))
        })?;
        if !params.signal_open_boost.is_finite() || params.signal_open_boost < 0.0 {
            return Err(StrategyError::invalid(
                "signal_open_boost",
                format!("must be a finite value >= 0, got {}", params.signal_open_boost),
            ));
        }

        Ok(Self {
            open_method,
            open_filter,
            open_level: params.signal_open_level,
            open_boost: params.signal_open_boost,
            close_method,
            close_level: params.signal_close_level,
        })
    }

    pub fn evaluate(&self, atr: &AtrValue, ctx: &SignalContext<'_>) -> SignalSet {
        let mut signals = SignalSet::default();
        let Some(direction) = ctx.direction() else {
            return signals;
        };

        if self.open_method.holds(atr.value, ctx.previous_atr, self.open_level)
            && self.open_filter.confirms(direction, ctx.bar, atr.value)
        {
            match direction {
                Side::Long => signals.open_long = true,
                Side::Short => signals.open_short = true,
            }
            signals.strength = 1.0 + self.open_boost;
        }

        // a move against the position is what closes it
        if self.close_method.holds(atr.value, ctx.previous_atr, self.close_level) {
            match direction {
                Side::Long => signals.close_short = true,
                Side::Short => signals.close_long = true,
            }
        }

        signals
    }

    pub fn open_method(&self) -> SignalMethod {
        self.open_method
    }

    pub fn close_method(&self) -> SignalMethod {
        self.close_method
    }

    pub fn open_filter(&self) -> OpenFilter {
        self.open_filter
    }
}
