//! Strategy orchestration
//!
//! [`StrategyOrchestrator`] drives one (instrument, timeframe) stream: it
//! owns the ATR indicator, signal evaluator, stop policy and tick filter for
//! that stream and turns every accepted bar into exactly one [`Decision`].
//! [`StrategyEngine`] routes bars from many streams to their orchestrators.
//!
//! Orchestrators share nothing with each other, so independent streams can be
//! driven from different threads without locking.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::config::{AtrParams, Config, StrategyParams};
use crate::error::{StrategyError, StrategyResult};
use crate::filters::TickFilter;
use crate::indicators::AtrIndicator;
use crate::signals::{SignalContext, SignalEvaluator};
use crate::stops::StopPolicy;
use crate::{Action, AtrValue, Bar, Decision, DecisionReason, Side, StrategyState, Symbol, Timeframe};

/// Decision state machine for one stream
#[derive(Debug, Clone)]
pub struct StrategyOrchestrator {
    symbol: Symbol,
    atr_params: AtrParams,
    params: StrategyParams,
    indicator: AtrIndicator,
    evaluator: SignalEvaluator,
    stop_policy: StopPolicy,
    tick_filter: TickFilter,
    state: StrategyState,
    previous_atr: Option<AtrValue>,
    previous_close: Option<f64>,
    bars_in_position: u32,
}

impl StrategyOrchestrator {
    /// Build every component up front; any bad method id or level fails here.
    pub fn new(symbol: Symbol, atr_params: AtrParams, params: StrategyParams) -> StrategyResult<Self> {
        params.validate()?;
        let indicator = AtrIndicator::new(atr_params)?;
        let evaluator = SignalEvaluator::new(&params)?;
        let stop_policy = StopPolicy::new(&params)?;
        let tick_filter = TickFilter::new(&params)?;

        debug!(
            symbol = %symbol,
            timeframe = %atr_params.timeframe,
            period = atr_params.period,
            shift = atr_params.shift,
            "Strategy initialized"
        );

        Ok(Self {
            symbol,
            atr_params,
            params,
            indicator,
            evaluator,
            stop_policy,
            tick_filter,
            state: StrategyState::AwaitingHistory,
            previous_atr: None,
            previous_close: None,
            bars_in_position: 0,
        })
    }

    /// Process the next bar of the stream.
    ///
    /// Invalid and out-of-order bars are rejected without touching any state.
    pub fn push_bar(&mut self, bar: &Bar) -> StrategyResult<Decision> {
        bar.validate()?;

        let atr = match self.indicator.update(bar) {
            Ok(atr) => atr,
            Err(e) if e.is_insufficient_history() => {
                self.previous_close = Some(bar.close);
                debug!(symbol = %self.symbol, timeframe = %self.timeframe(), %e, "Awaiting history");
                return Ok(self.none(bar, DecisionReason::InsufficientHistory));
            }
            Err(e) => {
                warn!(symbol = %self.symbol, timeframe = %self.timeframe(), %e, "Bar rejected");
                return Err(e);
            }
        };

        if self.state == StrategyState::AwaitingHistory {
            self.state = StrategyState::Ready;
            info!(
                symbol = %self.symbol,
                timeframe = %self.timeframe(),
                bars = self.indicator.bars_seen(),
                atr = atr.value,
                "Strategy ready"
            );
        }

        let decision = self.decide(bar, &atr);
        self.previous_atr = Some(atr);
        self.previous_close = Some(bar.close);

        let decision = decision?;
        if !decision.is_none() {
            info!(
                symbol = %self.symbol,
                timeframe = %self.timeframe(),
                action = %decision.action,
                reason = %decision.reason,
                stop = ?decision.stop_distance,
                "Decision"
            );
        } else {
            debug!(
                symbol = %self.symbol,
                timeframe = %self.timeframe(),
                reason = %decision.reason,
                atr = atr.value,
                "No action"
            );
        }
        Ok(decision)
    }

    fn decide(&mut self, bar: &Bar, atr: &AtrValue) -> StrategyResult<Decision> {
        if let Some(side) = self.state.open_side() {
            self.bars_in_position += 1;
            let limit = self.params.order_close_time;
            if limit > 0 && self.bars_in_position >= limit {
                return Ok(self.close(bar, side, DecisionReason::Expired));
            }
        }

        if !self.tick_filter.allow(bar.spread) {
            warn!(
                symbol = %self.symbol,
                timeframe = %self.timeframe(),
                spread = bar.spread,
                max_spread = self.params.max_spread,
                "Bar filtered"
            );
            return Ok(self.none(bar, DecisionReason::Filtered));
        }

        let ctx = SignalContext {
            bar,
            previous_close: self.previous_close,
            previous_atr: self.previous_atr.map(|a| a.value),
        };
        let signals = self.evaluator.evaluate(atr, &ctx);

        match self.state.open_side() {
            Some(side) if signals.closes(side) => Ok(self.close(bar, side, DecisionReason::SignalClose)),
            Some(_) if signals.open_side().is_some() => Ok(self.none(bar, DecisionReason::PositionOpen)),
            Some(_) => Ok(self.none(bar, DecisionReason::NoSignal)),
            None => match signals.open_side() {
                Some(side) => {
                    let stop = self.stop_policy.compute_stop(Ok(*atr))?;
                    let take_profit = self.stop_policy.compute_take_profit(Ok(*atr))?;
                    self.state = StrategyState::PositionOpen(side);
                    self.bars_in_position = 0;
                    Ok(Decision {
                        timestamp: bar.timestamp,
                        action: Action::open(side),
                        stop_distance: positive(stop),
                        take_profit_distance: positive(take_profit),
                        strength: signals.strength,
                        lot_size: self.params.lot_size,
                        reason: DecisionReason::SignalOpen,
                    })
                }
                None => Ok(self.none(bar, DecisionReason::NoSignal)),
            },
        }
    }

    fn close(&mut self, bar: &Bar, side: Side, reason: DecisionReason) -> Decision {
        self.state = StrategyState::PositionFlat;
        self.bars_in_position = 0;
        Decision {
            action: Action::close(side),
            ..self.none(bar, reason)
        }
    }

    fn none(&self, bar: &Bar, reason: DecisionReason) -> Decision {
        Decision::none(bar.timestamp, self.params.lot_size, reason)
    }

    pub fn state(&self) -> StrategyState {
        self.state
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.atr_params.timeframe
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    pub fn atr_params(&self) -> &AtrParams {
        &self.atr_params
    }

    /// ATR of the last accepted bar, once history is sufficient
    pub fn last_atr(&self) -> Option<AtrValue> {
        self.indicator.latest()
    }
}

fn positive(distance: f64) -> Option<f64> {
    (distance > 0.0).then_some(distance)
}

/// Stream key: one instrument on one timeframe
pub type StreamKey = (Symbol, Timeframe);

/// Routes bars to the orchestrator of their stream
#[derive(Debug, Default)]
pub struct StrategyEngine {
    streams: HashMap<StreamKey, StrategyOrchestrator>,
}

impl StrategyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one orchestrator per configured stream
    pub fn from_config(config: &Config) -> StrategyResult<Self> {
        let mut engine = Self::new();
        for stream in &config.streams {
            let symbol = stream.symbol();
            let (atr_params, params) = config.resolve(&symbol, stream.timeframe);
            engine.register(symbol, atr_params, params)?;
        }
        Ok(engine)
    }

    pub fn register(
        &mut self,
        symbol: Symbol,
        atr_params: AtrParams,
        params: StrategyParams,
    ) -> StrategyResult<()> {
        let key = (symbol.clone(), atr_params.timeframe);
        if self.streams.contains_key(&key) {
            return Err(StrategyError::DuplicateStream {
                symbol,
                timeframe: atr_params.timeframe,
            });
        }
        let orchestrator = StrategyOrchestrator::new(symbol, atr_params, params)?;
        self.streams.insert(key, orchestrator);
        Ok(())
    }

    /// The call surface for the feed: one bar in, one decision out
    pub fn push_bar(&mut self, symbol: &Symbol, timeframe: Timeframe, bar: &Bar) -> StrategyResult<Decision> {
        let orchestrator = self
            .streams
            .get_mut(&(symbol.clone(), timeframe))
            .ok_or_else(|| StrategyError::UnknownStream {
                symbol: symbol.clone(),
                timeframe,
            })?;
        orchestrator.push_bar(bar)
    }

    pub fn get(&self, symbol: &Symbol, timeframe: Timeframe) -> Option<&StrategyOrchestrator> {
        self.streams.get(&(symbol.clone(), timeframe))
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Hand the orchestrators out, e.g. to drive them on separate threads
    pub fn into_streams(self) -> Vec<StrategyOrchestrator> {
        let mut streams: Vec<_> = self.streams.into_values().collect();
        streams.sort_by(|a, b| (a.symbol(), a.timeframe()).cmp(&(b.symbol(), b.timeframe())));
        streams
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 5, 8, 0, 0).unwrap()
    }

    /// Bar `i` minutes after start with the given range around `close`
    fn bar(i: i64, close: f64, range: f64) -> Bar {
        Bar::new_unchecked(
            start() + Duration::minutes(i),
            close,
            close + range / 2.0,
            close - range / 2.0,
            close,
            100.0,
        )
    }

    fn atr_params(period: usize) -> AtrParams {
        AtrParams {
            period,
            shift: 0,
            timeframe: Timeframe::M1,
        }
    }

    /// Opens on rising ATR, closes on rising ATR against the position
    fn rising_params() -> StrategyParams {
        StrategyParams {
            signal_open_method: 1,
            signal_open_filter: 0,
            signal_close_method: 1,
            price_stop_method: 1,
            price_stop_level: 2.0,
            ..Default::default()
        }
    }

    fn orchestrator(params: StrategyParams) -> StrategyOrchestrator {
        StrategyOrchestrator::new(Symbol::new("EURUSD"), atr_params(2), params).unwrap()
    }

    #[test]
    fn test_awaiting_history_then_ready() {
        let mut o = orchestrator(rising_params());
        let d = o.push_bar(&bar(0, 10.0, 1.0)).unwrap();
        assert_eq!(d.action, Action::None);
        assert_eq!(d.reason, DecisionReason::InsufficientHistory);
        assert_eq!(o.state(), StrategyState::AwaitingHistory);

        let d = o.push_bar(&bar(1, 10.0, 1.0)).unwrap();
        assert_eq!(d.reason, DecisionReason::NoSignal);
        assert_eq!(o.state(), StrategyState::Ready);
        assert!(o.last_atr().is_some());
    }

    #[test]
    fn test_open_long_with_atr_stop() {
        let mut o = orchestrator(rising_params());
        o.push_bar(&bar(0, 10.0, 1.0)).unwrap();
        o.push_bar(&bar(1, 10.0, 1.0)).unwrap();
        // higher close, wider range: ATR rises
        let d = o.push_bar(&bar(2, 10.5, 3.0)).unwrap();
        assert_eq!(d.action, Action::OpenLong);
        assert_eq!(d.reason, DecisionReason::SignalOpen);
        let atr = o.last_atr().unwrap().value;
        assert_eq!(d.stop_distance, Some(atr * 2.0));
        assert_eq!(d.take_profit_distance, None);
        assert_eq!(d.strength, 1.0);
        assert_eq!(o.state(), StrategyState::PositionOpen(Side::Long));
    }

    #[test]
    fn test_filtered_bar_keeps_state() {
        let params = StrategyParams {
            tick_filter_method: 1,
            max_spread: 0.5,
            ..rising_params()
        };
        let mut o = orchestrator(params);
        o.push_bar(&bar(0, 10.0, 1.0)).unwrap();
        o.push_bar(&bar(1, 10.0, 1.0)).unwrap();
        let d = o.push_bar(&bar(2, 10.5, 3.0).with_spread(0.8)).unwrap();
        assert_eq!(d.action, Action::None);
        assert_eq!(d.reason, DecisionReason::Filtered);
        assert_eq!(o.state(), StrategyState::Ready);
    }

    #[test]
    fn test_expiry_closes_after_limit() {
        let params = StrategyParams {
            order_close_time: 2,
            ..rising_params()
        };
        let mut o = orchestrator(params);
        o.push_bar(&bar(0, 10.0, 1.0)).unwrap();
        o.push_bar(&bar(1, 10.0, 1.0)).unwrap();
        assert_eq!(o.push_bar(&bar(2, 10.5, 3.0)).unwrap().action, Action::OpenLong);
        assert_eq!(o.push_bar(&bar(3, 10.5, 3.0)).unwrap().action, Action::None);
        let d = o.push_bar(&bar(4, 10.5, 3.0)).unwrap();
        assert_eq!(d.action, Action::CloseLong);
        assert_eq!(d.reason, DecisionReason::Expired);
        assert_eq!(o.state(), StrategyState::PositionFlat);
    }

    #[test]
    fn test_invalid_bar_rejected() {
        let mut o = orchestrator(rising_params());
        let bad = Bar::new_unchecked(start(), 10.0, 9.0, 11.0, 10.0, 1.0);
        assert!(matches!(o.push_bar(&bad), Err(StrategyError::InvalidBar(_))));
        assert_eq!(o.state(), StrategyState::AwaitingHistory);
        // the rejected timestamp is still free
        assert!(o.push_bar(&bar(0, 10.0, 1.0)).is_ok());
    }

    #[test]
    fn test_engine_routing() {
        let mut engine = StrategyEngine::new();
        let eurusd = Symbol::new("EURUSD");
        engine
            .register(eurusd.clone(), atr_params(2), rising_params())
            .unwrap();
        assert!(matches!(
            engine.register(eurusd.clone(), atr_params(3), rising_params()),
            Err(StrategyError::DuplicateStream { .. })
        ));

        let d = engine.push_bar(&eurusd, Timeframe::M1, &bar(0, 10.0, 1.0)).unwrap();
        assert_eq!(d.reason, DecisionReason::InsufficientHistory);
        assert!(matches!(
            engine.push_bar(&eurusd, Timeframe::M5, &bar(0, 10.0, 1.0)),
            Err(StrategyError::UnknownStream { .. })
        ));
        assert_eq!(engine.len(), 1);
        assert_eq!(
            engine.get(&eurusd, Timeframe::M1).map(|o| o.state()),
            Some(StrategyState::AwaitingHistory)
        );
    }

    #[test]
    fn test_engine_rejects_bad_params() {
        let mut engine = StrategyEngine::new();
        let params = StrategyParams {
            signal_open_method: 42,
            ..Default::default()
        };
        assert!(matches!(
            engine.register(Symbol::new("EURUSD"), atr_params(14), params),
            Err(StrategyError::InvalidParameter { field: "signal_open_method", .. })
        ));
        assert!(engine.is_empty());
    }
}
