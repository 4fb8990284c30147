//! Replay of recorded bars through a stream
//!
//! Pushes a bar series into an orchestrator and tallies what came out. This
//! is not a backtest: no fills, prices or PnL are simulated.

use serde::Serialize;
use statrs::statistics::Statistics;

use crate::engine::StrategyOrchestrator;
use crate::error::StrategyResult;
use crate::{Action, Bar, Decision, DecisionReason, StrategyState, Symbol, Timeframe};

/// ATR distribution over the replayed bars
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AtrStats {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl AtrStats {
    fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let std_dev = if values.len() > 1 { values.std_dev() } else { 0.0 };
        Some(Self {
            mean: values.mean(),
            std_dev,
            min: Statistics::min(values),
            max: Statistics::max(values),
        })
    }
}

/// Outcome of replaying one stream
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    pub bars: usize,
    pub opens: usize,
    pub closes: usize,
    pub filtered: usize,
    pub awaiting_history: usize,
    pub final_state: StrategyState,
    pub atr: Option<AtrStats>,
    #[serde(skip)]
    pub decisions: Vec<Decision>,
}

/// Push every bar through the orchestrator.
///
/// Stops at the first rejected bar; out-of-order data is a feed error and
/// is reported, not skipped.
pub fn replay(orchestrator: &mut StrategyOrchestrator, bars: &[Bar]) -> StrategyResult<ReplayReport> {
    let mut decisions = Vec::with_capacity(bars.len());
    let mut atr_values = Vec::with_capacity(bars.len());

    for bar in bars {
        let decision = orchestrator.push_bar(bar)?;
        if decision.reason != DecisionReason::InsufficientHistory {
            if let Some(atr) = orchestrator.last_atr() {
                atr_values.push(atr.value);
            }
        }
        decisions.push(decision);
    }

    let count = |pred: fn(&Decision) -> bool| decisions.iter().filter(|d| pred(d)).count();

    Ok(ReplayReport {
        symbol: orchestrator.symbol().clone(),
        timeframe: orchestrator.timeframe(),
        bars: bars.len(),
        opens: count(|d| d.action.is_open()),
        closes: count(|d| d.action.is_close()),
        filtered: count(|d| d.reason == DecisionReason::Filtered),
        awaiting_history: count(|d| d.reason == DecisionReason::InsufficientHistory),
        final_state: orchestrator.state(),
        atr: AtrStats::from_values(&atr_values),
        decisions,
    })
}

impl ReplayReport {
    /// Decisions that carry an action
    pub fn actions(&self) -> impl Iterator<Item = &Decision> {
        self.decisions.iter().filter(|d| d.action != Action::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AtrParams, StrategyParams};
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    fn series(closes: &[f64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                Bar::new_unchecked(start + Duration::minutes(5 * i as i64), c, c + 0.5, c - 0.5, c, 10.0)
            })
            .collect()
    }

    #[test]
    fn test_replay_counts() {
        let mut o = StrategyOrchestrator::new(
            Symbol::new("EURUSD"),
            AtrParams {
                period: 3,
                shift: 0,
                timeframe: Timeframe::M5,
            },
            StrategyParams::default(),
        )
        .unwrap();
        let report = replay(&mut o, &series(&[10.0, 10.0, 10.0, 10.0, 10.0])).unwrap();

        assert_eq!(report.bars, 5);
        assert_eq!(report.awaiting_history, 2);
        assert_eq!(report.opens, 0);
        assert_eq!(report.actions().count(), 0);
        assert_eq!(report.final_state, StrategyState::Ready);

        let stats = report.atr.unwrap();
        assert_relative_eq!(stats.mean, 1.0);
        assert_relative_eq!(stats.std_dev, 0.0);
        assert_relative_eq!(stats.max, 1.0);
    }

    #[test]
    fn test_replay_stops_on_out_of_order() {
        let mut o = StrategyOrchestrator::new(
            Symbol::new("EURUSD"),
            AtrParams::for_timeframe(Timeframe::M5),
            StrategyParams::default(),
        )
        .unwrap();
        let mut bars = series(&[10.0, 10.0, 10.0]);
        bars.swap(1, 2);
        assert!(replay(&mut o, &bars).is_err());
    }
}
