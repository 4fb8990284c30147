//! Technical indicators
//!
//! Batch helpers over price slices plus the streaming ATR that drives the
//! strategy. The streaming indicator recomputes its average from the window
//! on every bar, so a replay of the same bars reproduces every value bit for
//! bit.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::config::AtrParams;
use crate::error::{StrategyError, StrategyResult};
use crate::{AtrValue, Bar};

/// Calculate Simple Moving Average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(values.len());

    for i in 0..values.len() {
        if period == 0 || i + 1 < period {
            result.push(None);
        } else {
            let sum: f64 = values[i + 1 - period..=i].iter().sum();
            result.push(Some(sum / period as f64));
        }
    }

    result
}

/// True range of one bar given the previous close
pub fn bar_true_range(high: f64, low: f64, prev_close: Option<f64>) -> f64 {
    let hl = high - low;
    match prev_close {
        None => hl,
        Some(pc) => {
            let hc = (high - pc).abs();
            let lc = (low - pc).abs();
            hl.max(hc).max(lc)
        }
    }
}

/// Calculate True Range
///
/// Slices of different lengths are truncated to the shortest series.
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let len = high.len().min(low.len()).min(close.len());
    let prev_closes = std::iter::once(None).chain(close.iter().copied().map(Some));

    high[..len]
        .iter()
        .zip(&low[..len])
        .zip(prev_closes)
        .map(|((&h, &l), pc)| bar_true_range(h, l, pc))
        .collect()
}

/// Calculate Average True Range (simple average of true range)
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    let tr = true_range(high, low, close);
    sma(&tr, period)
}

/// Streaming ATR over a bounded window of true-range samples.
///
/// The window holds the last `period + shift` samples; the value is the mean
/// of the oldest `period` of them, i.e. the ATR as of `shift` bars ago.
#[derive(Debug, Clone)]
pub struct AtrIndicator {
    params: AtrParams,
    window: VecDeque<f64>,
    prev_close: Option<f64>,
    last_timestamp: Option<DateTime<Utc>>,
    bars_seen: usize,
    latest: Option<AtrValue>,
}

impl AtrIndicator {
    pub fn new(params: AtrParams) -> StrategyResult<Self> {
        params.validate()?;
        Ok(Self {
            window: VecDeque::with_capacity(params.window_len()),
            params,
            prev_close: None,
            last_timestamp: None,
            bars_seen: 0,
            latest: None,
        })
    }

    /// Feed the next bar.
    ///
    /// An out-of-order bar is rejected before anything is touched. Until
    /// `period + shift` bars have been seen the bar is still recorded, and
    /// `InsufficientHistory` tells the caller there is no value yet.
    pub fn update(&mut self, bar: &Bar) -> StrategyResult<AtrValue> {
        if let Some(last) = self.last_timestamp {
            if bar.timestamp <= last {
                return Err(StrategyError::OutOfOrderBar {
                    last,
                    received: bar.timestamp,
                });
            }
        }

        let tr = bar_true_range(bar.high, bar.low, self.prev_close);
        if self.window.len() == self.params.window_len() {
            self.window.pop_front();
        }
        self.window.push_back(tr);
        self.prev_close = Some(bar.close);
        self.last_timestamp = Some(bar.timestamp);
        self.bars_seen += 1;

        let required = self.params.window_len();
        if self.bars_seen < required {
            self.latest = None;
            return Err(StrategyError::InsufficientHistory {
                required,
                seen: self.bars_seen,
            });
        }

        let sum: f64 = self.window.iter().take(self.params.period).sum();
        let value = AtrValue {
            timestamp: bar.timestamp,
            value: sum / self.params.period as f64,
        };
        trace!(timestamp = %bar.timestamp, tr, atr = value.value, "ATR updated");
        self.latest = Some(value);
        Ok(value)
    }

    /// Most recent value, if the window is full
    pub fn latest(&self) -> Option<AtrValue> {
        self.latest
    }

    pub fn bars_seen(&self) -> usize {
        self.bars_seen
    }

    pub fn is_ready(&self) -> bool {
        self.latest.is_some()
    }

    pub fn params(&self) -> &AtrParams {
        &self.params
    }

    /// Forget all history
    pub fn reset(&mut self) {
        self.window.clear();
        self.prev_close = None;
        self.last_timestamp = None;
        self.bars_seen = 0;
        self.latest = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Timeframe;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn bars(rows: &[(f64, f64, f64)]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        rows.iter()
            .enumerate()
            .map(|(i, &(high, low, close))| {
                Bar::new_unchecked(start + Duration::minutes(i as i64), close, high, low, close, 1.0)
            })
            .collect()
    }

    fn params(period: usize, shift: usize) -> AtrParams {
        AtrParams {
            period,
            shift,
            timeframe: Timeframe::M1,
        }
    }

    #[test]
    fn test_sma() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = sma(&values, 3);

        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert_eq!(result[2], Some(2.0));
        assert_eq!(result[3], Some(3.0));
        assert_eq!(result[4], Some(4.0));
    }

    #[test]
    fn test_true_range_uses_previous_close() {
        let high = vec![10.0, 12.0, 11.0];
        let low = vec![9.0, 11.0, 8.0];
        let close = vec![9.5, 11.5, 10.0];
        let tr = true_range(&high, &low, &close);

        assert_eq!(tr[0], 1.0);
        // gap up: |12 - 9.5| beats the 1.0 range
        assert_eq!(tr[1], 2.5);
        // |8 - 11.5| = 3.5 beats the 3.0 range
        assert_eq!(tr[2], 3.5);
    }

    #[test]
    fn test_true_range_mismatched_lengths() {
        let high = vec![10.0, 12.0, 11.0];
        let low = vec![9.0, 11.0];
        let close = vec![9.5];

        assert_eq!(true_range(&high, &low, &close), vec![1.0, 2.5]);
        assert_eq!(atr(&high, &low, &close, 2), vec![None, Some(1.75)]);
        assert!(true_range(&high, &low, &[]).is_empty());
    }

    #[test]
    fn test_streaming_matches_batch() {
        let data = bars(&[
            (1.10, 1.00, 1.05),
            (1.12, 1.04, 1.11),
            (1.15, 1.09, 1.10),
            (1.13, 1.02, 1.03),
            (1.08, 1.01, 1.07),
            (1.20, 1.06, 1.18),
        ]);
        let high: Vec<f64> = data.iter().map(|b| b.high).collect();
        let low: Vec<f64> = data.iter().map(|b| b.low).collect();
        let close: Vec<f64> = data.iter().map(|b| b.close).collect();
        let batch = atr(&high, &low, &close, 3);

        let mut indicator = AtrIndicator::new(params(3, 0)).unwrap();
        for (bar, expected) in data.iter().zip(batch) {
            match indicator.update(bar) {
                Ok(v) => assert_relative_eq!(v.value, expected.unwrap(), epsilon = 1e-12),
                Err(e) => {
                    assert!(e.is_insufficient_history());
                    assert!(expected.is_none());
                }
            }
        }
    }

    #[test]
    fn test_shift_reads_older_window() {
        let data = bars(&[
            (2.0, 1.0, 1.5),
            (2.5, 1.5, 2.0),
            (3.0, 2.0, 2.5),
            (6.0, 2.0, 5.0),
        ]);
        let mut shifted = AtrIndicator::new(params(2, 1)).unwrap();
        let mut plain = AtrIndicator::new(params(2, 0)).unwrap();

        let mut plain_values = Vec::new();
        for bar in &data {
            plain_values.push(plain.update(bar).ok());
        }
        let mut shifted_values = Vec::new();
        for bar in &data {
            shifted_values.push(shifted.update(bar).ok());
        }

        assert!(shifted_values[1].is_none());
        // shifted at bar i equals plain at bar i - 1
        assert_eq!(
            shifted_values[2].map(|v| v.value),
            plain_values[1].map(|v| v.value)
        );
        assert_eq!(
            shifted_values[3].map(|v| v.value),
            plain_values[2].map(|v| v.value)
        );
    }

    #[test]
    fn test_insufficient_history_counts() {
        let data = bars(&[(2.0, 1.0, 1.5), (2.0, 1.0, 1.5), (2.0, 1.0, 1.5)]);
        let mut indicator = AtrIndicator::new(params(2, 1)).unwrap();

        assert_eq!(
            indicator.update(&data[0]),
            Err(StrategyError::InsufficientHistory { required: 3, seen: 1 })
        );
        assert_eq!(
            indicator.update(&data[1]),
            Err(StrategyError::InsufficientHistory { required: 3, seen: 2 })
        );
        assert!(!indicator.is_ready());
        assert!(indicator.update(&data[2]).is_ok());
        assert!(indicator.is_ready());
    }

    #[test]
    fn test_out_of_order_leaves_state_untouched() {
        let data = bars(&[(2.0, 1.0, 1.5), (2.2, 1.1, 2.0), (2.4, 1.9, 2.1)]);
        let mut indicator = AtrIndicator::new(params(2, 0)).unwrap();
        indicator.update(&data[0]).unwrap_err();
        let before = indicator.update(&data[1]).unwrap();

        let stale = Bar::new_unchecked(data[0].timestamp, 9.0, 9.5, 1.0, 9.0, 1.0);
        assert!(matches!(
            indicator.update(&stale),
            Err(StrategyError::OutOfOrderBar { .. })
        ));
        assert_eq!(indicator.bars_seen(), 2);
        assert_eq!(indicator.latest(), Some(before));

        let mut control = AtrIndicator::new(params(2, 0)).unwrap();
        control.update(&data[0]).unwrap_err();
        control.update(&data[1]).unwrap();
        assert_eq!(indicator.update(&data[2]), control.update(&data[2]));
    }

    #[test]
    fn test_zero_period_rejected() {
        assert!(matches!(
            AtrIndicator::new(params(0, 0)),
            Err(StrategyError::InvalidParameter { field: "period", .. })
        ));
    }

    #[test]
    fn test_reset() {
        let data = bars(&[(2.0, 1.0, 1.5), (2.2, 1.1, 2.0)]);
        let mut indicator = AtrIndicator::new(params(1, 0)).unwrap();
        indicator.update(&data[0]).unwrap();
        indicator.update(&data[1]).unwrap();
        indicator.reset();
        assert_eq!(indicator.bars_seen(), 0);
        assert!(indicator.latest().is_none());
        // earlier timestamps are accepted again after a reset
        assert!(indicator.update(&data[0]).is_ok());
    }
}
