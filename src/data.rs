//! Bar data loading and decision export
//!
//! CSV layout: `datetime,open,high,low,close,volume[,spread]`, one header row.
//! The feed contract is strictly increasing timestamps; files are read as-is
//! and ordering problems surface when the bars are pushed.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

use crate::{Bar, Decision, Symbol, Timeframe};

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    s.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Try parsing without timezone and assume UTC
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
        })
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y.%m.%d %H:%M")
                .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
        })
        .with_context(|| format!("Failed to parse datetime: {}", s))
}

fn parse_field(record: &csv::StringRecord, idx: usize, name: &str) -> Result<f64> {
    record
        .get(idx)
        .with_context(|| format!("Missing {} column", name))?
        .trim()
        .parse()
        .with_context(|| format!("Failed to parse {}", name))
}

/// Load OHLCV bars from a CSV file
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Bar>> {
    let mut reader = csv::Reader::from_path(path.as_ref())
        .with_context(|| format!("Failed to open CSV file {}", path.as_ref().display()))?;

    let mut bars = Vec::new();
    let mut invalid = 0usize;

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;

        let dt_str = record.get(0).context("Missing datetime column")?;
        let timestamp = parse_datetime(dt_str.trim())?;

        let spread = match record.get(6).map(str::trim) {
            Some(s) if !s.is_empty() => s
                .parse()
                .with_context(|| format!("Failed to parse spread at row {}", row_idx + 1))?,
            _ => 0.0,
        };

        let bar = Bar::new_unchecked(
            timestamp,
            parse_field(&record, 1, "open")?,
            parse_field(&record, 2, "high")?,
            parse_field(&record, 3, "low")?,
            parse_field(&record, 4, "close")?,
            parse_field(&record, 5, "volume")?,
        )
        .with_spread(spread);

        if let Err(e) = bar.validate() {
            warn!("Row {}: {}", row_idx + 1, e);
            invalid += 1;
        }
        bars.push(bar);
    }

    info!(
        "Loaded {} bars from {} ({} failing validation)",
        bars.len(),
        path.as_ref().display(),
        invalid
    );

    Ok(bars)
}

/// One exported decision row
#[derive(Debug, Clone, Serialize)]
pub struct DecisionRecord {
    pub symbol: String,
    pub timeframe: String,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub reason: String,
    pub stop_distance: Option<f64>,
    pub take_profit_distance: Option<f64>,
    pub strength: f64,
    pub lot_size: f64,
}

impl DecisionRecord {
    pub fn new(symbol: &Symbol, timeframe: Timeframe, decision: &Decision) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            timestamp: decision.timestamp,
            action: decision.action.to_string(),
            reason: decision.reason.to_string(),
            stop_distance: decision.stop_distance,
            take_profit_distance: decision.take_profit_distance,
            strength: decision.strength,
            lot_size: decision.lot_size,
        }
    }
}

/// Write decision rows to a CSV file
pub fn write_decisions_csv(path: impl AsRef<Path>, records: &[DecisionRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())
        .with_context(|| format!("Failed to create {}", path.as_ref().display()))?;
    for record in records {
        writer.serialize(record).context("Failed to write decision row")?;
    }
    writer.flush().context("Failed to flush decisions CSV")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("atr_strategy_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_load_csv_with_and_without_spread() {
        let path = temp_path("bars.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "datetime,open,high,low,close,volume,spread").unwrap();
        writeln!(f, "2024-01-02 09:00:00,1.1000,1.1010,1.0990,1.1005,120,0.0001").unwrap();
        writeln!(f, "2024-01-02T09:01:00Z,1.1005,1.1012,1.1001,1.1008,80,").unwrap();
        writeln!(f, "2024.01.02 09:02,1.1008,1.1015,1.1003,1.1010,95,0.0002").unwrap();
        drop(f);

        let bars = load_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].spread, 0.0001);
        assert_eq!(bars[1].spread, 0.0);
        assert!(bars[0].timestamp < bars[1].timestamp);
        assert!(bars[1].timestamp < bars[2].timestamp);
        assert!(bars.iter().all(Bar::is_valid));
    }

    #[test]
    fn test_load_csv_bad_number() {
        let path = temp_path("bad.csv");
        std::fs::write(
            &path,
            "datetime,open,high,low,close,volume\n2024-01-02 09:00:00,x,1,1,1,1\n",
        )
        .unwrap();
        let err = load_csv(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(format!("{:#}", err).contains("open"));
    }

    #[test]
    fn test_write_decisions() {
        use crate::{Decision, DecisionReason};
        let path = temp_path("decisions.csv");
        let ts = parse_datetime("2024-01-02 09:00:00").unwrap();
        let record = DecisionRecord::new(
            &Symbol::new("EURUSD"),
            Timeframe::M5,
            &Decision::none(ts, 0.1, DecisionReason::Filtered),
        );
        write_decisions_csv(&path, &[record]).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(contents.starts_with("symbol,timeframe,timestamp,action,reason"));
        assert!(contents.contains("EURUSD,M5"));
        assert!(contents.contains("none,filtered"));
    }
}
