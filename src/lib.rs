//! ATR Strategy Engine
//!
//! A streaming Average-True-Range indicator feeding a rule-based signal
//! generator with configurable open/close rules, ATR-based stop placement and
//! spread filtering. Bars go in one at a time per (instrument, timeframe)
//! stream and one [`Decision`] comes out per bar; order execution is left to
//! the caller.
//!
//! ```
//! use atr_strategy::config::{AtrParams, StrategyParams};
//! use atr_strategy::engine::StrategyEngine;
//! use atr_strategy::{Bar, DecisionReason, Symbol, Timeframe};
//! use chrono::{TimeZone, Utc};
//!
//! let mut engine = StrategyEngine::new();
//! let eurusd = Symbol::new("EURUSD");
//! engine
//!     .register(eurusd.clone(), AtrParams::for_timeframe(Timeframe::M1), StrategyParams::default())
//!     .unwrap();
//!
//! let ts = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
//! let bar = Bar::new(ts, 1.1000, 1.1010, 1.0990, 1.1005, 120.0).unwrap();
//! let decision = engine.push_bar(&eurusd, Timeframe::M1, &bar).unwrap();
//! assert_eq!(decision.reason, DecisionReason::InsufficientHistory);
//! ```

pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod filters;
pub mod indicators;
pub mod presets;
pub mod replay;
pub mod signals;
pub mod stops;
pub mod types;

pub use config::Config;
pub use engine::{StrategyEngine, StrategyOrchestrator};
pub use error::{StrategyError, StrategyResult};
pub use types::*;
