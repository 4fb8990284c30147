//! Params command implementation

use anyhow::{Context, Result};
use atr_strategy::{Config, StrategyOrchestrator, Symbol, Timeframe};
use serde_json::json;
use tracing::info;

pub fn run(symbol: String, timeframe: String, config_path: Option<String>) -> Result<()> {
    let timeframe: Timeframe = timeframe.parse()?;
    let symbol = Symbol::new(symbol.to_uppercase());

    let config = match config_path {
        Some(path) => {
            info!("Loaded configuration from: {}", path);
            Config::from_file(&path)?
        }
        None => Config::default(),
    };

    let (indicator, strategy) = config.resolve(&symbol, timeframe);

    // Building the orchestrator validates every method id and level
    StrategyOrchestrator::new(symbol.clone(), indicator, strategy.clone())
        .with_context(|| format!("Invalid parameters for {} {}", symbol, timeframe))?;

    let table = json!({
        "symbol": symbol,
        "timeframe": timeframe.as_str(),
        "indicator": indicator,
        "strategy": strategy,
    });
    println!("{}", serde_json::to_string_pretty(&table)?);

    Ok(())
}
