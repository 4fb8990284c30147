//! Replay command implementation

use anyhow::{Context, Result};
use atr_strategy::data::{self, DecisionRecord};
use atr_strategy::replay::{replay, ReplayReport};
use atr_strategy::{Bar, Config, StrategyEngine, StrategyOrchestrator};
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use rayon::prelude::*;
use std::path::Path;
use tracing::{error, info};

pub fn run(config_path: String, output: Option<String>, sequential: bool) -> Result<()> {
    info!("Starting replay");

    let config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    if config.streams.is_empty() {
        anyhow::bail!("No streams configured in {}", config_path);
    }

    let engine = StrategyEngine::from_config(&config).context("Invalid stream parameters")?;
    info!("Built {} streams", engine.len());

    // Load every stream's bars up front so failures show before any work
    let mut jobs: Vec<(StrategyOrchestrator, Vec<Bar>)> = Vec::with_capacity(engine.len());
    for orchestrator in engine.into_streams() {
        let stream = config
            .stream(orchestrator.symbol(), orchestrator.timeframe())
            .context("Stream missing from config")?;
        let path = Path::new(&config.data_dir).join(stream.data_file());
        let bars = data::load_csv(&path)
            .with_context(|| format!("Failed to load data for {} {}", stream.symbol, stream.timeframe))?;
        jobs.push((orchestrator, bars));
    }

    let total_bars: usize = jobs.iter().map(|(_, bars)| bars.len()).sum();
    println!("\n{}", "=".repeat(70));
    println!("REPLAY");
    println!("{}", "=".repeat(70));
    println!("  Streams:   {}", jobs.len());
    println!("  Bars:      {}", total_bars);
    println!("  Mode:      {}", if sequential { "sequential" } else { "parallel" });
    println!("{}\n", "=".repeat(70));

    let pb = ProgressBar::new(jobs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{percent:>3}%|{bar:40}| {pos}/{len} streams [{elapsed}] {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("█░ "),
    );

    let run_one = |(mut orchestrator, bars): (StrategyOrchestrator, Vec<Bar>)| {
        let label = format!("{} {}", orchestrator.symbol(), orchestrator.timeframe());
        let result = replay(&mut orchestrator, &bars).with_context(|| format!("Replay failed for {}", label));
        pb.inc(1);
        pb.set_message(label);
        result
    };

    let results: Vec<Result<ReplayReport>> = if sequential {
        jobs.into_iter().map(run_one).collect()
    } else {
        jobs.into_par_iter().map(run_one).collect()
    };
    pb.finish_with_message("done");

    let (reports, failures): (Vec<_>, Vec<_>) = results.into_iter().partition_result();
    for failure in &failures {
        error!("{:#}", failure);
    }

    print_reports(&reports);

    if let Some(output) = output {
        let records: Vec<DecisionRecord> = reports
            .iter()
            .flat_map(|r| r.decisions.iter().map(|d| DecisionRecord::new(&r.symbol, r.timeframe, d)))
            .collect();
        data::write_decisions_csv(&output, &records)?;
        info!("Wrote {} decisions to {}", records.len(), output);
    }

    if !failures.is_empty() {
        anyhow::bail!("{} of {} streams failed", failures.len(), failures.len() + reports.len());
    }

    info!("Replay completed successfully");
    Ok(())
}

fn print_reports(reports: &[ReplayReport]) {
    println!("\n{}", "=".repeat(100));
    println!(
        "{:<10} {:<5} {:>8} {:>7} {:>7} {:>9} {:>9} {:>12} {:>12} {:<16}",
        "Symbol", "TF", "Bars", "Opens", "Closes", "Filtered", "Warmup", "ATR mean", "ATR max", "Final state"
    );
    println!("{}", "-".repeat(100));
    for r in reports.iter().sorted_by(|a, b| (&a.symbol, a.timeframe).cmp(&(&b.symbol, b.timeframe))) {
        let (mean, max) = r
            .atr
            .map(|s| (format!("{:.6}", s.mean), format!("{:.6}", s.max)))
            .unwrap_or_else(|| ("-".to_string(), "-".to_string()));
        println!(
            "{:<10} {:<5} {:>8} {:>7} {:>7} {:>9} {:>9} {:>12} {:>12} {:<16}",
            r.symbol.as_str(),
            r.timeframe.as_str(),
            r.bars,
            r.opens,
            r.closes,
            r.filtered,
            r.awaiting_history,
            mean,
            max,
            format!("{:?}", r.final_state)
        );
    }
    println!("{}", "=".repeat(100));
}
