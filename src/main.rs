//! ATR strategy engine - main entry point
//!
//! This binary provides two subcommands:
//! - replay: Push recorded bars through the configured streams
//! - params: Print the resolved parameter table of a stream

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "atr-strategy")]
#[command(about = "ATR volatility strategy engine: replay bars and inspect parameter tables", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay CSV bars through every configured stream
    Replay {
        /// Path to configuration file (falls back to $ATR_STRATEGY_CONFIG)
        #[arg(short, long)]
        config: Option<String>,

        /// Write every decision to this CSV file
        #[arg(short, long)]
        output: Option<String>,

        /// Run streams sequentially instead of parallel
        #[arg(long)]
        sequential: bool,
    },

    /// Show the resolved parameters for one stream
    Params {
        /// Instrument symbol, e.g. EURUSD
        #[arg(short, long)]
        symbol: String,

        /// Timeframe, e.g. M1, M5, 1h
        #[arg(short, long)]
        timeframe: String,

        /// Path to configuration file (falls back to $ATR_STRATEGY_CONFIG)
        #[arg(short, long)]
        config: Option<String>,
    },
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // Create log file with naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    if file_only {
        // Parallel replay: only log to file, keep console clean for progress bar
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        info!("Logging initialized");
        info!("Log file: {}", log_path.display());
    }

    Ok(())
}

fn config_path(arg: Option<String>) -> Option<String> {
    arg.or_else(|| std::env::var("ATR_STRATEGY_CONFIG").ok())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let (command_name, file_only) = match &cli.command {
        Commands::Replay { sequential, .. } => ("replay", !*sequential),
        Commands::Params { .. } => ("params", false),
    };

    setup_logging(cli.verbose, command_name, file_only)?;

    match cli.command {
        Commands::Replay {
            config,
            output,
            sequential,
        } => {
            let config = config_path(config)
                .context("No config given: pass --config or set ATR_STRATEGY_CONFIG")?;
            commands::replay::run(config, output, sequential)
        }

        Commands::Params {
            symbol,
            timeframe,
            config,
        } => commands::params::run(symbol, timeframe, config_path(config)),
    }
}
