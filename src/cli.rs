//! CLI definition and dispatch.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::CsvMarketData;
use crate::adapters::csv_report_adapter::{CsvReportAdapter, Summary};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::log_intent_adapter::LogIntentSink;
use crate::adapters::synthetic_adapter::SyntheticDataProvider;
use crate::domain::backtest::{self as engine, BacktestConfig, RunContext, RunStatus, SimulationResult};
use crate::domain::config_validation::{load_backtest_config, load_strategy};
use crate::domain::error::BotsimError;
use crate::domain::strategy::{Strategy, StrategyKind};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::MarketDataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "botsim", about = "Backtester for short-horizon token trading bots")]
pub struct Cli {
    /// Debug-level logging unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one strategy over the configured horizon
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Strategy name, overriding [strategy] name
        #[arg(short, long)]
        strategy: Option<String>,
        /// Directory for trades.csv, daily.csv and summary.json
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Config override, e.g. --set backtest.horizon_days=3
        #[arg(long = "set", value_name = "SECTION.KEY=VALUE")]
        set: Vec<String>,
        /// Print the summary as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Run every strategy in parallel on the same data
    Compare {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long = "set", value_name = "SECTION.KEY=VALUE")]
        set: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Check a configuration without running it
    Validate {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long = "set", value_name = "SECTION.KEY=VALUE")]
        set: Vec<String>,
    },
}

/// Installs the fmt subscriber on stderr. `RUST_LOG` wins over `--verbose`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run(cli: Cli) -> ExitCode {
    let outcome = match cli.command {
        Command::Backtest {
            config,
            strategy,
            output,
            set,
            json,
        } => run_single(&config, strategy.as_deref(), output.as_deref(), &set, json),
        Command::Compare {
            config,
            output,
            set,
            json,
        } => run_compare(&config, output.as_deref(), &set, json),
        Command::Validate { config, set } => run_validate(&config, &set),
    };
    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path, overrides: &[String]) -> Result<FileConfigAdapter, BotsimError> {
    FileConfigAdapter::from_file(path)?.with_overrides(overrides)
}

/// Builds the market data source named by `[data] source`.
pub fn build_market_data(
    config: &dyn ConfigPort,
    backtest: &BacktestConfig,
) -> Result<Box<dyn MarketDataPort + Sync>, BotsimError> {
    let source = config
        .get_string("data", "source")
        .unwrap_or_else(|| "synthetic".to_string());
    match source.trim().to_ascii_lowercase().as_str() {
        "synthetic" => Ok(Box::new(SyntheticDataProvider::new(backtest.seed))),
        "csv" => {
            let dir = config
                .get_string("data", "dir")
                .filter(|d| !d.trim().is_empty())
                .ok_or_else(|| BotsimError::missing("data", "dir"))?;
            Ok(Box::new(CsvMarketData::new(PathBuf::from(dir.trim()))))
        }
        other => Err(BotsimError::invalid(
            "data",
            "source",
            format!("expected synthetic or csv, got {other:?}"),
        )),
    }
}

fn run_single(
    config_path: &Path,
    strategy_name: Option<&str>,
    output: Option<&Path>,
    overrides: &[String],
    json: bool,
) -> Result<ExitCode, BotsimError> {
    info!(path = %config_path.display(), "loading config");
    let config = load_config(config_path, overrides)?;
    let backtest = load_backtest_config(&config)?;
    let strategy = load_strategy(&config, strategy_name)?;
    let market = build_market_data(&config, &backtest)?;

    info!(
        strategy = %strategy.kind(),
        days = backtest.horizon_days,
        end_date = %backtest.end_date,
        "starting backtest"
    );
    let sink = LogIntentSink::new();
    let ctx = RunContext::new(&backtest, &strategy, market.as_ref()).with_intents(&sink);
    let result = engine::run_backtest(&ctx);

    if let Some(dir) = output {
        CsvReportAdapter::new().write(&result, dir)?;
        info!(dir = %dir.display(), "report written");
    }
    print_summary(&result);
    if json {
        print_json(&Summary::from(&result))?;
    }
    Ok(status_code(&result.status))
}

fn run_compare(
    config_path: &Path,
    output: Option<&Path>,
    overrides: &[String],
    json: bool,
) -> Result<ExitCode, BotsimError> {
    let config = load_config(config_path, overrides)?;
    let backtest = load_backtest_config(&config)?;
    let market = build_market_data(&config, &backtest)?;
    let strategies = compare_strategies(&config)?;

    info!(strategies = strategies.len(), "starting comparison");
    let results = engine::run_parallel(&strategies, &backtest, market.as_ref());

    if let Some(dir) = output {
        CsvReportAdapter::new().write_many(&results, dir)?;
    }
    for result in &results {
        print_summary(result);
    }
    if json {
        let summaries: Vec<Summary<'_>> = results.iter().map(Summary::from).collect();
        print_json(&summaries)?;
    }

    let failed = results.iter().find(|r| !r.status.is_completed());
    Ok(failed.map_or(ExitCode::SUCCESS, |r| status_code(&r.status)))
}

/// One strategy per kind. The kind named in `[strategy] name` carries the
/// section's overrides; the others run with their defaults.
pub fn compare_strategies(config: &dyn ConfigPort) -> Result<Vec<Strategy>, BotsimError> {
    let configured = match config
        .get_string("strategy", "name")
        .filter(|n| !n.trim().is_empty())
    {
        Some(_) => Some(load_strategy(config, None)?),
        None => None,
    };
    Ok(StrategyKind::ALL
        .into_iter()
        .map(|kind| match &configured {
            Some(strategy) if strategy.kind() == kind => strategy.clone(),
            _ => Strategy::default_for(kind),
        })
        .collect())
}

fn run_validate(config_path: &Path, overrides: &[String]) -> Result<ExitCode, BotsimError> {
    eprintln!("Validating config: {}", config_path.display());
    let config = load_config(config_path, overrides)?;
    let backtest = load_backtest_config(&config)?;
    let strategy = load_strategy(&config, None)?;
    build_market_data(&config, &backtest)?;

    let plan = strategy.exit_plan();
    eprintln!("  Strategy:       {}", strategy.kind());
    if let Some(first) = backtest.days().first() {
        eprintln!("  Days:           {first} .. {}", backtest.end_date);
    }
    eprintln!("  Capital:        {:.2}", backtest.initial_capital);
    eprintln!("  Risk:           {:.1}%", strategy.risk_pct());
    eprintln!("  Stop loss:      -{:.1}%", plan.stop_loss_pct);
    eprintln!("  Take profit:    +{:.1}%", plan.take_profit_pct);
    for partial in &plan.partial_exits {
        eprintln!(
            "  Partial exit:   {:.0}% of size at +{:.1}%",
            partial.fraction * 100.0,
            partial.trigger_pct
        );
    }
    eprintln!("\nConfiguration is valid.");
    Ok(ExitCode::SUCCESS)
}

fn status_code(status: &RunStatus) -> ExitCode {
    match status {
        RunStatus::Completed => ExitCode::SUCCESS,
        RunStatus::Cancelled { .. } => ExitCode::from(130),
        RunStatus::Failed { .. } => ExitCode::from(3),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), BotsimError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| BotsimError::Report {
        reason: format!("failed to encode summary: {e}"),
    })?;
    println!("{text}");
    Ok(())
}

fn print_summary(result: &SimulationResult) {
    eprintln!("\n{} ({})", result.strategy, status_label(&result.status));
    eprintln!("  Initial capital:  {:.2}", result.initial_capital);
    eprintln!("  Final capital:    {:.2}", result.final_capital);
    eprintln!("  Profit:           {:+.2}%", result.profit_percent);
    eprintln!("  Trades:           {}", result.trades.len());
    match result.success_rate {
        Some(rate) => eprintln!("  Success rate:     {rate:.1}%"),
        None => eprintln!("  Success rate:     n/a"),
    }
    eprintln!("  Max drawdown:     {:.2}%", result.max_drawdown_percent);
    if let Some(pf) = result.stats.profit_factor {
        eprintln!("  Profit factor:    {pf:.2}");
    }
    if !result.diagnostics.is_empty() {
        eprintln!("  Diagnostics:      {}", result.diagnostics.len());
    }
}

fn status_label(status: &RunStatus) -> String {
    match status {
        RunStatus::Completed => "completed".to_string(),
        RunStatus::Cancelled { completed_days } => format!("cancelled after {completed_days} days"),
        RunStatus::Failed { reason, .. } => format!("failed: {reason}"),
    }
}
