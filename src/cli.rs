//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report::JsonReportAdapter;
use crate::adapters::text_report::TextReportAdapter;
use crate::domain::config_validation::{
    self, empty_policy, parse_cost_override, parse_double, parse_int, parse_list,
    parse_weights, rebalance_frequency, required_string, strategy_type,
    validate_backtest_config, validate_strategy_config,
};
use crate::domain::cost::PerInstrumentCostModel;
use crate::domain::engine::{
    BacktestConfig, BacktestEngine, DEFAULT_MAX_LEVERAGE, DEFAULT_SLIPPAGE_BPS,
    DEFAULT_TRANSACTION_COST_BPS,
};
use crate::domain::error::VintageError;
use crate::domain::loader::{AsOf, Lookback, PointInTimeLoader};
use crate::domain::metrics::SHARPE_CAP;
use crate::domain::observation::parse_period;
use crate::domain::producers::{ConstantWeights, CurveSlope, TimeSeriesMomentum};
use crate::domain::result::BacktestResult;
use crate::domain::signal::SignalProducer;
use crate::domain::sweep::{run_parallel, walk_forward_windows, SweepJob};
use crate::ports::config_port::ConfigPort;
use crate::ports::report_port::ReportPort;
use crate::ports::temporal_store::TemporalStore;

#[derive(Parser, Debug)]
#[command(name = "vintage", about = "Point-in-time backtester for macro strategies")]
pub struct Cli {
    /// Debug logging unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Write the text report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        json: Option<PathBuf>,
        #[arg(long)]
        equity_csv: Option<PathBuf>,
        #[arg(long)]
        trades_csv: Option<PathBuf>,
    },
    /// Validate a configuration without running it
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Append observations from a CSV file to the store
    Import {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        csv: PathBuf,
    },
    /// List stored series with their period ranges
    Series {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show the revision history of one period
    Vintages {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        series: String,
        #[arg(long)]
        period: String,
        /// Only revisions public by this date (YYYY-MM-DD)
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Show the range and latest known value of one series
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        series: String,
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Run rolling windows of the configured backtest in parallel
    WalkForward {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long, default_value_t = 36)]
        window_months: u32,
        #[arg(long, default_value_t = 12)]
        step_months: u32,
        #[arg(long)]
        json: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    init_tracing(cli.verbose);

    let outcome = match cli.command {
        Command::Backtest {
            config,
            output,
            json,
            equity_csv,
            trades_csv,
        } => run_backtest(
            &config,
            output.as_deref(),
            json.as_deref(),
            equity_csv.as_deref(),
            trades_csv.as_deref(),
        ),
        Command::Validate { config } => run_validate(&config),
        Command::Import { config, csv } => run_import(&config, &csv),
        Command::Series { config } => run_series(&config),
        Command::Vintages {
            config,
            series,
            period,
            as_of,
        } => run_vintages(&config, &series, &period, as_of.as_deref()),
        Command::Info {
            config,
            series,
            as_of,
        } => run_info(&config, &series, as_of.as_deref()),
        Command::WalkForward {
            config,
            window_months,
            step_months,
            json,
        } => run_walk_forward(&config, window_months, step_months, json.as_deref()),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    // A subscriber may already be installed when run() is called more than once.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, VintageError> {
    FileConfigAdapter::from_file(path).map_err(|e| VintageError::ConfigParse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn load_validated(path: &Path) -> Result<FileConfigAdapter, VintageError> {
    eprintln!("Loading config from {}", path.display());
    let adapter = load_config(path)?;
    validate_backtest_config(&adapter)?;
    validate_strategy_config(&adapter)?;
    Ok(adapter)
}

fn run_backtest(
    config_path: &Path,
    output_path: Option<&Path>,
    json_path: Option<&Path>,
    equity_csv: Option<&Path>,
    trades_csv: Option<&Path>,
) -> Result<(), VintageError> {
    // Stage 1: load and validate config
    let adapter = load_validated(config_path)?;

    // Stage 2: build run inputs
    let bt_config = build_backtest_config(&adapter)?;
    let cost_model = build_cost_model(&adapter, &bt_config)?;
    let producer = build_producer(&adapter)?;
    eprintln!("Strategy: {}", producer.name());

    // Stage 3: open store and run
    let store = open_store(&adapter)?;
    let engine = BacktestEngine::new(&bt_config, store.as_ref()).with_cost_model(Arc::new(cost_model));
    let ledger = engine.simulate(producer.as_ref())?;
    let result = BacktestResult::from_ledger(producer.name(), &bt_config, &ledger);

    // Stage 4: reports
    let text = TextReportAdapter::default();
    match output_path {
        Some(path) => {
            text.write(&result, path)?;
            eprintln!("Report written to {}", path.display());
        }
        None => print!("{}", text.render(&result)),
    }
    if let Some(path) = json_path {
        JsonReportAdapter.write(&result, path)?;
        eprintln!("Result record written to {}", path.display());
    }
    if let Some(path) = equity_csv {
        csv_adapter::write_equity_curve(ledger.equity_curve(), path)?;
        eprintln!("Equity curve written to {}", path.display());
    }
    if let Some(path) = trades_csv {
        csv_adapter::write_trade_log(ledger.trade_log(), path)?;
        eprintln!("Trade log written to {}", path.display());
    }
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), VintageError> {
    let adapter = load_validated(config_path)?;
    let bt_config = build_backtest_config(&adapter)?;
    let cost_model = build_cost_model(&adapter, &bt_config)?;
    let producer = build_producer(&adapter)?;

    eprintln!("\nStrategy:   {} ({})", producer.name(), strategy_type(&adapter)?);
    eprintln!(
        "Period:     {} to {}, {} rebalancing ({} dates)",
        bt_config.start_date,
        bt_config.end_date,
        bt_config.rebalance_frequency,
        bt_config.rebalance_dates().len()
    );
    eprintln!(
        "Costs:      {} bps + {} bps slippage, {} overrides",
        bt_config.transaction_cost_bps,
        bt_config.slippage_bps,
        cost_model.override_count()
    );
    eprintln!("On empty:   {}", producer.empty_signal().as_str());
    eprintln!("\nConfiguration is valid.");
    Ok(())
}

#[cfg(feature = "sqlite")]
fn run_import(config_path: &Path, csv_path: &Path) -> Result<(), VintageError> {
    use crate::adapters::sqlite_store::SqliteStore;

    let adapter = load_config(config_path)?;
    let store = SqliteStore::from_config(&adapter)?;
    eprintln!("Reading observations from {}", csv_path.display());
    let observations = csv_adapter::read_observations(csv_path)?;
    let inserted = store.append_batch(&observations)?;
    info!(inserted, read = observations.len(), "import finished");
    println!(
        "Imported {} of {} observations ({} duplicates skipped)",
        inserted,
        observations.len(),
        observations.len() - inserted
    );
    Ok(())
}

#[cfg(not(feature = "sqlite"))]
fn run_import(_config_path: &Path, _csv_path: &Path) -> Result<(), VintageError> {
    Err(VintageError::Store {
        reason: "sqlite feature is required for import".into(),
    })
}

fn run_series(config_path: &Path) -> Result<(), VintageError> {
    let adapter = load_config(config_path)?;
    let store = open_store(&adapter)?;
    let series = store.list_series()?;
    if series.is_empty() {
        eprintln!("store is empty");
        return Ok(());
    }
    println!(
        "{:<24} {:>10} {:>10} {:>8} {:>9}",
        "series", "first", "last", "periods", "revisions"
    );
    for id in series {
        if let Some(range) = store.series_range(&id)? {
            println!(
                "{:<24} {:>10} {:>10} {:>8} {:>9}",
                id, range.first_period, range.last_period, range.observations, range.revisions
            );
        }
    }
    Ok(())
}

fn run_vintages(
    config_path: &Path,
    series_id: &str,
    period: &str,
    as_of: Option<&str>,
) -> Result<(), VintageError> {
    let period = parse_period(period).ok_or_else(|| VintageError::InvalidObservation {
        series_id: series_id.to_string(),
        reason: format!("invalid period '{period}'"),
    })?;
    let as_of = parse_as_of(as_of)?;
    let adapter = load_config(config_path)?;
    let store = open_store(&adapter)?;
    let loader = PointInTimeLoader::new(store.as_ref());

    let vintages = loader.get_vintages(series_id, period, as_of)?;
    if vintages.is_empty() {
        eprintln!("{series_id} {period}: no revisions known");
        return Ok(());
    }
    println!("{:>8} {:<30} {:>14}", "revision", "known", "value");
    for obs in vintages {
        println!(
            "{:>8} {:<30} {:>14}",
            obs.revision_index,
            obs.knowledge_time.to_string(),
            obs.value
        );
    }
    Ok(())
}

fn run_info(config_path: &Path, series_id: &str, as_of: Option<&str>) -> Result<(), VintageError> {
    let as_of = parse_as_of(as_of)?;
    let adapter = load_config(config_path)?;
    let store = open_store(&adapter)?;

    let Some(range) = store.series_range(series_id)? else {
        eprintln!("{series_id}: no data found");
        return Ok(());
    };
    println!(
        "{}: {} periods, {} revisions, {} to {}",
        series_id, range.observations, range.revisions, range.first_period, range.last_period
    );

    let loader = PointInTimeLoader::new(store.as_ref());
    match loader.get_latest(series_id, as_of, Lookback::Unbounded)? {
        Some(point) => println!("latest known: {} = {}", point.period, point.value),
        None => println!("latest known: none"),
    }
    Ok(())
}

fn run_walk_forward(
    config_path: &Path,
    window_months: u32,
    step_months: u32,
    json_path: Option<&Path>,
) -> Result<(), VintageError> {
    let adapter = load_validated(config_path)?;
    let bt_config = build_backtest_config(&adapter)?;
    let cost_model = Arc::new(build_cost_model(&adapter, &bt_config)?);
    let producer = build_producer(&adapter)?;

    let windows = walk_forward_windows(
        bt_config.start_date,
        bt_config.end_date,
        window_months,
        step_months,
    )?;
    if windows.is_empty() {
        return Err(VintageError::config_invalid(
            "walk_forward",
            "window_months",
            "window is longer than the backtest period",
        ));
    }

    let jobs: Vec<SweepJob> = windows
        .iter()
        .map(|&(start, end)| {
            let config = BacktestConfig {
                start_date: start,
                end_date: end,
                ..bt_config.clone()
            };
            SweepJob::new(&format!("{start}..{end}"), config, Arc::clone(&producer))
                .with_cost_model(cost_model.clone())
        })
        .collect();

    let store = open_store(&adapter)?;
    eprintln!("Running {} windows of {} months", jobs.len(), window_months);
    let outcomes = run_parallel(store.as_ref(), &jobs);

    println!(
        "{:<24} {:>12} {:>10} {:>12}",
        "window", "return", "sharpe", "max dd"
    );
    let mut results = Vec::with_capacity(outcomes.len());
    let mut first_error = None;
    for outcome in outcomes {
        match outcome.result {
            Ok(result) => {
                let m = &result.metrics;
                let sharpe = if m.sharpe_ratio >= SHARPE_CAP {
                    "capped".to_string()
                } else {
                    format!("{:.3}", m.sharpe_ratio)
                };
                println!(
                    "{:<24} {:>11.2}% {:>10} {:>11.2}%",
                    outcome.label,
                    m.total_return * 100.0,
                    sharpe,
                    m.max_drawdown * 100.0
                );
                results.push(result);
            }
            Err(e) => {
                eprintln!("{}: {e}", outcome.label);
                first_error.get_or_insert(e);
            }
        }
    }

    if let Some(path) = json_path {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &results)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        eprintln!("Window results written to {}", path.display());
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn parse_as_of(value: Option<&str>) -> Result<AsOf, VintageError> {
    match value {
        None => Ok(AsOf::unbounded()),
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map(AsOf::end_of_day)
            .map_err(|_| {
                VintageError::config_invalid("cli", "as_of", "expected YYYY-MM-DD")
            }),
    }
}

#[cfg(feature = "sqlite")]
pub fn open_store(config: &dyn ConfigPort) -> Result<Box<dyn TemporalStore>, VintageError> {
    use crate::adapters::sqlite_store::SqliteStore;
    Ok(Box::new(SqliteStore::from_config(config)?))
}

#[cfg(not(feature = "sqlite"))]
pub fn open_store(_config: &dyn ConfigPort) -> Result<Box<dyn TemporalStore>, VintageError> {
    Err(VintageError::Store {
        reason: "sqlite feature is required to open a store".into(),
    })
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, VintageError> {
    let start_date = config_validation::parse_date(adapter, "start_date")?;
    let end_date = config_validation::parse_date(adapter, "end_date")?;
    let initial_capital = parse_double(adapter, "backtest", "initial_capital", 0.0)?;

    Ok(BacktestConfig::new(start_date, end_date, initial_capital)
        .with_frequency(rebalance_frequency(adapter)?)
        .with_costs(
            parse_double(
                adapter,
                "backtest",
                "transaction_cost_bps",
                DEFAULT_TRANSACTION_COST_BPS,
            )?,
            parse_double(adapter, "backtest", "slippage_bps", DEFAULT_SLIPPAGE_BPS)?,
        )
        .with_max_leverage(parse_double(
            adapter,
            "backtest",
            "max_leverage",
            DEFAULT_MAX_LEVERAGE,
        )?))
}

/// Run-wide bps rates with `[costs]` overrides on top.
pub fn build_cost_model(
    adapter: &dyn ConfigPort,
    config: &BacktestConfig,
) -> Result<PerInstrumentCostModel, VintageError> {
    let mut model = PerInstrumentCostModel::new(config.cost_model());
    for instrument in adapter.keys("costs") {
        let value = adapter.get_string("costs", &instrument).unwrap_or_default();
        model = model.with_override(&instrument, parse_cost_override(&instrument, &value)?);
    }
    Ok(model)
}

pub fn build_producer(adapter: &dyn ConfigPort) -> Result<Arc<dyn SignalProducer>, VintageError> {
    let kind = strategy_type(adapter)?;
    let name = adapter
        .get_string("strategy", "name")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| kind.clone());
    let policy = empty_policy(adapter)?;

    let producer: Arc<dyn SignalProducer> = match kind.as_str() {
        "constant" => {
            let weights =
                parse_weights(&adapter.get_string("strategy", "weights").unwrap_or_default())?;
            Arc::new(ConstantWeights::new(&name, weights).with_empty_policy(policy))
        }
        "momentum" => {
            let instruments = parse_list(&required_string(adapter, "strategy", "instruments")?);
            let months = non_negative_u32(adapter, "lookback_months", 12)?.max(1);
            let gross = parse_double(adapter, "strategy", "gross_weight", 1.0)?;
            Arc::new(TimeSeriesMomentum::new(&name, instruments, months, gross))
        }
        "curve_slope" => Arc::new(CurveSlope {
            name,
            curve_id: required_string(adapter, "strategy", "curve")?,
            short_tenor: adapter
                .get_string("strategy", "short_tenor")
                .unwrap_or_else(|| "2Y".into()),
            long_tenor: adapter
                .get_string("strategy", "long_tenor")
                .unwrap_or_else(|| "10Y".into()),
            steepener: required_string(adapter, "strategy", "steepener")?,
            flattener: adapter
                .get_string("strategy", "flattener")
                .filter(|s| !s.trim().is_empty()),
            threshold: parse_double(adapter, "strategy", "threshold", 0.0)?,
            weight: parse_double(adapter, "strategy", "weight", 1.0)?,
            lookback: Lookback::Days(non_negative_u32(adapter, "lookback_days", 10)?),
        }),
        other => {
            return Err(VintageError::UnknownProducer {
                name: other.to_string(),
            });
        }
    };
    Ok(producer)
}

fn non_negative_u32(adapter: &dyn ConfigPort, key: &str, default: i64) -> Result<u32, VintageError> {
    let value = parse_int(adapter, "strategy", key, default)?;
    u32::try_from(value)
        .map_err(|_| VintageError::config_invalid("strategy", key, "out of range"))
}
