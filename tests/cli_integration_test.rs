//! CLI integration tests.
//!
//! Tests cover:
//! - Config parsing (build_backtest_config, build_cost_model, build_producer)
//! - Validation failures and their exit codes
//! - Import, backtest, inspection and walk-forward commands against a SQLite file

mod common;

use approx::assert_relative_eq;
use common::*;
use vintage::adapters::file_config_adapter::FileConfigAdapter;
use vintage::cli;
use vintage::domain::error::VintageError;
use vintage::domain::schedule::RebalanceFrequency;
use vintage::domain::signal::EmptySignal;

const VALID_INI: &str = r#"
[store]
path = /tmp/vintage-test.db

[backtest]
start_date = 2020-01-01
end_date = 2024-12-31
initial_capital = 1000000.0
rebalance_frequency = weekly
transaction_cost_bps = 3.0
slippage_bps = 1.0
max_leverage = 2.0

[costs]
EURUSD = 0.5,0.25
UST10Y = 1.5

[strategy]
name = Curve Slope
type = curve_slope
curve = UST
short_tenor = 2Y
long_tenor = 10Y
steepener = STEEP
flattener = FLAT
threshold = 0.25
on_empty = liquidate
"#;

mod config_loading {
    use super::*;

    #[test]
    fn build_backtest_config_valid_full() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let config = cli::build_backtest_config(&adapter).unwrap();

        assert_eq!(config.start_date, date(2020, 1, 1));
        assert_eq!(config.end_date, date(2024, 12, 31));
        assert_eq!(config.initial_capital, 1_000_000.0);
        assert_eq!(config.rebalance_frequency, RebalanceFrequency::Weekly);
        assert_eq!(config.transaction_cost_bps, 3.0);
        assert_eq!(config.slippage_bps, 1.0);
        assert_eq!(config.max_leverage, 2.0);
    }

    #[test]
    fn build_backtest_config_uses_defaults() {
        let ini = "[backtest]\nstart_date = 2024-01-01\nend_date = 2024-06-30\ninitial_capital = 500\n";
        let adapter = FileConfigAdapter::from_string(ini).unwrap();
        let config = cli::build_backtest_config(&adapter).unwrap();

        assert_eq!(config.rebalance_frequency, RebalanceFrequency::Monthly);
        assert_eq!(config.transaction_cost_bps, 5.0);
        assert_eq!(config.slippage_bps, 2.0);
        assert_eq!(config.max_leverage, 1.0);
    }

    #[test]
    fn build_backtest_config_rejects_malformed_number() {
        let ini = "[backtest]\nstart_date = 2024-01-01\nend_date = 2024-06-30\ninitial_capital = lots\n";
        let adapter = FileConfigAdapter::from_string(ini).unwrap();
        let err = cli::build_backtest_config(&adapter).unwrap_err();
        assert!(matches!(err, VintageError::ConfigInvalid { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn build_cost_model_applies_overrides() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let config = cli::build_backtest_config(&adapter).unwrap();
        let model = cli::build_cost_model(&adapter, &config).unwrap();

        assert_eq!(model.override_count(), 2);
        let eurusd = model.rates_for("EURUSD");
        assert_eq!((eurusd.cost_bps, eurusd.slippage_bps), (0.5, 0.25));
        let ust = model.rates_for("UST10Y");
        assert_eq!((ust.cost_bps, ust.slippage_bps), (1.5, 0.0));
        let other = model.rates_for("BUND");
        assert_eq!((other.cost_bps, other.slippage_bps), (3.0, 1.0));
    }

    #[test]
    fn build_producer_curve_slope() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let producer = cli::build_producer(&adapter).unwrap();
        assert_eq!(producer.name(), "Curve Slope");
        assert_eq!(producer.empty_signal(), EmptySignal::Hold);
    }

    #[test]
    fn build_producer_constant_honours_empty_policy() {
        let ini = "[strategy]\ntype = constant\nweights = A:0.5\non_empty = liquidate\n";
        let adapter = FileConfigAdapter::from_string(ini).unwrap();
        let producer = cli::build_producer(&adapter).unwrap();
        assert_eq!(producer.name(), "constant");
        assert_eq!(producer.empty_signal(), EmptySignal::Liquidate);
    }

    #[test]
    fn build_producer_momentum() {
        let ini = "[strategy]\nname = TSMOM\ntype = momentum\ninstruments = A, B\nlookback_months = 6\n";
        let adapter = FileConfigAdapter::from_string(ini).unwrap();
        assert_eq!(cli::build_producer(&adapter).unwrap().name(), "TSMOM");
    }

    #[test]
    fn build_producer_unknown_type() {
        let adapter = FileConfigAdapter::from_string("[strategy]\ntype = regime\n").unwrap();
        match cli::build_producer(&adapter) {
            Err(e @ VintageError::UnknownProducer { .. }) => assert_eq!(e.exit_code(), 4),
            Err(other) => panic!("expected UnknownProducer, got {other:?}"),
            Ok(_) => panic!("expected UnknownProducer"),
        }
    }

    #[test]
    fn load_config_missing_file_is_parse_error() {
        let err = cli::load_config(std::path::Path::new("/nonexistent/vintage.ini")).unwrap_err();
        assert!(matches!(err, VintageError::ConfigParse { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn load_config_reads_file_on_disk() {
        let file = write_temp_file(VALID_INI);
        let adapter = cli::load_config(file.path()).unwrap();
        let config = cli::build_backtest_config(&adapter).unwrap();
        assert_eq!(config.max_leverage, 2.0);
    }
}

#[cfg(feature = "sqlite")]
mod commands {
    use super::*;
    use clap::Parser;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;
    use vintage::adapters::json_report::JsonReportAdapter;
    use vintage::cli::{run, Cli};

    fn run_args(args: &[&str]) {
        let mut argv = vec!["vintage"];
        argv.extend_from_slice(args);
        let _ = run(Cli::parse_from(argv));
    }

    fn path_str(path: &Path) -> &str {
        path.to_str().unwrap()
    }

    /// Config over a fresh SQLite file with month-end prices for X imported.
    fn seeded_workspace() -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("store.db");
        let config_path = dir.path().join("vintage.ini");
        fs::write(&config_path, constant_strategy_ini(path_str(&db), "X:1.0")).unwrap();

        let dates = month_ends(date(2022, 12, 1), date(2024, 12, 31));
        let mut csv = String::from("series_id,period,value,knowledge_time\n");
        for (i, d) in dates.iter().enumerate() {
            csv.push_str(&format!("X,{d},{},{d}\n", 100.0 * 1.01_f64.powi(i as i32)));
        }
        let csv_path = dir.path().join("prices.csv");
        fs::write(&csv_path, csv).unwrap();

        run_args(&["import", "-c", path_str(&config_path), "--csv", path_str(&csv_path)]);
        (dir, config_path)
    }

    #[test]
    fn import_is_idempotent() {
        use vintage::adapters::sqlite_store::SqliteStore;
        use vintage::ports::temporal_store::TemporalStore;

        let (dir, config_path) = seeded_workspace();
        let csv_path = dir.path().join("prices.csv");
        run_args(&["import", "-c", path_str(&config_path), "--csv", path_str(&csv_path)]);

        let adapter = cli::load_config(&config_path).unwrap();
        let store = SqliteStore::from_config(&adapter).unwrap();
        let range = store.series_range("X").unwrap().unwrap();
        assert_eq!(range.observations, 25);
        assert_eq!(range.revisions, 25);
        assert_eq!(range.first_period, date(2022, 12, 30));
        assert_eq!(range.last_period, date(2024, 12, 31));
    }

    #[test]
    fn backtest_writes_every_requested_artifact() {
        let (dir, config_path) = seeded_workspace();
        let report = dir.path().join("report.txt");
        let json = dir.path().join("result.json");
        let equity = dir.path().join("equity.csv");
        let trades = dir.path().join("trades.csv");

        run_args(&[
            "backtest",
            "-c",
            path_str(&config_path),
            "-o",
            path_str(&report),
            "--json",
            path_str(&json),
            "--equity-csv",
            path_str(&equity),
            "--trades-csv",
            path_str(&trades),
        ]);

        let result = JsonReportAdapter.load(&json).unwrap();
        assert_eq!(result.strategy_name, "Static");
        assert_eq!(result.equity_curve.len(), 13);
        assert_relative_eq!(
            result.final_equity,
            1_000_000.0 * 1.01_f64.powi(12),
            max_relative = 1e-9
        );
        assert_eq!(result.trade_count, 1);

        let text = fs::read_to_string(&report).unwrap();
        assert!(text.starts_with("Backtest: Static"));

        let equity_rows = fs::read_to_string(&equity).unwrap();
        assert_eq!(equity_rows.lines().count(), 14);
        assert!(equity_rows.starts_with("date,equity\n2023-12-29,"));

        let trade_rows = fs::read_to_string(&trades).unwrap();
        assert_eq!(trade_rows.lines().count(), 2);
        assert!(trade_rows.contains(",X,open,"));
    }

    #[test]
    fn invalid_config_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("store.db");
        let config_path = dir.path().join("bad.ini");
        let ini = constant_strategy_ini(path_str(&db), "X:1.0")
            .replace("initial_capital = 1000000", "initial_capital = -5");
        fs::write(&config_path, ini).unwrap();
        let json = dir.path().join("result.json");

        run_args(&["backtest", "-c", path_str(&config_path), "--json", path_str(&json)]);
        assert!(!json.exists());
        assert!(!db.exists());
    }

    #[test]
    fn walk_forward_runs_every_window() {
        let (dir, config_path) = seeded_workspace();
        let ini = fs::read_to_string(&config_path)
            .unwrap()
            .replace("start_date = 2023-12-01", "start_date = 2023-01-01");
        fs::write(&config_path, ini).unwrap();
        let json = dir.path().join("windows.json");

        run_args(&[
            "walk-forward",
            "-c",
            path_str(&config_path),
            "--window-months",
            "6",
            "--step-months",
            "6",
            "--json",
            path_str(&json),
        ]);

        let content = fs::read_to_string(&json).unwrap();
        let windows: Vec<serde_json::Value> = serde_json::from_str(&content).unwrap();
        assert_eq!(windows.len(), 4);
        assert_eq!(windows[0]["start_date"], "2023-01-01");
        assert_eq!(windows[3]["end_date"], "2024-12-31");
    }

    #[test]
    fn inspection_commands_leave_store_unchanged() {
        use vintage::adapters::sqlite_store::SqliteStore;
        use vintage::ports::temporal_store::TemporalStore;

        let (_dir, config_path) = seeded_workspace();
        let config = path_str(&config_path);
        run_args(&["validate", "-c", config]);
        run_args(&["series", "-c", config]);
        run_args(&["info", "-c", config, "--series", "X", "--as-of", "2024-06-30"]);
        run_args(&["--verbose", "vintages", "-c", config, "--series", "X", "--period", "2024-06-28"]);

        let adapter = cli::load_config(&config_path).unwrap();
        let store = SqliteStore::from_config(&adapter).unwrap();
        assert_eq!(store.list_series().unwrap(), vec!["X".to_string()]);
        assert_eq!(store.series_range("X").unwrap().unwrap().observations, 25);
    }
}
