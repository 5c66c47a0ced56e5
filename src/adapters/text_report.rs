//! Plain-text report adapter implementing ReportPort.
//!
//! Renders a summary, the metrics table, a year-by-month returns grid and the tail
//! of the equity curve. Charts are left to external renderers working from the
//! JSON record or the equity CSV.

use crate::domain::error::VintageError;
use crate::domain::metrics::SHARPE_CAP;
use crate::domain::result::BacktestResult;
use crate::ports::report_port::ReportPort;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub struct TextReportAdapter {
    equity_tail: usize,
}

impl Default for TextReportAdapter {
    fn default() -> Self {
        Self { equity_tail: 12 }
    }
}

impl TextReportAdapter {
    pub fn new(equity_tail: usize) -> Self {
        Self { equity_tail }
    }

    pub fn render(&self, result: &BacktestResult) -> String {
        let mut out = String::new();
        render_summary(&mut out, result);
        render_metrics(&mut out, result);
        render_monthly_grid(&mut out, &result.monthly_returns);
        self.render_equity_tail(&mut out, result);
        out
    }

    fn render_equity_tail(&self, out: &mut String, result: &BacktestResult) {
        let _ = writeln!(out, "Equity curve (last {} points)", self.equity_tail);
        let skip = result.equity_curve.len().saturating_sub(self.equity_tail);
        if result.equity_curve.is_empty() {
            let _ = writeln!(out, "  (no rebalance dates)");
        }
        for point in result.equity_curve.iter().skip(skip) {
            let _ = writeln!(out, "  {}  {:>18.2}", point.date, point.equity);
        }
    }
}

fn pct(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

fn ratio(value: f64) -> String {
    if value >= SHARPE_CAP {
        "capped".to_string()
    } else {
        format!("{value:.3}")
    }
}

fn render_summary(out: &mut String, result: &BacktestResult) {
    let _ = writeln!(out, "Backtest: {}", result.strategy_name);
    let _ = writeln!(
        out,
        "Period:   {} to {} ({} rebalancing)",
        result.start_date, result.end_date, result.rebalance_frequency
    );
    let _ = writeln!(out, "Capital:  {:.2} -> {:.2}", result.initial_capital, result.final_equity);
    let _ = writeln!(out, "Trades:   {}", result.trade_count);
    let _ = writeln!(out);
}

fn render_metrics(out: &mut String, result: &BacktestResult) {
    let m = &result.metrics;
    let rows = [
        ("Total return", pct(m.total_return)),
        ("Annualized return", pct(m.annualized_return)),
        ("Annualized volatility", pct(m.annualized_volatility)),
        ("Sharpe ratio", ratio(m.sharpe_ratio)),
        ("Sortino ratio", ratio(m.sortino_ratio)),
        ("Max drawdown", pct(m.max_drawdown)),
        ("Max drawdown duration", format!("{} periods", m.max_drawdown_duration)),
        ("Calmar ratio", ratio(m.calmar_ratio)),
        ("Win rate", pct(m.win_rate)),
        ("Profit factor", ratio(m.profit_factor)),
    ];
    let _ = writeln!(out, "Metrics");
    for (label, value) in rows {
        let _ = writeln!(out, "  {label:<24}{value:>14}");
    }
    let _ = writeln!(out);
}

fn render_monthly_grid(out: &mut String, monthly: &BTreeMap<String, f64>) {
    let _ = writeln!(out, "Monthly returns");
    if monthly.is_empty() {
        let _ = writeln!(out, "  (fewer than two month-ends)");
        let _ = writeln!(out);
        return;
    }

    let mut years: BTreeMap<i32, [Option<f64>; 12]> = BTreeMap::new();
    for (key, value) in monthly {
        let Some((year, month)) = key.split_once('-') else {
            continue;
        };
        let (Ok(year), Ok(month)) = (year.parse::<i32>(), month.parse::<usize>()) else {
            continue;
        };
        if (1..=12).contains(&month) {
            years.entry(year).or_insert([None; 12])[month - 1] = Some(*value);
        }
    }

    let _ = write!(out, "  {:<6}", "Year");
    for name in MONTHS {
        let _ = write!(out, "{name:>8}");
    }
    let _ = writeln!(out, "{:>9}", "YTD");

    for (year, months) in &years {
        let _ = write!(out, "  {year:<6}");
        let mut ytd = 1.0_f64;
        for cell in months {
            match cell {
                Some(ret) => {
                    ytd *= 1.0 + ret;
                    let _ = write!(out, "{:>8}", format!("{:.2}", ret * 100.0));
                }
                None => {
                    let _ = write!(out, "{:>8}", "-");
                }
            }
        }
        let _ = writeln!(out, "{:>9}", format!("{:.2}", (ytd - 1.0) * 100.0));
    }
    let _ = writeln!(out);
}

impl ReportPort for TextReportAdapter {
    fn write(&self, result: &BacktestResult, output_path: &Path) -> Result<(), VintageError> {
        fs::write(output_path, self.render(result)).map_err(|e| VintageError::Report {
            reason: format!("failed to write {}: {}", output_path.display(), e),
        })
    }
}
