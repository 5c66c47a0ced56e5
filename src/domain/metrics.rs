//! Performance metrics derived from a finished equity curve and trade log.
//!
//! All return-like figures are fractions (0.05 is 5%). Nothing here is random, so
//! identical inputs give bit-identical outputs.

use crate::domain::ledger::{EquityPoint, TradeRecord};
use crate::domain::schedule::RebalanceFrequency;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sentinel for ratios whose denominator is numerically zero while the numerator is
/// positive (riskless gain, no losing trades).
pub const SHARPE_CAP: f64 = 1e6;

/// Volatilities below this are treated as zero.
pub const ZERO_VOLATILITY: f64 = 1e-12;

const DAYS_PER_YEAR: f64 = 365.25;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Most negative `equity / running_peak - 1`; zero without a drawdown.
    pub max_drawdown: f64,
    /// Longest run of curve points spent below a prior peak.
    pub max_drawdown_duration: usize,
    pub calmar_ratio: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
}

impl PerformanceMetrics {
    pub fn compute(
        equity_curve: &[EquityPoint],
        trades: &[TradeRecord],
        initial_capital: f64,
        frequency: RebalanceFrequency,
    ) -> Self {
        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_capital);

        let total_return = if initial_capital > 0.0 {
            final_equity / initial_capital - 1.0
        } else {
            0.0
        };

        let annualized_return = annualized_return(equity_curve);

        let returns = period_returns(equity_curve);
        let periods_per_year = frequency.periods_per_year();
        let annualized_volatility = sample_std(&returns) * periods_per_year.sqrt();
        let sharpe_ratio = capped_ratio(annualized_return, annualized_volatility);

        let sortino_ratio = match downside_deviation(&returns) {
            Some(dd) => capped_ratio(annualized_return, dd * periods_per_year.sqrt()),
            None => capped_ratio(annualized_return, 0.0),
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);
        let calmar_ratio = if max_drawdown < 0.0 {
            annualized_return / max_drawdown.abs()
        } else {
            0.0
        };

        let (win_rate, profit_factor) = trade_statistics(trades);

        PerformanceMetrics {
            total_return,
            annualized_return,
            annualized_volatility,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            calmar_ratio,
            win_rate,
            profit_factor,
        }
    }
}

/// Geometric annual return from the first curve point to the last.
///
/// Growth and elapsed time share the same base, so costs paid before the first
/// point show up in `total_return` only.
fn annualized_return(equity_curve: &[EquityPoint]) -> f64 {
    let (Some(first), Some(last)) = (equity_curve.first(), equity_curve.last()) else {
        return 0.0;
    };
    let years = (last.date - first.date).num_days() as f64 / DAYS_PER_YEAR;
    let growth = last.equity / first.equity;
    if years <= 0.0 || first.equity <= 0.0 || growth <= 0.0 || !growth.is_finite() {
        return 0.0;
    }
    growth.powf(1.0 / years) - 1.0
}

fn capped_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator < ZERO_VOLATILITY {
        if numerator > 0.0 { SHARPE_CAP } else { 0.0 }
    } else {
        numerator / denominator
    }
}

/// Simple returns between consecutive curve points.
pub fn period_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| {
            let prev = w[0].equity;
            if prev != 0.0 { w[1].equity / prev - 1.0 } else { 0.0 }
        })
        .collect()
}

/// Sample standard deviation (n - 1); zero for fewer than two values.
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt()
}

/// Root mean square of the negative returns only; `None` if there are none.
fn downside_deviation(returns: &[f64]) -> Option<f64> {
    let negatives: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if negatives.is_empty() {
        return None;
    }
    let mean_square = negatives.iter().map(|r| r * r).sum::<f64>() / negatives.len() as f64;
    Some(mean_square.sqrt())
}

fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, usize) {
    let Some(first) = equity_curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    let mut max_duration = 0usize;
    let mut current_duration = 0usize;

    for point in equity_curve {
        if point.equity >= peak {
            peak = point.equity;
            current_duration = 0;
        } else if peak > 0.0 {
            let dd = point.equity / peak - 1.0;
            if dd < max_dd {
                max_dd = dd;
            }
            current_duration += 1;
            max_duration = max_duration.max(current_duration);
        }
    }

    (max_dd, max_duration)
}

/// Win rate and profit factor over trades that realized P&L.
fn trade_statistics(trades: &[TradeRecord]) -> (f64, f64) {
    let realized: Vec<f64> = trades.iter().filter_map(|t| t.realized_pnl).collect();
    if realized.is_empty() {
        return (0.0, 0.0);
    }

    let wins = realized.iter().filter(|p| **p > 0.0).count();
    let gross_profit: f64 = realized.iter().filter(|p| **p > 0.0).sum();
    let gross_loss: f64 = realized.iter().filter(|p| **p < 0.0).map(|p| p.abs()).sum();

    let win_rate = wins as f64 / realized.len() as f64;
    let profit_factor = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        SHARPE_CAP
    } else {
        0.0
    };
    (win_rate, profit_factor)
}

/// Month-end equity percent change, keyed `YYYY-MM`. Empty with fewer than two
/// month-ends.
pub fn monthly_returns(equity_curve: &[EquityPoint]) -> BTreeMap<String, f64> {
    let mut month_ends: Vec<((i32, u32), f64)> = Vec::new();
    for point in equity_curve {
        let key = (point.date.year(), point.date.month());
        match month_ends.last_mut() {
            Some((last_key, value)) if *last_key == key => *value = point.equity,
            _ => month_ends.push((key, point.equity)),
        }
    }

    month_ends
        .windows(2)
        .map(|w| {
            let ((year, month), value) = w[1];
            let prev = w[0].1;
            let change = if prev != 0.0 { value / prev - 1.0 } else { 0.0 };
            (format!("{year:04}-{month:02}"), change)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::TradeKind;
    use chrono::NaiveDate;

    fn make_equity_curve(values: &[f64]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| EquityPoint {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64),
                equity: v,
            })
            .collect()
    }

    fn month_end_curve(values: &[f64]) -> Vec<EquityPoint> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| EquityPoint {
                date: crate::domain::schedule::last_business_day_of_month(
                    start.checked_add_months(chrono::Months::new(i as u32)).unwrap(),
                )
                .unwrap(),
                equity: v,
            })
            .collect()
    }

    fn make_trade(pnl: Option<f64>) -> TradeRecord {
        TradeRecord {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            instrument_id: "X".into(),
            kind: if pnl.is_some() { TradeKind::Close } else { TradeKind::Open },
            notional: 100.0,
            price: 1.0,
            cost: 0.0,
            realized_pnl: pnl,
        }
    }

    #[test]
    fn empty_curve() {
        let m = PerformanceMetrics::compute(&[], &[], 100_000.0, RebalanceFrequency::Daily);
        assert_eq!(m, PerformanceMetrics::default());
    }

    #[test]
    fn total_return_positive_and_negative() {
        let up = PerformanceMetrics::compute(
            &make_equity_curve(&[100_000.0, 110_000.0]),
            &[],
            100_000.0,
            RebalanceFrequency::Daily,
        );
        assert!((up.total_return - 0.10).abs() < 1e-9);

        let down = PerformanceMetrics::compute(
            &make_equity_curve(&[100_000.0, 90_000.0]),
            &[],
            100_000.0,
            RebalanceFrequency::Daily,
        );
        assert!((down.total_return + 0.10).abs() < 1e-9);
    }

    #[test]
    fn annualized_return_uses_elapsed_calendar_time() {
        let curve = vec![
            EquityPoint {
                date: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
                equity: 100.0,
            },
            EquityPoint {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                equity: 121.0,
            },
        ];
        let years = 730.0 / 365.25;
        let expected = 1.21_f64.powf(1.0 / years) - 1.0;
        let m = PerformanceMetrics::compute(&curve, &[], 100.0, RebalanceFrequency::Daily);
        assert!((m.annualized_return - expected).abs() < 1e-12);
    }

    #[test]
    fn annualized_return_measures_from_first_curve_point() {
        let curve = vec![
            EquityPoint {
                date: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
                equity: 99.0,
            },
            EquityPoint {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                equity: 99.0 * 1.21,
            },
        ];
        let years = 730.0 / 365.25;
        let expected = 1.21_f64.powf(1.0 / years) - 1.0;
        let m = PerformanceMetrics::compute(&curve, &[], 100.0, RebalanceFrequency::Daily);
        assert!((m.annualized_return - expected).abs() < 1e-12);
        assert!((m.total_return - (0.99 * 1.21 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn riskless_gain_caps_sharpe_and_sortino() {
        let values: Vec<f64> = (0..13).map(|k| 1_000_000.0 * 1.01_f64.powi(k)).collect();
        let m = PerformanceMetrics::compute(&month_end_curve(&values), &[], 1_000_000.0, RebalanceFrequency::Monthly);
        assert!(m.annualized_volatility < ZERO_VOLATILITY);
        assert_eq!(m.sharpe_ratio, SHARPE_CAP);
        assert_eq!(m.sortino_ratio, SHARPE_CAP);
        assert_eq!(m.max_drawdown, 0.0);
        assert_eq!(m.calmar_ratio, 0.0);
    }

    #[test]
    fn flat_curve_is_all_zero() {
        let m = PerformanceMetrics::compute(
            &make_equity_curve(&[500.0; 20]),
            &[],
            500.0,
            RebalanceFrequency::Daily,
        );
        assert_eq!(m.sharpe_ratio, 0.0);
        assert_eq!(m.sortino_ratio, 0.0);
        assert_eq!(m.max_drawdown, 0.0);
        assert_eq!(m.total_return, 0.0);
        assert_eq!(m.annualized_volatility, 0.0);
    }

    #[test]
    fn volatility_is_sample_std_annualized() {
        let curve = make_equity_curve(&[100.0, 110.0, 99.0]);
        let r: [f64; 2] = [0.1, 99.0 / 110.0 - 1.0];
        let mean = (r[0] + r[1]) / 2.0;
        let var = ((r[0] - mean).powi(2) + (r[1] - mean).powi(2)) / 1.0;
        let m = PerformanceMetrics::compute(&curve, &[], 100.0, RebalanceFrequency::Daily);
        assert!((m.annualized_volatility - var.sqrt() * 252.0_f64.sqrt()).abs() < 1e-12);
        assert!(m.sharpe_ratio.is_finite());
    }

    #[test]
    fn sortino_uses_negative_periods_only() {
        let curve = make_equity_curve(&[100.0, 102.0, 100.98, 103.0]);
        let returns = period_returns(&curve);
        let neg = returns[1];
        let dd = downside_deviation(&returns).unwrap();
        assert!((dd - neg.abs()).abs() < 1e-15);
        let m = PerformanceMetrics::compute(&curve, &[], 100.0, RebalanceFrequency::Daily);
        let expected = m.annualized_return / (dd * 252.0_f64.sqrt());
        assert!((m.sortino_ratio - expected).abs() < 1e-9);
    }

    #[test]
    fn max_drawdown_is_negative_fraction() {
        let curve = make_equity_curve(&[100.0, 110.0, 90.0, 95.0, 80.0, 100.0]);
        let (dd, _) = compute_drawdown(&curve);
        assert!((dd - (80.0 / 110.0 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn max_drawdown_duration_counts_points_under_peak() {
        let curve = make_equity_curve(&[100.0, 110.0, 100.0, 90.0, 85.0, 95.0, 111.0, 105.0]);
        let (_, duration) = compute_drawdown(&curve);
        assert_eq!(duration, 4);
    }

    #[test]
    fn calmar_divides_by_drawdown_magnitude() {
        let curve = make_equity_curve(&[100.0, 120.0, 90.0, 130.0]);
        let m = PerformanceMetrics::compute(&curve, &[], 100.0, RebalanceFrequency::Daily);
        assert!((m.max_drawdown + 0.25).abs() < 1e-12);
        assert!((m.calmar_ratio - m.annualized_return / 0.25).abs() < 1e-9);
    }

    #[test]
    fn win_rate_and_profit_factor() {
        let trades = vec![
            make_trade(None),
            make_trade(Some(100.0)),
            make_trade(Some(-50.0)),
            make_trade(Some(200.0)),
            make_trade(Some(0.0)),
        ];
        let (win_rate, pf) = trade_statistics(&trades);
        assert!((win_rate - 0.5).abs() < f64::EPSILON);
        assert!((pf - 6.0).abs() < 1e-12);
    }

    #[test]
    fn trade_statistics_guard_empty_and_lossless() {
        assert_eq!(trade_statistics(&[]), (0.0, 0.0));
        assert_eq!(trade_statistics(&[make_trade(None)]), (0.0, 0.0));
        let (wr, pf) = trade_statistics(&[make_trade(Some(10.0))]);
        assert_eq!(wr, 1.0);
        assert_eq!(pf, SHARPE_CAP);
    }

    #[test]
    fn monthly_returns_resample_to_month_end() {
        let curve = vec![
            EquityPoint { date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(), equity: 90.0 },
            EquityPoint { date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(), equity: 100.0 },
            EquityPoint { date: NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(), equity: 110.0 },
            EquityPoint { date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(), equity: 120.0 },
            EquityPoint { date: NaiveDate::from_ymd_opt(2024, 3, 28).unwrap(), equity: 99.0 },
        ];
        let monthly = monthly_returns(&curve);
        assert_eq!(monthly.len(), 2);
        assert!((monthly["2024-02"] - 0.1).abs() < 1e-12);
        assert!((monthly["2024-03"] - (99.0 / 110.0 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn monthly_returns_need_two_month_ends() {
        assert!(monthly_returns(&make_equity_curve(&[1.0, 2.0, 3.0])).is_empty());
        assert!(monthly_returns(&[]).is_empty());
    }

    #[test]
    fn metrics_are_reproducible() {
        let curve = make_equity_curve(&[100.0, 101.3, 99.7, 104.2, 103.9]);
        let trades = vec![make_trade(Some(3.0)), make_trade(Some(-1.0))];
        let a = PerformanceMetrics::compute(&curve, &trades, 100.0, RebalanceFrequency::Daily);
        let b = PerformanceMetrics::compute(&curve, &trades, 100.0, RebalanceFrequency::Daily);
        assert_eq!(a, b);
    }
}
