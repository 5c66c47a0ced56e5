//! Rebalance calendar.
//!
//! Business days are Monday to Friday; no exchange holiday calendar is applied.
//! The same `(start, end, frequency)` always yields the same dates.

use crate::domain::error::VintageError;
use chrono::{Datelike, Duration, Months, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebalanceFrequency {
    Daily,
    Weekly,
    Monthly,
}

impl RebalanceFrequency {
    /// Periods per year used to annualize statistics sampled at this frequency.
    pub fn periods_per_year(&self) -> f64 {
        match self {
            RebalanceFrequency::Daily => 252.0,
            RebalanceFrequency::Weekly => 52.0,
            RebalanceFrequency::Monthly => 12.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RebalanceFrequency::Daily => "daily",
            RebalanceFrequency::Weekly => "weekly",
            RebalanceFrequency::Monthly => "monthly",
        }
    }
}

impl fmt::Display for RebalanceFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RebalanceFrequency {
    type Err = VintageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(RebalanceFrequency::Daily),
            "weekly" => Ok(RebalanceFrequency::Weekly),
            "monthly" => Ok(RebalanceFrequency::Monthly),
            other => Err(VintageError::config_invalid(
                "backtest",
                "rebalance_frequency",
                format!("'{other}' is not one of daily, weekly, monthly"),
            )),
        }
    }
}

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Last Monday-to-Friday date of the month containing `date`.
pub fn last_business_day_of_month(date: NaiveDate) -> Option<NaiveDate> {
    let first = date.with_day(1)?;
    let mut day = first.checked_add_months(Months::new(1))? - Duration::days(1);
    while !is_business_day(day) {
        day -= Duration::days(1);
    }
    Some(day)
}

/// Ordered rebalance dates within `[start, end]`.
///
/// Daily: every business day. Weekly: every Friday. Monthly: the last business day
/// of each month.
pub fn rebalance_dates(
    start: NaiveDate,
    end: NaiveDate,
    frequency: RebalanceFrequency,
) -> Vec<NaiveDate> {
    if start > end {
        return Vec::new();
    }
    match frequency {
        RebalanceFrequency::Daily => start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| is_business_day(*d))
            .collect(),
        RebalanceFrequency::Weekly => start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| d.weekday() == Weekday::Fri)
            .collect(),
        RebalanceFrequency::Monthly => {
            let mut dates = Vec::new();
            let mut month = start.with_day(1);
            while let Some(first) = month {
                if first > end {
                    break;
                }
                if let Some(day) = last_business_day_of_month(first) {
                    if day >= start && day <= end {
                        dates.push(day);
                    }
                }
                month = first.checked_add_months(Months::new(1));
            }
            dates
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn monthly_uses_last_business_day() {
        let dates = rebalance_dates(date(2024, 1, 1), date(2024, 6, 30), RebalanceFrequency::Monthly);
        assert_eq!(
            dates,
            vec![
                date(2024, 1, 31),
                date(2024, 2, 29),
                date(2024, 3, 29),
                date(2024, 4, 30),
                date(2024, 5, 31),
                date(2024, 6, 28),
            ]
        );
    }

    #[test]
    fn monthly_thirteen_month_ends() {
        let dates = rebalance_dates(date(2023, 12, 1), date(2024, 12, 31), RebalanceFrequency::Monthly);
        assert_eq!(dates.len(), 13);
        assert_eq!(dates[0], date(2023, 12, 29));
        assert_eq!(dates[12], date(2024, 12, 31));
    }

    #[test]
    fn monthly_excludes_month_end_after_end_date() {
        let dates = rebalance_dates(date(2024, 1, 1), date(2024, 3, 15), RebalanceFrequency::Monthly);
        assert_eq!(dates, vec![date(2024, 1, 31), date(2024, 2, 29)]);
    }

    #[test]
    fn weekly_uses_fridays() {
        let dates = rebalance_dates(date(2024, 1, 1), date(2024, 1, 31), RebalanceFrequency::Weekly);
        assert_eq!(
            dates,
            vec![date(2024, 1, 5), date(2024, 1, 12), date(2024, 1, 19), date(2024, 1, 26)]
        );
    }

    #[test]
    fn daily_skips_weekends() {
        let dates = rebalance_dates(date(2024, 1, 5), date(2024, 1, 9), RebalanceFrequency::Daily);
        assert_eq!(dates, vec![date(2024, 1, 5), date(2024, 1, 8), date(2024, 1, 9)]);
    }

    #[test]
    fn inverted_range_is_empty() {
        assert!(rebalance_dates(date(2024, 2, 1), date(2024, 1, 1), RebalanceFrequency::Daily).is_empty());
    }

    #[test]
    fn frequency_parses_case_insensitively() {
        assert_eq!("Monthly".parse::<RebalanceFrequency>().unwrap(), RebalanceFrequency::Monthly);
        assert!("quarterly".parse::<RebalanceFrequency>().is_err());
        assert_eq!(RebalanceFrequency::Weekly.to_string(), "weekly");
        assert!((RebalanceFrequency::Daily.periods_per_year() - 252.0).abs() < f64::EPSILON);
    }
}
