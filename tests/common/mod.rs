#![allow(dead_code)]

use chrono::NaiveDate;
use std::io::Write;
use vintage::adapters::memory_store::InMemoryStore;
use vintage::domain::observation::Observation;
use vintage::domain::schedule::{rebalance_dates, RebalanceFrequency};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// A price published at midnight of the day it describes.
pub fn price(instrument: &str, on: NaiveDate, value: f64) -> Observation {
    Observation::first_release(instrument, on, value, on)
}

pub fn month_ends(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    rebalance_dates(start, end, RebalanceFrequency::Monthly)
}

/// One price per date, compounding by `growth` from `start_price`.
pub fn compounding_prices(
    instrument: &str,
    dates: &[NaiveDate],
    start_price: f64,
    growth: f64,
) -> Vec<Observation> {
    dates
        .iter()
        .enumerate()
        .map(|(i, &d)| price(instrument, d, start_price * (1.0 + growth).powi(i as i32)))
        .collect()
}

/// One price per date from an explicit path.
pub fn price_path(instrument: &str, dates: &[NaiveDate], values: &[f64]) -> Vec<Observation> {
    dates
        .iter()
        .zip(values)
        .map(|(&d, &v)| price(instrument, d, v))
        .collect()
}

pub fn store_with(observations: Vec<Observation>) -> InMemoryStore {
    InMemoryStore::from_observations(observations).unwrap()
}

pub fn write_temp_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// Backtest and strategy sections over a SQLite file at `db_path`.
pub fn constant_strategy_ini(db_path: &str, weights: &str) -> String {
    format!(
        "[store]\n\
         path = {db_path}\n\
         \n\
         [backtest]\n\
         start_date = 2023-12-01\n\
         end_date = 2024-12-31\n\
         initial_capital = 1000000\n\
         rebalance_frequency = monthly\n\
         transaction_cost_bps = 0\n\
         slippage_bps = 0\n\
         \n\
         [strategy]\n\
         name = Static\n\
         type = constant\n\
         weights = {weights}\n"
    )
}
