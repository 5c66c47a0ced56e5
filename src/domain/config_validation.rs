//! Configuration validation.
//!
//! Validates all config fields before a run. Values that are present but do not
//! parse are errors here, even though `ConfigPort` getters fall back to defaults.

use crate::domain::cost::BpsCostModel;
use crate::domain::error::VintageError;
use crate::domain::schedule::RebalanceFrequency;
use crate::domain::signal::{EmptySignal, Signal};
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub const STRATEGY_TYPES: [&str; 3] = ["constant", "momentum", "curve_slope"];

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), VintageError> {
    validate_dates(config)?;
    validate_initial_capital(config)?;
    validate_frequency(config)?;
    validate_non_negative(config, "backtest", "transaction_cost_bps", 5.0)?;
    validate_non_negative(config, "backtest", "slippage_bps", 2.0)?;
    validate_non_negative(config, "backtest", "max_leverage", 1.0)?;
    validate_cost_overrides(config)?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), VintageError> {
    let kind = strategy_type(config)?;
    match kind.as_str() {
        "constant" => {
            parse_weights(&config.get_string("strategy", "weights").unwrap_or_default())?;
            empty_policy(config)?;
        }
        "momentum" => {
            let instruments = parse_list(&required_string(config, "strategy", "instruments")?);
            if instruments.is_empty() {
                return Err(VintageError::config_invalid(
                    "strategy",
                    "instruments",
                    "at least one instrument is required",
                ));
            }
            let months = parse_int(config, "strategy", "lookback_months", 12)?;
            if months < 1 {
                return Err(VintageError::config_invalid(
                    "strategy",
                    "lookback_months",
                    "lookback_months must be at least 1",
                ));
            }
            validate_non_negative(config, "strategy", "gross_weight", 1.0)?;
        }
        "curve_slope" => {
            required_string(config, "strategy", "curve")?;
            required_string(config, "strategy", "steepener")?;
            parse_double(config, "strategy", "threshold", 0.0)?;
            validate_non_negative(config, "strategy", "weight", 1.0)?;
            if parse_int(config, "strategy", "lookback_days", 10)? < 0 {
                return Err(VintageError::config_invalid(
                    "strategy",
                    "lookback_days",
                    "lookback_days must be non-negative",
                ));
            }
        }
        other => {
            return Err(VintageError::UnknownProducer {
                name: other.to_string(),
            });
        }
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), VintageError> {
    let start_date = parse_date(config, "start_date")?;
    let end_date = parse_date(config, "end_date")?;

    if start_date >= end_date {
        return Err(VintageError::config_invalid(
            "backtest",
            "start_date",
            "start_date must be before end_date",
        ));
    }
    Ok(())
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), VintageError> {
    if config.get_string("backtest", "initial_capital").is_none() {
        return Err(VintageError::config_missing("backtest", "initial_capital"));
    }
    let value = parse_double(config, "backtest", "initial_capital", 0.0)?;
    if value <= 0.0 {
        return Err(VintageError::config_invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    Ok(())
}

fn validate_frequency(config: &dyn ConfigPort) -> Result<(), VintageError> {
    rebalance_frequency(config).map(|_| ())
}

fn validate_non_negative(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<(), VintageError> {
    let value = parse_double(config, section, key, default)?;
    if value < 0.0 {
        return Err(VintageError::config_invalid(
            section,
            key,
            format!("{key} must be non-negative"),
        ));
    }
    Ok(())
}

fn validate_cost_overrides(config: &dyn ConfigPort) -> Result<(), VintageError> {
    for instrument in config.keys("costs") {
        let value = config.get_string("costs", &instrument).unwrap_or_default();
        parse_cost_override(&instrument, &value)?;
    }
    Ok(())
}

pub fn parse_date(config: &dyn ConfigPort, field: &str) -> Result<NaiveDate, VintageError> {
    let value = required_string(config, "backtest", field)?;
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        VintageError::config_invalid(
            "backtest",
            field,
            format!("invalid {field} format, expected YYYY-MM-DD"),
        )
    })
}

pub fn required_string(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<String, VintageError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(VintageError::config_missing(section, key)),
    }
}

/// A float that is allowed to be absent (then `default`) but not malformed.
pub fn parse_double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, VintageError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(VintageError::config_invalid(
                section,
                key,
                format!("'{raw}' is not a number"),
            )),
        },
    }
}

pub fn parse_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<i64, VintageError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<i64>().map_err(|_| {
            VintageError::config_invalid(section, key, format!("'{raw}' is not an integer"))
        }),
    }
}

pub fn rebalance_frequency(config: &dyn ConfigPort) -> Result<RebalanceFrequency, VintageError> {
    match config.get_string("backtest", "rebalance_frequency") {
        None => Ok(RebalanceFrequency::Monthly),
        Some(raw) => raw.parse(),
    }
}

pub fn strategy_type(config: &dyn ConfigPort) -> Result<String, VintageError> {
    let kind = required_string(config, "strategy", "type")?.to_ascii_lowercase();
    if !STRATEGY_TYPES.contains(&kind.as_str()) {
        return Err(VintageError::UnknownProducer { name: kind });
    }
    Ok(kind)
}

pub fn empty_policy(config: &dyn ConfigPort) -> Result<EmptySignal, VintageError> {
    match config
        .get_string("strategy", "on_empty")
        .map(|s| s.trim().to_ascii_lowercase())
        .as_deref()
    {
        None | Some("hold") => Ok(EmptySignal::Hold),
        Some("liquidate") => Ok(EmptySignal::Liquidate),
        Some(other) => Err(VintageError::config_invalid(
            "strategy",
            "on_empty",
            format!("'{other}' is not one of hold, liquidate"),
        )),
    }
}

/// Comma-separated list with blanks dropped.
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// `A:0.6, B:-0.4` into a signal. An empty string is an empty signal.
pub fn parse_weights(value: &str) -> Result<Signal, VintageError> {
    let mut signal = Signal::new();
    for entry in parse_list(value) {
        let invalid = || {
            VintageError::config_invalid(
                "strategy",
                "weights",
                format!("'{entry}' is not instrument:weight"),
            )
        };
        let (instrument, weight) = entry.split_once(':').ok_or_else(invalid)?;
        let weight: f64 = weight.trim().parse().map_err(|_| invalid())?;
        if instrument.trim().is_empty() || !weight.is_finite() {
            return Err(invalid());
        }
        signal.set(instrument.trim(), weight);
    }
    Ok(signal)
}

/// `<cost_bps>` or `<cost_bps>,<slippage_bps>`; slippage defaults to zero.
pub fn parse_cost_override(instrument: &str, value: &str) -> Result<BpsCostModel, VintageError> {
    let invalid = |reason: &str| VintageError::config_invalid("costs", instrument, reason);
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let parse = |s: &str| -> Result<f64, VintageError> {
        match s.parse::<f64>() {
            Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
            _ => Err(invalid("expected non-negative bps as <cost>[,<slippage>]")),
        }
    };
    match parts.as_slice() {
        [cost] => Ok(BpsCostModel::new(parse(cost)?, 0.0)),
        [cost, slippage] => Ok(BpsCostModel::new(parse(cost)?, parse(slippage)?)),
        _ => Err(invalid("expected <cost>[,<slippage>]")),
    }
}
