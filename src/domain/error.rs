//! Domain error types.

/// Top-level error type for vintage.
#[derive(Debug, thiserror::Error)]
pub enum VintageError {
    #[error("store error: {reason}")]
    Store { reason: String },

    #[error("store query error: {reason}")]
    StoreQuery { reason: String },

    #[error("invalid observation for {series_id}: {reason}")]
    InvalidObservation { series_id: String, reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("unknown signal producer: {name}")]
    UnknownProducer { name: String },

    #[error("signal producer {name} failed: {reason}")]
    Producer { name: String, reason: String },

    #[error("no price available for {instrument_id}")]
    MissingPrice { instrument_id: String },

    #[error(
        "ledger invariant violated on {date}: tracked equity {tracked:.6}, cash + positions {actual:.6}"
    )]
    LedgerInvariant {
        date: chrono::NaiveDate,
        tracked: f64,
        actual: f64,
    },

    #[error("equity point for {date} does not follow {last}")]
    EquityOrder {
        date: chrono::NaiveDate,
        last: chrono::NaiveDate,
    },

    #[error("report error: {reason}")]
    Report { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl VintageError {
    pub(crate) fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        VintageError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn config_missing(section: &str, key: &str) -> Self {
        VintageError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }
}

impl VintageError {
    /// Process exit code for this error family.
    pub fn exit_code(&self) -> u8 {
        match self {
            VintageError::Io(_) | VintageError::Report { .. } | VintageError::Json(_) => 1,
            VintageError::ConfigParse { .. }
            | VintageError::ConfigMissing { .. }
            | VintageError::ConfigInvalid { .. } => 2,
            VintageError::Store { .. } | VintageError::StoreQuery { .. } => 3,
            VintageError::UnknownProducer { .. } | VintageError::Producer { .. } => 4,
            VintageError::InvalidObservation { .. }
            | VintageError::MissingPrice { .. }
            | VintageError::Csv(_) => 5,
            VintageError::LedgerInvariant { .. } | VintageError::EquityOrder { .. } => 6,
        }
    }
}

impl From<&VintageError> for std::process::ExitCode {
    fn from(err: &VintageError) -> Self {
        std::process::ExitCode::from(err.exit_code())
    }
}
