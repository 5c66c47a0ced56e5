//! Report and persistence port.

use crate::domain::error::VintageError;
use crate::domain::result::BacktestResult;
use std::path::Path;

/// Port for handing a finished result to a reporting or persistence collaborator.
pub trait ReportPort {
    fn write(&self, result: &BacktestResult, output_path: &Path) -> Result<(), VintageError>;
}
