//! JSON persistence of the result record.

use crate::domain::error::VintageError;
use crate::domain::result::BacktestResult;
use crate::ports::report_port::ReportPort;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonReportAdapter;

impl JsonReportAdapter {
    pub fn load(&self, path: &Path) -> Result<BacktestResult, VintageError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn render(&self, result: &BacktestResult) -> Result<String, VintageError> {
        Ok(serde_json::to_string_pretty(result)?)
    }
}

impl ReportPort for JsonReportAdapter {
    fn write(&self, result: &BacktestResult, output_path: &Path) -> Result<(), VintageError> {
        let file = File::create(output_path).map_err(|e| VintageError::Report {
            reason: format!("failed to create {}: {}", output_path.display(), e),
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, result)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}
