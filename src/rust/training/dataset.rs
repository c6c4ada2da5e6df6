use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};

use super::TrainingError;
use crate::record::CaseRecord;

/// Column holding the case summary.
const SUMMARY_COLUMN: &str = "texto_ementa";

/// Reads historical case records from a headed UTF-8 CSV file.
///
/// Columns are matched by name; columns the record does not know are ignored
/// and empty cells read as missing values.
#[derive(Debug, Clone)]
pub struct DatasetReader {
    path: PathBuf,
}

impl DatasetReader {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_records(&self) -> Result<Vec<CaseRecord>, TrainingError> {
        let file = File::open(&self.path)
            .map_err(|e| TrainingError::Dataset(format!("cannot open {:?}: {}", self.path, e)))?;
        let records = Self::from_reader(file)?;
        info!("Read {} records from {:?}", records.len(), self.path);
        Ok(records)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Vec<CaseRecord>, TrainingError> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let mut records = Vec::new();
        for (row, result) in rdr.deserialize::<CaseRecord>().enumerate() {
            match result {
                Ok(record) => records.push(record),
                Err(e) => {
                    return Err(TrainingError::Dataset(format!("row {}: {}", row + 1, e)));
                }
            }
        }
        Ok(records)
    }
}

/// Copies a CSV, keeping every column, dropping rows whose summary fails `keep`.
///
/// Returns `(kept, dropped)` row counts. Rows without a summary are kept.
pub fn write_filtered<R, W, F>(input: R, output: W, mut keep: F) -> Result<(usize, usize), TrainingError>
where
    R: Read,
    W: Write,
    F: FnMut(&str) -> bool,
{
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(input);
    let mut wtr = csv::Writer::from_writer(output);

    let headers = rdr.headers()?.clone();
    let summary_idx = headers.iter().position(|h| h == SUMMARY_COLUMN);
    if summary_idx.is_none() {
        warn!("No '{}' column found; every row will be kept", SUMMARY_COLUMN);
    }
    wtr.write_record(&headers)?;

    let (mut kept, mut dropped) = (0, 0);
    for result in rdr.records() {
        let row = result?;
        let summary = summary_idx.and_then(|idx| row.get(idx)).unwrap_or_default();
        if summary.trim().is_empty() || keep(summary) {
            wtr.write_record(&row)?;
            kept += 1;
        } else {
            dropped += 1;
        }
    }
    wtr.flush()?;
    Ok((kept, dropped))
}
