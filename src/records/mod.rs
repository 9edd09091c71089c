use std::path::Path;

use crate::config::FieldSpec;
use crate::enrich::EnrichedRecord;
use crate::error::{Context, Result};

pub mod package;

pub use package::{validate_package, DataPackage, ValidationReport};

/// Write the enriched rows under the header derived from `spec`.
pub fn write_financials<P: AsRef<Path>>(
    path: P,
    spec: &FieldSpec,
    records: &[EnrichedRecord],
) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create financials file {}", path.display()))?;

    writer.write_record(spec.header())?;
    for record in records {
        writer.write_record(record.to_row())?;
    }

    writer.flush()?;
    Ok(())
}

/// Raw header and rows of a CSV file, without any typing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Read any CSV file as strings. Rows of uneven width are kept as they are.
pub fn read_table<P: AsRef<Path>>(path: P) -> Result<Table> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))?;

    let headers = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.with_context(|| format!("Failed to read {}", path.display()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(Table { headers, rows })
}
