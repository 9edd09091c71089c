use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::CONSTITUENT_HEADER;
use crate::error::{AppError, Context, Result};

pub mod scrape;

pub use scrape::{fetch_source_html, scrape_constituents};

/// A single index member as listed by the source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstituentRecord {
    #[serde(rename = "Symbol")]
    pub symbol: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Sector")]
    pub sector: String,
}

impl ConstituentRecord {
    pub fn new<S, N, C>(symbol: S, name: N, sector: C) -> Self
    where
        S: Into<String>,
        N: Into<String>,
        C: Into<String>,
    {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            sector: sector.into(),
        }
    }
}

/// Stable, case-insensitive ordering by company name.
pub fn sort_by_name(records: &mut [ConstituentRecord]) {
    records.sort_by_cached_key(|record| record.name.to_lowercase());
}

pub fn write_constituents<P: AsRef<Path>>(path: P, records: &[ConstituentRecord]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create constituents file {}", path.display()))?;

    for record in records {
        writer.serialize(record)?;
    }

    // An empty list still gets a header so readers see a well-formed file.
    if records.is_empty() {
        writer.write_record(CONSTITUENT_HEADER)?;
    }

    writer.flush()?;
    Ok(())
}

/// Read a `Symbol,Name,Sector` file, rejecting anything with a different header.
pub fn read_constituents<P: AsRef<Path>>(path: P) -> Result<Vec<ConstituentRecord>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open constituents file {}", path.display()))?;

    let headers = reader.headers()?.clone();
    if headers.iter().ne(CONSTITUENT_HEADER.iter().copied()) {
        return Err(AppError::table_format(format!(
            "{} has header `{}`, expected `{}`",
            path.display(),
            headers.iter().collect::<Vec<_>>().join(","),
            CONSTITUENT_HEADER.join(",")
        )));
    }

    let mut records = Vec::new();
    for result in reader.deserialize() {
        let record: ConstituentRecord = result?;
        records.push(record);
    }

    Ok(records)
}
