use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub mod loader;
pub mod validator;

pub use loader::load_config;
pub use validator::validate_config;

pub const SYMBOL_TITLE: &str = "Symbol";
pub const NAME_TITLE: &str = "Name";
pub const SECTOR_TITLE: &str = "Sector";
pub const FILINGS_TITLE: &str = "SEC Filings";

/// Leading columns shared by the constituents and financials files.
pub const CONSTITUENT_HEADER: [&str; 3] = [SYMBOL_TITLE, NAME_TITLE, SECTOR_TITLE];

/// One output column: where the value lives in a response entry and how it is titled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub group: String,
    pub field: String,
    pub title: String,
}

/// A named cluster of `(source field, display title)` pairs as the API groups them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldGroup {
    pub name: String,
    pub fields: Vec<(String, String)>,
}

impl FieldGroup {
    pub fn new<N: Into<String>>(name: N, fields: &[(&str, &str)]) -> Self {
        Self {
            name: name.into(),
            fields: fields
                .iter()
                .map(|(field, title)| ((*field).to_string(), (*title).to_string()))
                .collect(),
        }
    }
}

/// Immutable field-group configuration, flattened once into the output column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    groups: Vec<FieldGroup>,
    columns: Vec<Column>,
}

impl FieldSpec {
    pub fn new(groups: Vec<FieldGroup>) -> Self {
        let columns = groups
            .iter()
            .flat_map(|group| {
                group.fields.iter().map(move |(field, title)| Column {
                    group: group.name.clone(),
                    field: field.clone(),
                    title: title.clone(),
                })
            })
            .collect();

        Self { groups, columns }
    }

    pub fn groups(&self) -> &[FieldGroup] {
        &self.groups
    }

    /// Flattened `(group, field, title)` triples in output order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Distinct group identifiers in first-seen order.
    pub fn group_names(&self) -> Vec<&str> {
        distinct(self.columns.iter().map(|column| column.group.as_str()))
    }

    /// Distinct source field names in first-seen order.
    pub fn field_names(&self) -> Vec<&str> {
        distinct(self.columns.iter().map(|column| column.field.as_str()))
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.title.as_str())
    }

    /// Full output header: constituent columns, fetched titles, then the filings link.
    pub fn header(&self) -> Vec<String> {
        CONSTITUENT_HEADER
            .iter()
            .copied()
            .chain(self.titles())
            .chain(std::iter::once(FILINGS_TITLE))
            .map(str::to_string)
            .collect()
    }
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = Vec::new();
    for value in values {
        if !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen
}

/// Where the constituents table is scraped from and how its cells are laid out.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub url: String,
    pub table_id: String,
    pub expected_headers: Vec<String>,
    pub symbol_column: usize,
    pub name_column: usize,
    pub sector_column: usize,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub url_template: String,
    pub headers: HashMap<String, String>,
    pub batch_size: usize,
    pub concurrency: usize,
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub min_interval_ms: u64,
    pub timeout_secs: u64,
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub filings_base_url: String,
    pub constituents_file: String,
    pub financials_file: String,
    pub package_file: String,
    pub package: PackageMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    pub title: String,
    pub version: String,
    pub homepage: String,
}

/// What to do when a batch response has no entry for a requested symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingSymbolPolicy {
    #[default]
    Abort,
    Skip,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub name: String,
    pub source: SourceConfig,
    pub fields: FieldSpec,
    pub api: ApiConfig,
    pub output: OutputConfig,
    pub on_missing: MissingSymbolPolicy,
}

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const MAX_RETRIES: u32 = 10;
pub const DEFAULT_URL_TEMPLATE: &str = "{base}?types={types}&filter={fields}&symbols={symbols}";
pub const EDGAR_BASE_URL: &str = "http://www.sec.gov/cgi-bin/browse-edgar?action=getcompany&CIK=";

impl Config {
    pub fn builtin() -> Self {
        let fields = FieldSpec::new(vec![
            FieldGroup::new("quote", &[("close", "Price"), ("peRatio", "Price/Earnings")]),
            FieldGroup::new(
                "stats",
                &[
                    ("dividendYield", "Dividend Yield"),
                    ("latestEPS", "Earnings/Share"),
                    ("week52low", "52 Week Low"),
                    ("week52high", "52 Week High"),
                    ("marketcap", "Market Cap"),
                    ("EBITDA", "EBITDA"),
                    ("priceToSales", "Price/Sales"),
                    ("priceToBook", "Price/Book"),
                ],
            ),
        ]);

        let headers = HashMap::from([(
            "User-Agent".to_string(),
            concat!("index-financials/", env!("CARGO_PKG_VERSION")).to_string(),
        )]);

        Config {
            name: "sp500".to_string(),
            source: SourceConfig {
                url: "https://en.wikipedia.org/wiki/List_of_S%26P_500_companies".to_string(),
                table_id: "constituents".to_string(),
                expected_headers: vec!["Symbol".to_string(), "Security".to_string()],
                symbol_column: 0,
                name_column: 1,
                sector_column: 2,
            },
            fields,
            api: ApiConfig {
                base_url: "https://api.iextrading.com/1.0/stock/market/batch".to_string(),
                url_template: DEFAULT_URL_TEMPLATE.to_string(),
                headers,
                batch_size: DEFAULT_BATCH_SIZE,
                concurrency: 1,
                max_retries: 3,
                backoff_ms: 1_000,
                min_interval_ms: 0,
                timeout_secs: 30,
                cache_dir: None,
            },
            output: OutputConfig {
                filings_base_url: EDGAR_BASE_URL.to_string(),
                constituents_file: "constituents.csv".to_string(),
                financials_file: "constituents-financials.csv".to_string(),
                package_file: "datapackage.json".to_string(),
                package: PackageMetadata {
                    name: "s-and-p-500-companies-financials".to_string(),
                    title: "S&P 500 Companies with Financial Information".to_string(),
                    version: "0.2.0".to_string(),
                    homepage: "http://www.sec.gov".to_string(),
                },
            },
            on_missing: MissingSymbolPolicy::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattening_keeps_group_then_field_order() {
        let spec = FieldSpec::new(vec![
            FieldGroup::new("stats", &[("b", "B"), ("a", "A")]),
            FieldGroup::new("quote", &[("z", "Z")]),
        ]);

        let titles: Vec<&str> = spec.titles().collect();
        assert_eq!(titles, vec!["B", "A", "Z"]);
        assert_eq!(spec.group_names(), vec!["stats", "quote"]);
        assert_eq!(spec.columns()[2].group, "quote");

        let again = FieldSpec::new(spec.groups().to_vec());
        assert_eq!(again.columns(), spec.columns());
    }

    #[test]
    fn header_wraps_titles_with_fixed_columns() {
        let spec = FieldSpec::new(vec![FieldGroup::new("quote", &[("close", "Price")])]);
        assert_eq!(
            spec.header(),
            vec!["Symbol", "Name", "Sector", "Price", "SEC Filings"]
        );
    }

    #[test]
    fn builtin_titles_follow_their_source_fields() {
        let config = Config::builtin();
        let find = |field: &str| {
            config
                .fields
                .columns()
                .iter()
                .find(|column| column.field == field)
                .map(|column| column.title.clone())
        };

        assert_eq!(find("week52low").as_deref(), Some("52 Week Low"));
        assert_eq!(find("week52high").as_deref(), Some("52 Week High"));
        assert_eq!(find("marketcap").as_deref(), Some("Market Cap"));
        assert_eq!(config.fields.columns().len(), 10);
    }

    #[test]
    fn field_names_are_distinct() {
        let spec = FieldSpec::new(vec![
            FieldGroup::new("quote", &[("symbol", "Quote Symbol")]),
            FieldGroup::new("stats", &[("symbol", "Stats Symbol")]),
        ]);
        assert_eq!(spec.field_names(), vec!["symbol"]);
    }
}
