use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{AppError, Context, Result};

use super::{
    validator, ApiConfig, Config, FieldGroup, FieldSpec, MissingSymbolPolicy, OutputConfig,
    PackageMetadata, SourceConfig,
};

/// Load a pipeline configuration from JSON, filling unset sections from the builtin defaults.
pub fn load_config(path: &Path) -> Result<Config> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read config JSON at {}", path.display()))?;

    let raw: RawConfig = serde_json::from_str(&json)
        .with_context(|| format!("failed to parse config JSON at {}", path.display()))?;

    let config = raw.into_config(Config::builtin())?;
    validator::validate_config(&config)?;

    Ok(config)
}

/// Resolve the bundled configuration file for `name` under `root/assets/configs`.
pub fn bundled_config_path(root: &Path, name: &str) -> PathBuf {
    root.join("assets")
        .join("configs")
        .join(format!("{name}.json"))
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    source: Option<RawSource>,
    #[serde(default)]
    fields: Option<Vec<RawFieldGroup>>,
    #[serde(default)]
    api: RawApi,
    #[serde(default)]
    output: RawOutput,
    #[serde(default)]
    on_missing: Option<MissingSymbolPolicy>,
}

impl RawConfig {
    fn into_config(self, defaults: Config) -> Result<Config> {
        let source = match self.source {
            Some(source) => source.into_source(defaults.source),
            None => defaults.source,
        };

        let fields = match self.fields {
            Some(groups) => {
                if groups.is_empty() {
                    return Err(AppError::Config(
                        "fields must list at least one group".to_string(),
                    ));
                }
                FieldSpec::new(groups.into_iter().map(RawFieldGroup::into_group).collect())
            }
            None => defaults.fields,
        };

        Ok(Config {
            name: self.name.unwrap_or(defaults.name),
            source,
            fields,
            api: self.api.into_api(defaults.api),
            output: self.output.into_output(defaults.output),
            on_missing: self.on_missing.unwrap_or(defaults.on_missing),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawSource {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    table_id: Option<String>,
    #[serde(default)]
    expected_headers: Option<Vec<String>>,
    #[serde(default)]
    columns: Option<RawSourceColumns>,
}

#[derive(Debug, Deserialize)]
struct RawSourceColumns {
    symbol: usize,
    name: usize,
    sector: usize,
}

impl RawSource {
    fn into_source(self, defaults: SourceConfig) -> SourceConfig {
        let (symbol_column, name_column, sector_column) = match self.columns {
            Some(columns) => (columns.symbol, columns.name, columns.sector),
            None => (
                defaults.symbol_column,
                defaults.name_column,
                defaults.sector_column,
            ),
        };

        SourceConfig {
            url: self.url.unwrap_or(defaults.url),
            table_id: self.table_id.unwrap_or(defaults.table_id),
            expected_headers: self.expected_headers.unwrap_or(defaults.expected_headers),
            symbol_column,
            name_column,
            sector_column,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawFieldGroup {
    group: String,
    fields: Vec<(String, String)>,
}

impl RawFieldGroup {
    fn into_group(self) -> FieldGroup {
        FieldGroup {
            name: self.group,
            fields: self.fields,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawApi {
    base_url: Option<String>,
    url_template: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
    batch_size: Option<usize>,
    concurrency: Option<usize>,
    max_retries: Option<u32>,
    backoff_ms: Option<u64>,
    min_interval_ms: Option<u64>,
    timeout_secs: Option<u64>,
    cache_dir: Option<PathBuf>,
}

impl RawApi {
    fn into_api(self, defaults: ApiConfig) -> ApiConfig {
        let mut headers = defaults.headers;
        headers.extend(self.headers);

        ApiConfig {
            base_url: self.base_url.unwrap_or(defaults.base_url),
            url_template: self.url_template.unwrap_or(defaults.url_template),
            headers,
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            concurrency: self.concurrency.unwrap_or(defaults.concurrency),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            backoff_ms: self.backoff_ms.unwrap_or(defaults.backoff_ms),
            min_interval_ms: self.min_interval_ms.unwrap_or(defaults.min_interval_ms),
            timeout_secs: self.timeout_secs.unwrap_or(defaults.timeout_secs),
            cache_dir: self.cache_dir.or(defaults.cache_dir),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawOutput {
    filings_base_url: Option<String>,
    constituents_file: Option<String>,
    financials_file: Option<String>,
    package_file: Option<String>,
    package: Option<PackageMetadata>,
}

impl RawOutput {
    fn into_output(self, defaults: OutputConfig) -> OutputConfig {
        OutputConfig {
            filings_base_url: self.filings_base_url.unwrap_or(defaults.filings_base_url),
            constituents_file: self.constituents_file.unwrap_or(defaults.constituents_file),
            financials_file: self.financials_file.unwrap_or(defaults.financials_file),
            package_file: self.package_file.unwrap_or(defaults.package_file),
            package: self.package.unwrap_or(defaults.package),
        }
    }
}
