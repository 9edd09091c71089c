use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use reqwest::Client;
use tokio::time::Duration;

use crate::config::Config;
use crate::constituents::{
    fetch_source_html, read_constituents, scrape_constituents, write_constituents,
    ConstituentRecord,
};
use crate::enrich::{enrich, EnrichOptions, EnrichOutcome};
use crate::error::{AppError, Context, Result};
use crate::fetch::{BatchSource, HttpBatchSource};
use crate::records::{
    read_table, validate_package, write_financials, DataPackage, ValidationReport,
};
use crate::report::{omitted_note, render_table};

/// Runs the pipeline steps against one data directory.
pub struct AppController {
    config: Config,
    data_dir: PathBuf,
}

impl AppController {
    pub fn new<P: Into<PathBuf>>(config: Config, data_dir: P) -> Self {
        Self {
            config,
            data_dir: data_dir.into(),
        }
    }

    pub fn constituents_path(&self) -> PathBuf {
        self.data_dir.join(&self.config.output.constituents_file)
    }

    pub fn financials_path(&self) -> PathBuf {
        self.data_dir.join(&self.config.output.financials_file)
    }

    pub fn package_path(&self) -> PathBuf {
        self.data_dir.join(&self.config.output.package_file)
    }

    fn prepare(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir).with_context(|| {
            format!("Failed to create data directory {}", self.data_dir.display())
        })?;
        Ok(())
    }

    /// Scrape the constituents table from `html_file`, or from the configured URL.
    pub async fn scrape(&self, html_file: Option<&Path>) -> Result<Vec<ConstituentRecord>> {
        self.prepare()?;

        let html = match html_file {
            Some(path) => fs::read_to_string(path)
                .with_context(|| format!("Failed to read HTML source {}", path.display()))?,
            None => {
                info!("Downloading constituents from {}", self.config.source.url);
                let client = Client::builder()
                    .user_agent(concat!("index-financials/", env!("CARGO_PKG_VERSION")))
                    .timeout(Duration::from_secs(self.config.api.timeout_secs))
                    .build()
                    .context("Failed to build HTTP client")?;
                fetch_source_html(&client, &self.config.source.url).await?
            }
        };

        let records = scrape_constituents(&html, &self.config.source)?;
        let path = self.constituents_path();
        write_constituents(&path, &records)?;
        info!("Wrote {} constituents to {}", records.len(), path.display());

        Ok(records)
    }

    /// Enrich the constituents file through the configured HTTP endpoint.
    pub async fn financials(&self) -> Result<EnrichOutcome> {
        let source = HttpBatchSource::new(self.config.api.clone())?;
        self.financials_with(&source).await
    }

    /// Enrich the constituents file through `source` and write the outputs.
    pub async fn financials_with<S: BatchSource>(&self, source: &S) -> Result<EnrichOutcome> {
        self.prepare()?;

        let records = read_constituents(self.constituents_path())?;
        if records.is_empty() {
            return Err(AppError::message(format!(
                "{} lists no constituents",
                self.constituents_path().display()
            )));
        }

        let options = EnrichOptions::from_config(&self.config);
        let outcome = enrich(source, &records, &self.config.fields, &options).await?;

        let path = self.financials_path();
        write_financials(&path, &self.config.fields, &outcome.records)?;
        info!(
            "Wrote {} enriched rows to {}",
            outcome.records.len(),
            path.display()
        );

        DataPackage::describe(&self.config).write(self.package_path())?;
        Ok(outcome)
    }

    pub fn validate(&self) -> Result<ValidationReport> {
        validate_package(self.package_path())
    }

    /// Render the first `limit` rows of a CSV file as a text table.
    pub fn show(&self, path: &Path, limit: usize) -> Result<String> {
        let table = read_table(path)?;
        let mut text = render_table(&table.headers, &table.rows, Some(limit));
        if let Some(note) = omitted_note(table.rows.len(), limit.min(table.rows.len())) {
            text.push_str(&note);
            text.push('\n');
        }
        Ok(text)
    }
}
