use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{Config, CONSTITUENT_HEADER, FILINGS_TITLE};
use crate::error::{Context, Result};
use crate::utils::current_rfc3339;

use super::read_table;

/// Frictionless-style descriptor for the files a run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPackage {
    pub name: String,
    pub title: String,
    pub version: String,
    pub homepage: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub licenses: Vec<License>,
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct License {
    pub id: String,
    pub name: String,
    pub version: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub path: String,
    #[serde(default = "default_format")]
    pub format: String,
    pub schema: Schema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<SchemaField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
}

fn default_format() -> String {
    "csv".to_string()
}

impl SchemaField {
    fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
        }
    }
}

impl DataPackage {
    /// Describe the constituents and financials files for `config`.
    pub fn describe(config: &Config) -> Self {
        let constituent_fields: Vec<SchemaField> = CONSTITUENT_HEADER
            .iter()
            .map(|name| SchemaField::new(name, FieldType::String))
            .collect();

        let mut financial_fields = constituent_fields.clone();
        financial_fields.extend(
            config
                .fields
                .titles()
                .map(|title| SchemaField::new(title, FieldType::Number)),
        );
        financial_fields.push(SchemaField::new(FILINGS_TITLE, FieldType::String));

        let package = &config.output.package;
        DataPackage {
            name: package.name.clone(),
            title: package.title.clone(),
            version: package.version.clone(),
            homepage: package.homepage.clone(),
            created: Some(current_rfc3339()),
            licenses: vec![License {
                id: "odc-pddl".to_string(),
                name: "Open Data Commons Public Domain Dedication and License".to_string(),
                version: "1.0".to_string(),
                url: "http://opendatacommons.org/licenses/pddl/1.0/".to_string(),
            }],
            resources: vec![
                Resource {
                    name: "constituents".to_string(),
                    path: config.output.constituents_file.clone(),
                    format: default_format(),
                    schema: Schema {
                        fields: constituent_fields,
                    },
                },
                Resource {
                    name: "constituents-financials".to_string(),
                    path: config.output.financials_file.clone(),
                    format: default_format(),
                    schema: Schema {
                        fields: financial_fields,
                    },
                },
            ],
        }
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json + "\n")
            .with_context(|| format!("Failed to write data package {}", path.display()))?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read data package {}", path.display()))?;
        let package = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse data package {}", path.display()))?;
        Ok(package)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub resources_checked: usize,
    pub rows_checked: usize,
    pub issues: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "checked {} resources, {} rows: {}",
            self.resources_checked,
            self.rows_checked,
            if self.is_valid() { "valid" } else { "INVALID" }
        )?;
        for issue in &self.issues {
            writeln!(f, "  - {issue}")?;
        }
        Ok(())
    }
}

/// Check every resource of the package against its schema. Paths resolve next to the descriptor.
pub fn validate_package<P: AsRef<Path>>(package_path: P) -> Result<ValidationReport> {
    let package_path = package_path.as_ref();
    let package = DataPackage::load(package_path)?;
    let root = package_path.parent().unwrap_or_else(|| Path::new("."));

    let mut report = ValidationReport::default();
    for resource in &package.resources {
        let path = root.join(&resource.path);
        if !path.exists() {
            report
                .issues
                .push(format!("{}: file {} not found", resource.name, path.display()));
            continue;
        }

        debug!("Validating {} against its schema", path.display());
        let table = read_table(&path)?;
        validate_resource(resource, &table, &mut report);
        report.resources_checked += 1;
    }

    Ok(report)
}

fn validate_resource(resource: &Resource, table: &super::Table, report: &mut ValidationReport) {
    let expected: Vec<&str> = resource
        .schema
        .fields
        .iter()
        .map(|field| field.name.as_str())
        .collect();

    if table.headers.iter().map(String::as_str).ne(expected.iter().copied()) {
        report.issues.push(format!(
            "{}: header `{}` does not match schema `{}`",
            resource.name,
            table.headers.join(","),
            expected.join(",")
        ));
        return;
    }

    let mut keys = HashSet::new();
    for (index, row) in table.rows.iter().enumerate() {
        // Header is line 1.
        let line = index + 2;
        report.rows_checked += 1;

        if row.len() != expected.len() {
            report.issues.push(format!(
                "{}: line {} has {} cells, expected {}",
                resource.name,
                line,
                row.len(),
                expected.len()
            ));
            continue;
        }

        let key = row[0].as_str();
        if key.is_empty() {
            report
                .issues
                .push(format!("{}: line {} has an empty {}", resource.name, line, expected[0]));
        } else if !keys.insert(key.to_string()) {
            report.issues.push(format!(
                "{}: line {} repeats {} `{}`",
                resource.name, line, expected[0], key
            ));
        }

        for (cell, field) in row.iter().zip(&resource.schema.fields) {
            if field.field_type == FieldType::Number
                && !cell.is_empty()
                && cell.parse::<f64>().is_err()
            {
                report.issues.push(format!(
                    "{}: line {} column `{}` value `{}` is not a number",
                    resource.name, line, field.name, cell
                ));
            }
        }
    }
}
