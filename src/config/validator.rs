use std::collections::HashSet;

use crate::error::{AppError, Result};

use super::{
    ApiConfig, Config, FieldSpec, SourceConfig, CONSTITUENT_HEADER, FILINGS_TITLE, MAX_RETRIES,
};

/// Validate a pipeline configuration, reporting every problem at once.
pub fn validate_config(config: &Config) -> Result<()> {
    let mut issues = Vec::new();

    validate_source(&config.source, &mut issues);
    validate_fields(&config.fields, &mut issues);
    validate_api(&config.api, &mut issues);

    if config.output.filings_base_url.trim().is_empty() {
        issues.push("output.filings_base_url must not be empty".to_string());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(AppError::Config(format!(
            "`{}` config invalid:\n  - {}",
            config.name,
            issues.join("\n  - ")
        )))
    }
}

fn validate_source(source: &SourceConfig, issues: &mut Vec<String>) {
    if source.table_id.trim().is_empty() {
        issues.push("source.table_id must not be empty".to_string());
    }

    if source.expected_headers.is_empty() {
        issues.push("source.expected_headers must name at least one header".to_string());
    }

    let columns = [
        source.symbol_column,
        source.name_column,
        source.sector_column,
    ];
    let unique: HashSet<usize> = columns.iter().copied().collect();
    if unique.len() != columns.len() {
        issues.push(format!(
            "source.columns must point at distinct cells, got {:?}",
            columns
        ));
    }
}

fn validate_fields(fields: &FieldSpec, issues: &mut Vec<String>) {
    if fields.columns().is_empty() {
        issues.push("fields must define at least one column".to_string());
        return;
    }

    let mut groups = HashSet::new();
    for group in fields.groups() {
        if group.name.trim().is_empty() {
            issues.push("field group names must not be empty".to_string());
        }
        if !groups.insert(group.name.as_str()) {
            issues.push(format!("field group `{}` is declared twice", group.name));
        }
        if group.fields.is_empty() {
            issues.push(format!("field group `{}` has no fields", group.name));
        }
    }

    let reserved: Vec<&str> = CONSTITUENT_HEADER
        .iter()
        .copied()
        .chain(std::iter::once(FILINGS_TITLE))
        .collect();
    let mut titles = HashSet::new();
    let mut pairs = HashSet::new();

    for column in fields.columns() {
        if column.field.trim().is_empty() {
            issues.push(format!("group `{}` has a field with no name", column.group));
        }
        if column.title.trim().is_empty() {
            issues.push(format!(
                "field `{}.{}` has an empty title",
                column.group, column.field
            ));
        }
        if reserved.contains(&column.title.as_str()) {
            issues.push(format!(
                "title `{}` collides with a fixed output column",
                column.title
            ));
        }
        if !titles.insert(column.title.as_str()) {
            issues.push(format!("title `{}` is used more than once", column.title));
        }
        if !pairs.insert((column.group.as_str(), column.field.as_str())) {
            issues.push(format!(
                "field `{}.{}` is requested more than once",
                column.group, column.field
            ));
        }
    }
}

fn validate_api(api: &ApiConfig, issues: &mut Vec<String>) {
    if api.base_url.trim().is_empty() {
        issues.push("api.base_url must not be empty".to_string());
    }
    if !api.url_template.contains("{symbols}") {
        issues.push("api.url_template must reference `{symbols}`".to_string());
    }
    if api.batch_size == 0 {
        issues.push("api.batch_size must be at least 1".to_string());
    }
    if api.concurrency == 0 {
        issues.push("api.concurrency must be at least 1".to_string());
    }
    if api.max_retries == 0 {
        issues.push("api.max_retries must allow at least one attempt".to_string());
    } else if api.max_retries > MAX_RETRIES {
        issues.push(format!(
            "api.max_retries must be at most {}, got {}",
            MAX_RETRIES, api.max_retries
        ));
    }
}
