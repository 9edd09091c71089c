use std::collections::HashSet;

use log::{debug, warn};
use reqwest::Client;

use crate::config::SourceConfig;
use crate::error::{AppError, Context, Result};
use crate::utils::{collapse_whitespace, decode_entities};

use super::{sort_by_name, ConstituentRecord};

/// Download the page that hosts the constituents table.
pub async fn fetch_source_html(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to request constituents page {url}"))?;

    if !response.status().is_success() {
        return Err(AppError::message(format!(
            "Constituents page request failed with status {}",
            response.status()
        )));
    }

    let body = response
        .text()
        .await
        .context("Failed to read constituents page body")?;
    Ok(body)
}

/// Extract constituents from the table identified by `source.table_id`, sorted by name.
///
/// Fails before yielding anything when the table is missing or its header does not begin
/// with `source.expected_headers`.
pub fn scrape_constituents(html: &str, source: &SourceConfig) -> Result<Vec<ConstituentRecord>> {
    let lower = html.to_ascii_lowercase();
    let body = find_table(html, &lower, &source.table_id).ok_or_else(|| {
        AppError::table_format(format!("no table with id `{}` found", source.table_id))
    })?;

    let rows = parse_rows(body);

    let header = rows
        .iter()
        .find(|row| !row.is_empty() && row.iter().all(|cell| cell.header))
        .ok_or_else(|| AppError::table_format("constituents table has no header row"))?;

    let header_matches = source.expected_headers.len() <= header.len()
        && source
            .expected_headers
            .iter()
            .zip(header.iter())
            .all(|(expected, cell)| cell.text == *expected);

    if !header_matches {
        return Err(AppError::table_format(format!(
            "constituents table header starts with {:?}, expected {:?}",
            header
                .iter()
                .take(source.expected_headers.len())
                .map(|cell| cell.text.as_str())
                .collect::<Vec<_>>(),
            source.expected_headers
        )));
    }

    let needed = source
        .symbol_column
        .max(source.name_column)
        .max(source.sector_column);

    let mut seen = HashSet::new();
    let mut records = Vec::new();

    for row in &rows {
        let fields: Vec<&str> = row
            .iter()
            .filter(|cell| !cell.header)
            .map(|cell| cell.text.as_str())
            .collect();

        if fields.is_empty() {
            continue;
        }

        if fields.len() <= needed {
            debug!("Skipping short table row with {} cells", fields.len());
            continue;
        }

        let symbol = fields[source.symbol_column];
        if symbol.is_empty() {
            debug!("Skipping table row without a symbol");
            continue;
        }

        if !seen.insert(symbol.to_string()) {
            warn!("Duplicate constituent `{symbol}` in source table; keeping the first row");
            continue;
        }

        records.push(ConstituentRecord::new(
            symbol,
            fields[source.name_column],
            fields[source.sector_column],
        ));
    }

    if records.is_empty() {
        return Err(AppError::table_format("constituents table has no data rows"));
    }

    sort_by_name(&mut records);
    Ok(records)
}

#[derive(Debug)]
struct Cell {
    header: bool,
    text: String,
}

/// Return the inner HTML of the `<table>` whose `id` attribute equals `table_id`.
fn find_table<'a>(html: &'a str, lower: &str, table_id: &str) -> Option<&'a str> {
    let mut pos = 0;
    while let Some(start) = find_tag(lower, pos, "table") {
        let tag_end = start + lower[start..].find('>')?;
        let tag = &html[start..=tag_end];

        if attribute(tag, "id").as_deref() == Some(table_id) {
            let body_start = tag_end + 1;
            let body_end = matching_table_close(lower, body_start);
            return Some(&html[body_start..body_end]);
        }

        pos = tag_end + 1;
    }
    None
}

fn matching_table_close(lower: &str, from: usize) -> usize {
    let mut depth = 1usize;
    let mut pos = from;

    loop {
        let Some(close) = lower[pos..].find("</table").map(|idx| pos + idx) else {
            return lower.len();
        };

        match find_tag(lower, pos, "table") {
            Some(open) if open < close => {
                depth += 1;
                pos = open + "<table".len();
            }
            _ => {
                depth -= 1;
                if depth == 0 {
                    return close;
                }
                pos = close + "</table".len();
            }
        }
    }
}

/// Position of the next `<name` start tag at or after `from`, ignoring longer tag names.
fn find_tag(lower: &str, from: usize, name: &str) -> Option<usize> {
    let mut pos = from;
    while let Some(idx) = lower[pos..].find('<') {
        let start = pos + idx;
        let rest = &lower[start + 1..];
        if rest.starts_with(name) {
            let boundary = rest[name.len()..].chars().next();
            if matches!(boundary, Some(c) if c.is_ascii_whitespace() || c == '>' || c == '/') {
                return Some(start);
            }
        }
        pos = start + 1;
    }
    None
}

fn attribute(tag: &str, name: &str) -> Option<String> {
    let lower = tag.to_ascii_lowercase();
    let mut pos = 0;

    while let Some(idx) = lower[pos..].find(name) {
        let start = pos + idx;
        pos = start + name.len();

        let preceded_by_space = lower[..start]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_whitespace());
        if !preceded_by_space {
            continue;
        }

        let after = lower[pos..].trim_start();
        let Some(value_part) = after.strip_prefix('=') else {
            continue;
        };
        let value_start = tag.len() - value_part.len();
        let raw = tag[value_start..].trim_start();

        let value = match raw.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let inner = &raw[1..];
                &inner[..inner.find(quote).unwrap_or(inner.len())]
            }
            _ => {
                let end = raw
                    .find(|c: char| c.is_ascii_whitespace() || c == '>' || c == '/')
                    .unwrap_or(raw.len());
                &raw[..end]
            }
        };

        return Some(decode_entities(value));
    }
    None
}

fn parse_rows(body: &str) -> Vec<Vec<Cell>> {
    let lower = body.to_ascii_lowercase();
    let mut rows = Vec::new();
    let mut pos = 0;

    while let Some(start) = find_tag(&lower, pos, "tr") {
        let Some(open_end) = lower[start..].find('>').map(|idx| start + idx + 1) else {
            break;
        };

        let next_row = find_tag(&lower, open_end, "tr").unwrap_or(lower.len());
        let row_end = lower[open_end..next_row]
            .find("</tr")
            .map(|idx| open_end + idx)
            .unwrap_or(next_row);

        rows.push(parse_cells(&body[open_end..row_end], &lower[open_end..row_end]));
        pos = next_row;
    }

    rows
}

fn parse_cells(row: &str, lower: &str) -> Vec<Cell> {
    let mut cells = Vec::new();
    let mut pos = 0;

    while let Some((start, header)) = next_cell(lower, pos) {
        let Some(content_start) = lower[start..].find('>').map(|idx| start + idx + 1) else {
            break;
        };

        let next = next_cell(lower, content_start)
            .map(|(idx, _)| idx)
            .unwrap_or(lower.len());
        let close = if header { "</th" } else { "</td" };
        let content_end = lower[content_start..next]
            .find(close)
            .map(|idx| content_start + idx)
            .unwrap_or(next);

        cells.push(Cell {
            header,
            text: cell_text(&row[content_start..content_end]),
        });
        pos = next;
    }

    cells
}

fn next_cell(lower: &str, from: usize) -> Option<(usize, bool)> {
    let td = find_tag(lower, from, "td");
    let th = find_tag(lower, from, "th");
    match (td, th) {
        (Some(td), Some(th)) if th < td => Some((th, true)),
        (Some(td), _) => Some((td, false)),
        (None, Some(th)) => Some((th, true)),
        (None, None) => None,
    }
}

fn cell_text(fragment: &str) -> String {
    let mut stripped = String::with_capacity(fragment.len());
    let mut in_tag = false;

    for ch in fragment.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                stripped.push(' ');
            }
            _ if !in_tag => stripped.push(ch),
            _ => {}
        }
    }

    collapse_whitespace(&decode_entities(&stripped))
}
