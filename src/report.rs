use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Widest a single cell may render before it is cut with an ellipsis.
pub const MAX_CELL_WIDTH: usize = 40;

/// Render rows as an aligned plain-text table. Numeric cells are right-aligned.
pub fn render_table(headers: &[String], rows: &[Vec<String>], limit: Option<usize>) -> String {
    let shown = limit.unwrap_or(rows.len()).min(rows.len());
    let rows = &rows[..shown];

    let header_cells: Vec<String> = headers.iter().map(|h| clip(h)).collect();
    let body: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(|cell| clip(cell)).collect())
        .collect();

    let mut widths: Vec<usize> = header_cells
        .iter()
        .map(|cell| UnicodeWidthStr::width(cell.as_str()))
        .collect();
    for row in &body {
        for (idx, cell) in row.iter().enumerate() {
            let width = UnicodeWidthStr::width(cell.as_str());
            match widths.get_mut(idx) {
                Some(current) if width > *current => *current = width,
                Some(_) => {}
                None => widths.push(width),
            }
        }
    }

    let mut out = String::new();
    push_line(&mut out, &header_cells, &widths, false);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_line(&mut out, &rule, &widths, false);
    for row in &body {
        push_line(&mut out, row, &widths, true);
    }

    out
}

/// Footer line telling how many rows were left out.
pub fn omitted_note(total: usize, shown: usize) -> Option<String> {
    (total > shown).then(|| format!("({} of {} rows shown)", shown, total))
}

fn push_line(out: &mut String, cells: &[String], widths: &[usize], align_numbers: bool) {
    let mut line = String::new();
    for (idx, width) in widths.iter().enumerate() {
        let cell = cells.get(idx).map(String::as_str).unwrap_or("");
        let pad = width.saturating_sub(UnicodeWidthStr::width(cell));
        if idx > 0 {
            line.push_str("  ");
        }
        if align_numbers && !cell.is_empty() && cell.parse::<f64>().is_ok() {
            line.push_str(&" ".repeat(pad));
            line.push_str(cell);
        } else {
            line.push_str(cell);
            line.push_str(&" ".repeat(pad));
        }
    }
    out.push_str(line.trim_end());
    out.push('\n');
}

fn clip(cell: &str) -> String {
    if UnicodeWidthStr::width(cell) <= MAX_CELL_WIDTH {
        return cell.to_string();
    }

    let mut clipped = String::new();
    let mut used = 0;
    for ch in cell.chars() {
        let width = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + width > MAX_CELL_WIDTH - 1 {
            break;
        }
        clipped.push(ch);
        used += width;
    }
    clipped.push('…');
    clipped
}
