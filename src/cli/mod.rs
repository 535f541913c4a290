//! Render query results as an ASCII table for the qsql command line.

use crate::cursor::RowCursor;
use crate::error::ClientResult;

// Cap to keep output readable on narrow terminals.
const MAX_COL_WIDTH: usize = 80;

fn display_len(cell: &str) -> usize {
    cell.chars().count().min(MAX_COL_WIDTH)
}

fn build_separator(widths: &[usize]) -> String {
    let mut s = String::from("+");
    for w in widths {
        s.push_str(&"-".repeat(w + 2));
        s.push('+');
    }
    s
}

fn build_row(cells: &[String], widths: &[usize]) -> String {
    let mut s = String::from("|");
    for (i, w) in widths.iter().enumerate() {
        let cell = cells.get(i).map(|c| c.as_str()).unwrap_or("");
        let truncated: String = cell.chars().take(*w).collect();
        s.push(' ');
        s.push_str(&truncated);
        s.push_str(&" ".repeat(w.saturating_sub(display_len(&truncated))));
        s.push_str(" |");
    }
    s
}

/// Walk the cursor from its current position and render every remaining row
/// as an ASCII table with a footer summary. NULL cells print as `NULL`.
pub fn render_cursor(cursor: &mut RowCursor) -> ClientResult<String> {
    let cols: Vec<String> = cursor.columns()?.to_vec();
    let ncols = cols.len();

    let mut rows: Vec<Vec<String>> = Vec::new();
    while cursor.next()? {
        let mut row = Vec::with_capacity(ncols);
        for c in 1..=ncols {
            row.push(cursor.get_str(c)?.unwrap_or_else(|| "NULL".to_string()));
        }
        rows.push(row);
    }

    // Compute widths
    let mut widths: Vec<usize> = cols.iter().map(|c| display_len(c)).collect();
    for r in &rows {
        for (i, cell) in r.iter().enumerate().take(ncols) {
            let w = display_len(cell);
            if w > widths[i] {
                widths[i] = w;
            }
        }
    }

    let sep = build_separator(&widths);
    let mut out = String::new();
    out.push_str(&sep);
    out.push('\n');
    out.push_str(&build_row(&cols, &widths));
    out.push('\n');
    out.push_str(&sep);
    out.push('\n');
    for r in &rows {
        out.push_str(&build_row(r, &widths));
        out.push('\n');
    }
    out.push_str(&sep);
    out.push('\n');
    out.push_str(&format!("rows: {}, cols: {}", rows.len(), ncols));
    Ok(out)
}

/// Print the rendered table to stdout.
pub fn print_cursor(cursor: &mut RowCursor) -> ClientResult<()> {
    println!("{}", render_cursor(cursor)?);
    Ok(())
}
