//! Output writers for committed result tables
//!
//! A finished run leaves a [`RecordTable`] behind; these writers turn it
//! into an aligned text table, CSV, or JSON Lines. Columns always come
//! from the frozen schema, so every format writes the same grid even
//! when individual rows are missing a field.

use millrace_core::Value;
use millrace_runtime::RecordTable;
use std::io::{self, Write};

use crate::config::OutputFormat;

/// Write the table in the requested format.
pub fn write_table<W: Write>(
    out: &mut W,
    table: &RecordTable,
    format: OutputFormat,
) -> io::Result<()> {
    match format {
        OutputFormat::Table => out.write_all(render_table(table).as_bytes()),
        OutputFormat::Csv => write_csv(out, table),
        OutputFormat::Jsonl => write_jsonl(out, table),
    }
}

/// CSV with a header row of schema column names.
pub fn write_csv<W: Write>(out: &mut W, table: &RecordTable) -> io::Result<()> {
    let header: Vec<String> = table.schema().names().map(csv_field).collect();
    writeln!(out, "{}", header.join(","))?;
    for row in table.rows() {
        let cells: Vec<String> = table
            .row_values(row)
            .iter()
            .map(|v| csv_field(&cell_text(v)))
            .collect();
        writeln!(out, "{}", cells.join(","))?;
    }
    Ok(())
}

/// One JSON object per row, keyed by schema column name.
pub fn write_jsonl<W: Write>(out: &mut W, table: &RecordTable) -> io::Result<()> {
    for row in table.rows() {
        let mut object = serde_json::Map::new();
        for (name, value) in table.schema().names().zip(table.row_values(row)) {
            let json = serde_json::to_value(&value).map_err(io::Error::other)?;
            object.insert(name.to_string(), json);
        }
        let line = serde_json::to_string(&object).map_err(io::Error::other)?;
        writeln!(out, "{}", line)?;
    }
    Ok(())
}

/// Aligned text table with a `#` sequence column.
pub fn render_table(table: &RecordTable) -> String {
    if table.schema().is_empty() && table.rows().is_empty() {
        return "(empty table)\n".to_string();
    }

    let mut header: Vec<String> = vec!["#".to_string()];
    header.extend(table.schema().names().map(|n| n.to_string()));

    let mut grid: Vec<Vec<String>> = Vec::with_capacity(table.rows().len());
    for row in table.rows() {
        let mut cells = vec![row.seq.to_string()];
        cells.extend(table.row_values(row).iter().map(cell_text));
        grid.push(cells);
    }

    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for cells in &grid {
        for (i, cell) in cells.iter().enumerate() {
            if cell.len() > widths[i] {
                widths[i] = cell.len();
            }
        }
    }

    let mut rendered = String::new();
    render_line(&mut rendered, &header, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    render_line(&mut rendered, &rule, &widths);
    for cells in &grid {
        render_line(&mut rendered, cells, &widths);
    }
    rendered
}

fn render_line(buf: &mut String, cells: &[String], widths: &[usize]) {
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            buf.push_str("  ");
        }
        buf.push_str(cell);
        if i + 1 < cells.len() {
            for _ in cell.len()..widths[i] {
                buf.push(' ');
            }
        }
    }
    buf.push('\n');
}

/// Cell text shared by the table and CSV writers. Nulls render empty,
/// strings render unquoted.
fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Str(s) => s.to_string(),
        other => other.to_string(),
    }
}

fn csv_field<S: AsRef<str>>(field: S) -> String {
    let field = field.as_ref();
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
