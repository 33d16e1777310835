//! Terminal rendering of result sets

use comfy_table::{Table, presets::UTF8_FULL};
use sqlgate_core::{DataSet, QueryResult, Value};

pub fn render_table(result: &QueryResult) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(result.columns.iter().map(|column| column.name.clone()));
    for row in &result.rows {
        table.add_row(row.values.iter().map(cell_text));
    }
    table
}

/// Each table under its `Table`, `Table1`, ... heading
pub fn render_dataset(data: &DataSet) -> String {
    let mut out = String::new();
    for (name, result) in data.iter() {
        out.push_str(name);
        out.push('\n');
        if result.columns.is_empty() {
            out.push_str(&format!("({} rows affected)\n", result.affected_rows));
        } else {
            out.push_str(&render_table(result).to_string());
            out.push('\n');
        }
    }
    out
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}
