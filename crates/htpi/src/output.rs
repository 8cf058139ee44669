//! Output formatting: table, JSON, YAML, plain.
//!
//! Portal records are schemaless JSON, so tables are built column-by-column
//! with `tabled::builder::Builder` instead of a `Tabled` derive.

use std::io::{self, Write};

use serde_json::Value;
use tabled::{Table, builder::Builder, settings::Style};

use crate::cli::OutputFormat;

/// Columns shown in list tables before the rest is elided.
const MAX_COLUMNS: usize = 7;

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of records. `id_field` leads the table and is what
/// `plain` prints.
pub fn render_records(format: OutputFormat, records: &[Value], id_field: &str) -> String {
    match format {
        OutputFormat::Table => render_record_table(records, id_field),
        OutputFormat::Json => render_json(records, false),
        OutputFormat::JsonCompact => render_json(records, true),
        OutputFormat::Yaml => render_yaml(records),
        OutputFormat::Plain => records
            .iter()
            .map(|r| record_id(r, id_field))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Render one record as a two-column field/value table.
pub fn render_record(format: OutputFormat, record: &Value, id_field: &str) -> String {
    match format {
        OutputFormat::Table => render_detail(record),
        OutputFormat::Json => render_json(record, false),
        OutputFormat::JsonCompact => render_json(record, true),
        OutputFormat::Yaml => render_yaml(record),
        OutputFormat::Plain => record_id(record, id_field),
    }
}

/// Render any serializable value; `plain` uses `plain_fn`.
pub fn render_value<T: serde::Serialize + ?Sized>(
    format: OutputFormat,
    data: &T,
    plain_fn: impl Fn(&T) -> String,
) -> String {
    match format {
        OutputFormat::Table => serde_json::to_value(data)
            .map(|v| render_detail(&v))
            .unwrap_or_else(|e| format!("<unrenderable: {e}>")),
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => plain_fn(data),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_record_table(records: &[Value], id_field: &str) -> String {
    if records.is_empty() {
        return "(no records)".into();
    }

    let columns = columns_for(records, id_field);
    let mut builder = Builder::default();
    builder.push_record(columns.clone());
    for record in records {
        builder.push_record(columns.iter().map(|c| cell(record.get(c))));
    }

    let mut table = builder.build();
    table.with(Style::rounded());
    table.to_string()
}

fn render_detail(value: &Value) -> String {
    let Some(object) = value.as_object() else {
        return cell(Some(value));
    };

    let mut builder = Builder::default();
    for (key, field) in object {
        builder.push_record([key.clone(), cell(Some(field))]);
    }
    let mut table: Table = builder.build();
    table.with(Style::rounded());
    table.to_string()
}

/// Id column first, then scalar fields in first-seen order.
fn columns_for(records: &[Value], id_field: &str) -> Vec<String> {
    let mut columns = Vec::new();
    if records.iter().any(|r| r.get(id_field).is_some()) {
        columns.push(id_field.to_owned());
    } else if records.iter().any(|r| r.get("id").is_some()) {
        columns.push("id".to_owned());
    }

    for record in records {
        let Some(object) = record.as_object() else {
            continue;
        };
        for (key, value) in object {
            if columns.len() >= MAX_COLUMNS {
                return columns;
            }
            if !value.is_object() && !value.is_array() && !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn record_id(record: &Value, id_field: &str) -> String {
    cell(record.get(id_field).or_else(|| record.get("id")))
}

fn render_json<T: serde::Serialize + ?Sized>(data: &T, compact: bool) -> String {
    let rendered = if compact {
        serde_json::to_string(data)
    } else {
        serde_json::to_string_pretty(data)
    };
    rendered.unwrap_or_else(|e| format!("<unrenderable: {e}>"))
}

fn render_yaml<T: serde::Serialize + ?Sized>(data: &T) -> String {
    serde_yaml::to_string(data).unwrap_or_else(|e| format!("<unrenderable: {e}>"))
}
