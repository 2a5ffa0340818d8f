//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Typed lists use the
//! `Tabled` derive; view-model rows are positional, so their tables are
//! built cell by cell.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde_json::Value;
use tabled::{Table, Tabled, builder::Builder, settings::Style};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// One-line source status for a view.
pub fn connection_badge(connected: bool, color: bool) -> String {
    match (connected, color) {
        (true, true) => format!("{}", "● connected".green()),
        (false, true) => format!("{}", "○ disconnected".red()),
        (true, false) => "connected".into(),
        (false, false) => "disconnected".into(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
pub fn render_list<T, R>(
    format: &OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Ok(Table::new(rows).with(Style::rounded()).to_string())
        }
        OutputFormat::Plain => Ok(data.iter().map(id_fn).collect::<Vec<_>>().join("\n")),
        _ => render_structured(format, data),
    }
}

/// Render positional rows. Column 0 carries the row key.
pub fn render_rows(format: &OutputFormat, rows: &[&[Value]]) -> Result<String, CliError> {
    match format {
        OutputFormat::Table => {
            let mut builder = Builder::default();
            for row in rows {
                builder.push_record(row.iter().map(cell_text));
            }
            Ok(builder.build().with(Style::rounded()).to_string())
        }
        OutputFormat::Plain => Ok(rows
            .iter()
            .filter_map(|row| row.first().map(cell_text))
            .collect::<Vec<_>>()
            .join("\n")),
        _ => render_structured(format, &rows),
    }
}

/// Render free-form JSON. Tables have no fixed columns here, so `table`
/// and `plain` fall back to pretty JSON.
pub fn render_value(format: &OutputFormat, value: &Value) -> Result<String, CliError> {
    match format {
        OutputFormat::JsonCompact | OutputFormat::Yaml => render_structured(format, value),
        _ => render_json(value, false),
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

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_structured<T: serde::Serialize + ?Sized>(
    format: &OutputFormat,
    data: &T,
) -> Result<String, CliError> {
    match format {
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => serde_yaml::to_string(data).map_err(|e| CliError::Core {
            message: format!("YAML serialization failed: {e}"),
        }),
        _ => render_json(data, false),
    }
}

fn render_json<T: serde::Serialize + ?Sized>(data: &T, compact: bool) -> Result<String, CliError> {
    let rendered = if compact {
        serde_json::to_string(data)
    } else {
        serde_json::to_string_pretty(data)
    };
    rendered.map_err(|e| CliError::Core {
        message: format!("JSON serialization failed: {e}"),
    })
}
