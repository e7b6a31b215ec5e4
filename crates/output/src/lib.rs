use std::collections::BTreeSet;

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use tabled::builder::Builder;
use tabled::settings::Style;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
    /// Only identifiers (issue keys), one per line
    Quiet,
}

pub struct OutputRenderer {
    format: OutputFormat,
}

impl OutputRenderer {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn render<T: Serialize>(&self, value: &T) -> Result<()> {
        let json_value = serde_json::to_value(value)?;
        if let Some(text) = self.to_text(&json_value)? {
            println!("{text}");
        }
        Ok(())
    }

    /// Confirmation line for a mutation. Suppressed in quiet and
    /// machine-readable modes.
    pub fn success(&self, message: &str) {
        if self.format == OutputFormat::Table {
            println!("{} {}", "✓".green().bold(), message);
        }
    }

    fn to_text(&self, value: &Value) -> Result<Option<String>> {
        let text = match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(value)?,
            OutputFormat::Yaml => serde_yaml::to_string(value)?,
            OutputFormat::Table => match value {
                Value::Array(rows) if rows.is_empty() => "No results.".to_string(),
                Value::Object(_) => Self::record_table(value),
                _ => match Self::coerce_rows(value) {
                    Some((headers, rows)) => Self::rows_table(headers, rows),
                    None => serde_json::to_string_pretty(value)?,
                },
            },
            OutputFormat::Quiet => {
                let ids = Self::identifiers(value);
                if ids.is_empty() {
                    return Ok(None);
                }
                ids.join("\n")
            }
        };
        Ok(Some(text))
    }

    fn rows_table(headers: Vec<String>, rows: Vec<Vec<String>>) -> String {
        let mut builder = Builder::default();
        builder.push_record(headers);
        for row in rows {
            builder.push_record(row);
        }
        builder.build().with(Style::rounded()).to_string()
    }

    /// A single object as a two-column field/value table.
    fn record_table(value: &Value) -> String {
        let mut builder = Builder::default();
        builder.push_record(["field", "value"]);
        if let Value::Object(obj) = value {
            for (field, cell) in obj {
                builder.push_record([field.clone(), Self::value_to_string(cell)]);
            }
        }
        builder.build().with(Style::rounded()).to_string()
    }

    /// `key` (falling back to `id`) of each object in `value`.
    fn identifiers(value: &Value) -> Vec<String> {
        fn ident(obj: &serde_json::Map<String, Value>) -> Option<String> {
            ["key", "id"]
                .iter()
                .find_map(|field| obj.get(*field).and_then(Value::as_str))
                .map(str::to_string)
        }

        match value {
            Value::Array(rows) => rows
                .iter()
                .filter_map(|row| row.as_object().and_then(ident))
                .collect(),
            Value::Object(obj) => ident(obj).into_iter().collect(),
            _ => Vec::new(),
        }
    }

    fn coerce_rows(value: &Value) -> Option<(Vec<String>, Vec<Vec<String>>)> {
        let rows = match value {
            Value::Array(rows) if !rows.is_empty() => rows,
            _ => return None,
        };

        let mut headers = BTreeSet::new();
        for row in rows {
            if let Value::Object(obj) = row {
                headers.extend(obj.keys().cloned());
            }
        }

        if headers.is_empty() {
            return None;
        }

        // Keys first, wherever the alphabet puts them.
        let mut headers: Vec<String> = headers.into_iter().collect();
        if let Some(pos) = headers.iter().position(|h| h == "key") {
            let key = headers.remove(pos);
            headers.insert(0, key);
        }

        let data = rows
            .iter()
            .map(|row| {
                headers
                    .iter()
                    .map(|header| {
                        row.get(header)
                            .map(Self::value_to_string)
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect();

        Some((headers, data))
    }

    fn value_to_string(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
            Value::Array(items) if items.iter().all(Value::is_string) => items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", "),
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }
}
