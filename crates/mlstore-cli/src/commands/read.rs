use clap::{Args, ValueEnum};
use colored::Colorize;
use mlstore_query::Table;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Fetch a dataset and print it
#[derive(Args)]
pub struct ReadCommand {
    /// Dataset URI (e.g. "influx://sensors/temperature?field=temp&range=-24h")
    pub uri: String,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

impl ReadCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;

        let item = rt.block_on(async {
            let registry = super::influx_registry().await?;
            anyhow::Ok(registry.get_dataitem(&self.uri).await?)
        })?;
        debug!("Fetched {} rows from {}", item.body.len(), item.artifact_url);

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&item.body.rows)?),
            OutputFormat::Table => {
                print!("{}", render_table(&item.body));
                println!();
                println!(
                    "{} {}",
                    item.body.len().to_string().bright_cyan(),
                    "rows".bright_white()
                );
            }
        }

        Ok(())
    }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Plain-text grid: header, separator, one line per row
pub fn render_table(table: &Table) -> String {
    let columns = table.columns();
    let cells: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| columns.iter().map(|c| cell(row.get(c))).collect())
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or_default()
        })
        .collect();

    let line = |values: &[String]| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<width$}", v, width = *w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();

    let mut out = String::new();
    for values in [&columns, &rule].into_iter().chain(&cells) {
        out.push_str(&line(values));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlstore_query::DataRow;
    use serde_json::json;

    #[test]
    fn test_render_table() {
        let row: DataRow = [
            ("field".to_string(), json!("temp")),
            ("value".to_string(), json!(21.5)),
        ]
        .into_iter()
        .collect();
        let rendered = render_table(&Table::from_rows(vec![row]));

        assert_eq!(rendered, "field  value\n-----  -----\ntemp   21.5\n");
    }

    #[test]
    fn test_render_empty_table_keeps_header() {
        let rendered = render_table(&Table::empty(mlstore_query_influx::result_schema()));
        assert!(rendered.starts_with("time  field  value  measurement  tags\n"));
        assert_eq!(rendered.lines().count(), 2);
    }
}
