use anyhow::Context;
use clap::Args;
use colored::Colorize;
use mlstore_query::{split_uri, DataRow, Frame, StoreTarget, Table, TargetSpec};
use mlstore_query_influx::{QueryDescriptor, SCHEME};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Write rows from a JSON file to a measurement
#[derive(Args)]
pub struct WriteCommand {
    /// Target URI (e.g. "influx://sensors/temperature?env=staging")
    pub uri: String,

    /// JSON file holding an array of row objects
    #[arg(long, short = 'i')]
    pub input: PathBuf,

    /// Column holding point timestamps (default: "time")
    #[arg(long)]
    pub time_col: Option<String>,

    /// Column to store as a tag (repeatable)
    #[arg(long = "tag-col")]
    pub tag_cols: Vec<String>,

    /// Column to store as a field (repeatable; default: every other column)
    #[arg(long = "field-col")]
    pub field_cols: Vec<String>,
}

/// Load a JSON array of row objects
pub fn load_rows(path: &Path) -> anyhow::Result<Vec<DataRow>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of objects", path.display()))
}

impl WriteCommand {
    /// Target spec equivalent to this command's URI and flags
    pub fn target_spec(&self) -> anyhow::Result<TargetSpec> {
        let (scheme, key) = split_uri(&self.uri)?;
        if scheme != SCHEME {
            anyhow::bail!("Unsupported scheme {}, expected {}://", scheme, SCHEME);
        }

        let desc = QueryDescriptor::parse(key)?;
        let path = format!("{}/{}", desc.bucket, desc.measurement);
        let mut spec = TargetSpec::new(SCHEME)
            .with_name(path.as_str())
            .with_path(path.as_str())
            .with_attribute("env", desc.environment.as_str());

        let overrides = [
            ("url", &desc.overrides.url),
            ("org", &desc.overrides.org),
            ("token", &desc.overrides.token),
            ("token_secret", &desc.overrides.token_secret),
        ];
        for (name, value) in overrides {
            if let Some(value) = value {
                spec = spec.with_attribute(name, value.as_str());
            }
        }

        if let Some(time_col) = &self.time_col {
            spec = spec.with_attribute("time_col", time_col.as_str());
        }
        if !self.tag_cols.is_empty() {
            spec = spec.with_attribute("tag_cols", self.tag_cols.clone());
        }
        if !self.field_cols.is_empty() {
            spec = spec.with_attribute("field_cols", self.field_cols.clone());
        }

        Ok(spec)
    }

    pub fn execute(self) -> anyhow::Result<()> {
        let spec = self.target_spec()?;
        let rows = load_rows(&self.input)?;
        let table = Table::from_rows(rows);
        debug!("Loaded {} rows with columns {:?}", table.len(), table.columns());

        let rt = tokio::runtime::Runtime::new()?;
        let written = rt.block_on(async {
            let registry = super::influx_registry().await?;
            let target = registry.create_target(spec).await?;
            anyhow::Ok(target.write_frame(Frame::Local(&table), &[], None).await?)
        })?;

        println!(
            "{} Wrote {} of {} rows to {}",
            "✓".bright_green(),
            written.to_string().bright_cyan(),
            table.len(),
            self.uri.split('?').next().unwrap_or_default().bright_white()
        );

        Ok(())
    }
}
