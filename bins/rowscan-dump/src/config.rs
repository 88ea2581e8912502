use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use rowscan::{Limit, ScanConfig};
use serde::Deserialize;

use crate::error::DumpError;

#[derive(Parser, Debug)]
#[command(name = "rowscan-dump", about = "Decode a delimited text file and print its rows")]
pub struct Cli {
    /// Path to a TOML config with [scan] and [input] tables
    #[arg(long, env = "ROWSCAN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Field delimiter (a single character, or \t)
    #[arg(long)]
    pub delimiter: Option<String>,

    /// First line is data, not a header; columns are named col0, col1, ...
    #[arg(long)]
    pub no_header: bool,

    /// Rows to read; negative reads all
    #[arg(long, allow_hyphen_values = true)]
    pub limit: Option<i64>,

    /// Decode workers
    #[arg(long)]
    pub fanout: Option<usize>,

    #[arg(long, value_enum, default_value_t = Format::Json)]
    pub format: Format,

    /// Input file
    pub input: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    /// One JSON object per row
    Json,
    /// Aligned columns with a header
    Table,
    /// Tab-separated values, no header
    Raw,
}

// ---- TOML Config ----

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DumpConfig {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub input: InputConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputConfig {
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default = "default_header")]
    pub header: bool,
}

fn default_delimiter() -> String {
    ",".into()
}

fn default_header() -> bool {
    true
}

impl Default for InputConfig {
    fn default() -> Self {
        Self { delimiter: default_delimiter(), header: default_header() }
    }
}

impl DumpConfig {
    pub fn load(path: &std::path::Path) -> Result<Self, DumpError> {
        let content = std::fs::read_to_string(path).map_err(|e| DumpError::Config {
            context: "read",
            detail: format!("'{}': {e}", path.display()),
        })?;
        Self::parse(&content).map_err(|e| match e {
            DumpError::Config { context, detail } => DumpError::Config {
                context,
                detail: format!("'{}': {detail}", path.display()),
            },
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self, DumpError> {
        toml::from_str(content)
            .map_err(|e| DumpError::Config { context: "parse", detail: e.to_string() })
    }

    /// Config file (if any) with command-line flags applied on top.
    pub fn resolve(cli: &Cli) -> Result<Self, DumpError> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(delimiter) = &cli.delimiter {
            config.input.delimiter = delimiter.clone();
        }
        if cli.no_header {
            config.input.header = false;
        }
        if let Some(limit) = cli.limit {
            config.scan.limit = Limit::from(limit);
        }
        if let Some(fanout) = cli.fanout {
            config.scan.fanout = fanout;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_tables() {
        let config = DumpConfig::parse(
            r#"
            [scan]
            fanout = 2
            limit = 10

            [input]
            delimiter = ";"
            header = false
            "#,
        )
        .unwrap();
        assert_eq!(config.scan.fanout, 2);
        assert_eq!(config.scan.limit, Limit::Rows(10));
        assert_eq!(config.input.delimiter, ";");
        assert!(!config.input.header);
    }

    #[test]
    fn flags_override_file_values() {
        let cli = Cli::parse_from(["rowscan-dump", "--limit", "-1", "--fanout", "3", "--no-header", "data.csv"]);
        let config = DumpConfig::resolve(&cli).unwrap();
        assert_eq!(config.scan.limit, Limit::Unbounded);
        assert_eq!(config.scan.fanout, 3);
        assert!(!config.input.header);
        assert_eq!(config.input.delimiter, ",");
        assert_eq!(cli.format, Format::Json);
    }
}
