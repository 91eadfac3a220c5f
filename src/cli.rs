//! Command-line flags for the report binary.
//!
//! Most flags override a `.heartrisk.toml` setting; see
//! [`crate::config::Config::merge_with_args`].

use crate::analysis::Filter;
use clap::Parser;
use std::path::PathBuf;

/// HeartRisk - heart-attack risk report over a health survey table
///
/// Reads the survey CSV once, runs every study case over it and writes
/// a Markdown or JSON report.
///
/// Examples:
///   heartrisk
///   heartrisk --data ./heart_2022_no_nans.csv --output report.md
///   heartrisk --case age,diabetes --format json
///   heartrisk --where Sex=Female
///   heartrisk --list-cases
///   heartrisk --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to the survey dataset (CSV)
    ///
    /// Overrides [dataset].path from the config file.
    #[arg(short, long, value_name = "FILE", env = "HEARTRISK_DATA")]
    pub data: Option<PathBuf>,

    /// Where to write the report
    ///
    /// Defaults to heartrisk_report.md, or [general].output from the config.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Report format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Study cases to run, by number or slug (comma-separated)
    ///
    /// Example: --case 1,diabetes,regional
    #[arg(long, value_name = "CASES", value_delimiter = ',')]
    pub case: Option<Vec<String>>,

    /// Restrict every case to matching records (repeatable)
    ///
    /// Example: --where Sex=Female --where "State!=Guam"
    #[arg(long = "where", value_name = "FIELD=VALUE")]
    pub filter: Vec<String>,

    /// Configuration file to read instead of ./.heartrisk.toml
    ///
    /// A missing default file means built-in defaults.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log debug detail (aggregations, normalizers, timings)
    #[arg(short, long)]
    pub verbose: bool,

    /// Only print errors; no spinner, no summary
    #[arg(short, long)]
    pub quiet: bool,

    /// Rows kept in Top-N rankings before folding the rest into "Other"
    #[arg(long, value_name = "COUNT")]
    pub top_n: Option<usize>,

    /// Omit cohort comparisons from the report
    #[arg(long)]
    pub no_findings: bool,

    /// List the available study cases and exit
    #[arg(long)]
    pub list_cases: bool,

    /// Exit with code 2 when the dataset could not be loaded
    ///
    /// The report is still written, with every case empty.
    #[arg(long)]
    pub fail_on_unavailable: bool,

    /// Generate a default .heartrisk.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Rendering of the finished report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown document with one table per section (default)
    #[default]
    Markdown,
    /// The full report model as pretty-printed JSON
    Json,
}

impl Args {
    /// Parses `std::env::args`, exiting on usage errors.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Checks flag combinations clap cannot express.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config and --list-cases
        if self.init_config || self.list_cases {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.top_n == Some(0) {
            return Err("Top-N must be at least 1".to_string());
        }

        if let Some(ref cases) = self.case {
            if cases.iter().any(|c| c.trim().is_empty()) {
                return Err("Case selectors must not be empty".to_string());
            }
        }

        for filter in &self.filter {
            filter.parse::<Filter>()?;
        }

        if let Some(ref data) = self.data {
            if data.is_dir() {
                return Err(format!("Dataset path is a directory: {}", data.display()));
            }
        }

        Ok(())
    }

    /// Maximum tracing level: quiet beats verbose.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
