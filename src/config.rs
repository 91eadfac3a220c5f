//! The `.heartrisk.toml` settings file.
//!
//! Every field has a default, so an empty or partial file is valid.
//! Command-line flags are layered on top by [`Config::merge_with_args`].

use crate::analysis::{Filter, Precision, MAX_DECIMALS};
use crate::cases::CaseSettings;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default name of the configuration file.
pub const CONFIG_FILE: &str = ".heartrisk.toml";

/// All settings, one struct per TOML table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// `[general]`
    #[serde(default)]
    pub general: GeneralConfig,

    /// `[dataset]`
    #[serde(default)]
    pub dataset: DatasetConfig,

    /// `[report]`
    #[serde(default)]
    pub report: ReportConfig,
}

/// Output location and log verbosity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Report path used when `--output` is absent.
    #[serde(default = "default_output")]
    pub output: String,

    /// Same as always passing `--verbose`.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "heartrisk_report.md".to_string()
}

/// Where the survey table lives and how to read it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Path to the delimited source file.
    #[serde(default = "default_dataset_path")]
    pub path: PathBuf,

    /// Column holding the outcome.
    #[serde(default = "default_outcome_field")]
    pub outcome_field: String,

    /// Outcome value counted as a case.
    #[serde(default = "default_positive_value")]
    pub positive_value: String,

    /// Field delimiter; only the first byte is used.
    #[serde(default = "default_delimiter")]
    pub delimiter: String,

    /// Record filters applied to every case, e.g. `"Sex=Female"`.
    #[serde(default)]
    pub filters: Vec<String>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: default_dataset_path(),
            outcome_field: default_outcome_field(),
            positive_value: default_positive_value(),
            delimiter: default_delimiter(),
            filters: Vec::new(),
        }
    }
}

impl DatasetConfig {
    /// Delimiter as a byte, falling back to a comma.
    pub fn delimiter_byte(&self) -> u8 {
        self.delimiter.bytes().next().unwrap_or(b',')
    }

    /// Parses the configured filters.
    pub fn parsed_filters(&self) -> Result<Vec<Filter>> {
        self.filters
            .iter()
            .map(|f| f.parse::<Filter>().map_err(anyhow::Error::msg))
            .collect()
    }

    /// Outcome definition as shown in the report.
    pub fn outcome_label(&self) -> String {
        format!("{} == {}", self.outcome_field, self.positive_value)
    }
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("Data/heart_2022_no_nans.csv")
}

fn default_outcome_field() -> String {
    "HadHeartAttack".to_string()
}

fn default_positive_value() -> String {
    "Yes".to_string()
}

fn default_delimiter() -> String {
    ",".to_string()
}

/// Table shaping and rounding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Rows kept before folding the rest into "Other".
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Decimal places for incidence ratios.
    #[serde(default = "default_decimals")]
    pub ratio_decimals: u32,

    /// Decimal places for case shares and their differences.
    #[serde(default = "default_decimals")]
    pub share_decimals: u32,

    /// Include cohort comparisons ("N times higher").
    #[serde(default = "default_true")]
    pub include_findings: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            ratio_decimals: default_decimals(),
            share_decimals: default_decimals(),
            include_findings: true,
        }
    }
}

fn default_top_n() -> usize {
    10
}

fn default_decimals() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

impl From<&ReportConfig> for CaseSettings {
    fn from(config: &ReportConfig) -> Self {
        Self {
            top_n: config.top_n,
            precision: Precision {
                ratio: config.ratio_decimals,
                share: config.share_decimals,
            },
            include_findings: config.include_findings,
        }
    }
}

impl Config {
    /// Reads and parses the file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Reads `./.heartrisk.toml` if present.
    ///
    /// `Ok(None)` when there is no such file; a file that fails to parse is an error.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Applies command-line overrides. Flags that were not given leave the
    /// file's value alone; `--where` filters are appended.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref data) = args.data {
            self.dataset.path = data.clone();
        }
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if let Some(top_n) = args.top_n {
            self.report.top_n = top_n;
        }
        self.dataset.filters.extend(args.filter.iter().cloned());
        if args.no_findings {
            self.report.include_findings = false;
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Rejects values no flag check can see, e.g. `top_n = 0` in the file.
    /// Call after [`Config::merge_with_args`].
    pub fn validate(&self) -> Result<()> {
        if self.report.top_n == 0 {
            bail!("[report].top_n must be at least 1");
        }
        for (name, decimals) in [
            ("ratio_decimals", self.report.ratio_decimals),
            ("share_decimals", self.report.share_decimals),
        ] {
            if decimals > MAX_DECIMALS {
                bail!(
                    "[report].{} is {}; at most {} decimal places are supported",
                    name,
                    decimals,
                    MAX_DECIMALS
                );
            }
        }
        self.dataset.parsed_filters()?;
        Ok(())
    }

    /// TOML text for `--init-config`.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
