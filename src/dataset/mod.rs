//! Dataset loading.
//!
//! The survey table is read from a delimited file at most once per loader
//! and published to every reader through a [`OnceLock`]. A failed load is
//! not retried: the loader keeps returning the same unavailable handle, and
//! every downstream stage turns that into an empty result.

use crate::error::{RiskError, RiskResult};
use crate::models::{Dataset, DatasetOverview, RawRecord};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Columns every study case depends on.
pub const REQUIRED_COLUMNS: [&str; 12] = [
    "State",
    "Sex",
    "PhysicalActivities",
    "SleepHours",
    "HadHeartAttack",
    "HadStroke",
    "HadDiabetes",
    "SmokerStatus",
    "ECigaretteUsage",
    "AgeCategory",
    "AlcoholDrinkers",
    "CovidPos",
];

/// Columns that must hold a number in every row.
pub const NUMERIC_COLUMNS: [&str; 1] = ["SleepHours"];

const PROGRESS_STEP: usize = 10_000;

/// Options controlling how the source file is read.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Field delimiter byte.
    pub delimiter: u8,
    /// Whether to show a spinner while reading.
    pub show_progress: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            show_progress: false,
        }
    }
}

impl From<&crate::config::DatasetConfig> for LoadOptions {
    fn from(config: &crate::config::DatasetConfig) -> Self {
        Self {
            delimiter: config.delimiter_byte(),
            show_progress: false,
        }
    }
}

/// Outcome of a load: the shared dataset, or the sentinel recording why it
/// is unavailable.
#[derive(Debug, Clone)]
pub enum DatasetHandle {
    Available(Arc<Dataset>),
    Unavailable(RiskError),
}

impl DatasetHandle {
    pub fn dataset(&self) -> Option<&Dataset> {
        match self {
            DatasetHandle::Available(dataset) => Some(dataset.as_ref()),
            DatasetHandle::Unavailable(_) => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, DatasetHandle::Available(_))
    }

    pub fn error(&self) -> Option<&RiskError> {
        match self {
            DatasetHandle::Available(_) => None,
            DatasetHandle::Unavailable(err) => Some(err),
        }
    }

    /// One-line warning for the presentation layer.
    pub fn warning(&self) -> Option<String> {
        self.error()
            .map(|err| format!("Dataset unavailable: {}", err))
    }

    /// Summarizes the handle for the report header.
    pub fn overview(&self, source: &Path, outcome: String) -> DatasetOverview {
        match self {
            DatasetHandle::Available(dataset) => DatasetOverview {
                source: dataset.source().display().to_string(),
                available: true,
                rows: dataset.len(),
                columns: dataset.columns().len(),
                outcome,
                filters: Vec::new(),
                error: None,
            },
            DatasetHandle::Unavailable(err) => DatasetOverview {
                source: source.display().to_string(),
                available: false,
                rows: 0,
                columns: 0,
                outcome,
                filters: Vec::new(),
                error: Some(err.to_string()),
            },
        }
    }
}

/// Loads one source file on first use and hands out the same handle to
/// every caller afterwards.
#[derive(Debug)]
pub struct DatasetLoader {
    source: PathBuf,
    options: LoadOptions,
    cell: OnceLock<DatasetHandle>,
}

impl DatasetLoader {
    pub fn new(source: PathBuf, options: LoadOptions) -> Self {
        Self {
            source,
            options,
            cell: OnceLock::new(),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Returns the dataset, reading the file if this is the first call.
    ///
    /// Concurrent first callers block until the single read finishes.
    pub fn load(&self) -> &DatasetHandle {
        self.cell.get_or_init(|| {
            let start = Instant::now();
            info!("Loading dataset from {}", self.source.display());

            match read_dataset(&self.source, &self.options) {
                Ok(dataset) => {
                    info!(
                        "Loaded {} rows x {} columns in {:.2}s",
                        dataset.len(),
                        dataset.columns().len(),
                        start.elapsed().as_secs_f64()
                    );
                    if dataset.is_empty() {
                        warn!("{} has a header but no records", self.source.display());
                    }
                    DatasetHandle::Available(Arc::new(dataset))
                }
                Err(err) => {
                    warn!("{}", err);
                    DatasetHandle::Unavailable(err)
                }
            }
        })
    }

    /// True once a load has been attempted, successful or not.
    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }
}

static SHARED_LOADER: OnceLock<DatasetLoader> = OnceLock::new();

/// Installs the process-wide loader for `source`.
///
/// Only the first installation takes effect; later calls return the
/// already-installed loader.
pub fn install(source: PathBuf, options: LoadOptions) -> &'static DatasetLoader {
    let loader = SHARED_LOADER.get_or_init(|| DatasetLoader::new(source.clone(), options));
    if loader.is_loaded() {
        debug!("Reusing dataset already loaded from {}", loader.source().display());
    }
    if loader.source() != source {
        warn!(
            "Dataset loader already installed for {}; ignoring {}",
            loader.source().display(),
            source.display()
        );
    }
    loader
}

/// Reads and validates the dataset at `path`.
pub fn read_dataset(path: &Path, options: &LoadOptions) -> RiskResult<Dataset> {
    let file = File::open(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => RiskError::NotFound {
            path: path.to_path_buf(),
        },
        _ => RiskError::Parse {
            path: path.to_path_buf(),
            reason: err.to_string(),
        },
    })?;

    read_from(path, file, options)
}

/// Reads and validates a dataset from any reader. `source` is used for
/// error messages and provenance only.
pub fn read_from<R: Read>(source: &Path, reader: R, options: &LoadOptions) -> RiskResult<Dataset> {
    let parse_error = |reason: String| RiskError::Parse {
        path: source.to_path_buf(),
        reason,
    };

    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(true)
        .flexible(false)
        .from_reader(reader);

    let columns: Vec<String> = csv_reader
        .headers()
        .map_err(|e| parse_error(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|required| !columns.iter().any(|c| c == required))
        .collect();
    if !missing.is_empty() {
        return Err(parse_error(format!(
            "missing required columns: {}",
            missing.join(", ")
        )));
    }

    let numeric: Vec<(usize, &str)> = NUMERIC_COLUMNS
        .iter()
        .filter_map(|name| columns.iter().position(|c| c == name).map(|i| (i, *name)))
        .collect();

    let progress = options.show_progress.then(|| {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg} {pos} rows") {
            pb.set_style(style);
        }
        pb.set_message("Reading dataset");
        pb
    });

    let mut records = Vec::new();
    for (row, result) in csv_reader.records().enumerate() {
        let record = result.map_err(|e| parse_error(e.to_string()))?;

        for &(index, name) in &numeric {
            let value = record.get(index).unwrap_or("").trim();
            if value.parse::<f64>().is_err() {
                // Header is line 1.
                return Err(parse_error(format!(
                    "line {}: column {} value '{}' is not numeric",
                    row + 2,
                    name,
                    value
                )));
            }
        }

        records.push(RawRecord::new(
            record.iter().map(|value| value.trim().to_string()).collect(),
        ));

        if let Some(ref pb) = progress {
            if records.len() % PROGRESS_STEP == 0 {
                pb.set_position(records.len() as u64);
            }
        }
    }

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    debug!("Parsed {} records from {}", records.len(), source.display());
    Ok(Dataset::new(source.to_path_buf(), columns, records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "State,Sex,PhysicalActivities,SleepHours,HadHeartAttack,HadStroke,HadDiabetes,SmokerStatus,ECigaretteUsage,AgeCategory,AlcoholDrinkers,CovidPos";

    fn csv_with_rows(rows: &[&str]) -> String {
        let mut content = String::from(HEADER);
        for row in rows {
            content.push('\n');
            content.push_str(row);
        }
        content
    }

    #[test]
    fn test_read_valid_dataset() {
        let content = csv_with_rows(&[
            "Ohio,Male,Yes,7.0,No,No,No,Never smoked,Never used e-cigarettes in my entire life,Age 18 to 24,No,No",
            "Ohio,Female,No,5.0,Yes,No,Yes,Former smoker,Never used e-cigarettes in my entire life,Age 65 to 69,Yes,Yes",
        ]);

        let dataset = read_from(
            Path::new("inline.csv"),
            content.as_bytes(),
            &LoadOptions::default(),
        )
        .unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.columns().len(), 12);
        assert_eq!(dataset.column_index("SleepHours"), Ok(3));
    }

    #[test]
    fn test_cells_are_trimmed_like_headers() {
        let content = csv_with_rows(&[
            "Ohio, Female ,Yes,7.0,Yes ,No,No,Never smoked,Never used e-cigarettes in my entire life,Age 18 to 24,No,No",
        ]);

        let dataset = read_from(
            Path::new("padded.csv"),
            content.as_bytes(),
            &LoadOptions::default(),
        )
        .unwrap();

        let record = &dataset.records()[0];
        assert_eq!(record.get(1), Some("Female"));
        assert_eq!(record.get(4), Some("Yes"));
    }

    #[test]
    fn test_missing_required_column_is_parse_error() {
        let content = "State,Sex\nOhio,Male\n";
        let err = read_from(Path::new("bad.csv"), content.as_bytes(), &LoadOptions::default())
            .unwrap_err();

        match err {
            RiskError::Parse { reason, .. } => {
                assert!(reason.contains("HadHeartAttack"));
                assert!(!reason.contains("Sex,"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_ragged_row_is_parse_error() {
        let content = csv_with_rows(&["Ohio,Male,Yes"]);
        let err = read_from(Path::new("ragged.csv"), content.as_bytes(), &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, RiskError::Parse { .. }));
    }

    #[test]
    fn test_non_numeric_sleep_hours_is_parse_error() {
        let content = csv_with_rows(&[
            "Ohio,Male,Yes,lots,No,No,No,Never smoked,Never used e-cigarettes in my entire life,Age 18 to 24,No,No",
        ]);
        let err = read_from(Path::new("sleep.csv"), content.as_bytes(), &LoadOptions::default())
            .unwrap_err();

        match err {
            RiskError::Parse { reason, .. } => assert!(reason.contains("line 2")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_degrades_to_unavailable() {
        let loader = DatasetLoader::new(
            PathBuf::from("/nonexistent/heart_2022_no_nans.csv"),
            LoadOptions::default(),
        );

        let handle = loader.load();
        assert!(!handle.is_available());
        assert!(matches!(handle.error(), Some(RiskError::NotFound { .. })));
        assert!(handle.warning().unwrap().starts_with("Dataset unavailable"));
    }

    #[test]
    fn test_loader_reads_once() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{}",
            csv_with_rows(&[
                "Utah,Male,Yes,8.0,No,No,No,Never smoked,Never used e-cigarettes in my entire life,Age 30 to 34,No,No",
            ])
        )
        .unwrap();

        let loader = DatasetLoader::new(file.path().to_path_buf(), LoadOptions::default());
        assert!(!loader.is_loaded());

        let first = loader.load().dataset().unwrap() as *const Dataset;

        // Removing the file must not matter: the second call never reads.
        let path = file.path().to_path_buf();
        drop(file);
        assert!(!path.exists());

        let second = loader.load().dataset().unwrap() as *const Dataset;
        assert_eq!(first, second);
        assert!(loader.is_loaded());
    }

    #[test]
    fn test_concurrent_readers_share_one_dataset() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{}",
            csv_with_rows(&[
                "Utah,Male,Yes,8.0,Yes,No,No,Never smoked,Never used e-cigarettes in my entire life,Age 30 to 34,No,No",
            ])
        )
        .unwrap();

        let loader = DatasetLoader::new(file.path().to_path_buf(), LoadOptions::default());
        let addresses: Vec<usize> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| loader.load().dataset().unwrap() as *const Dataset as usize)
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(addresses.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_overview_for_unavailable_dataset() {
        let handle = DatasetHandle::Unavailable(RiskError::NotFound {
            path: PathBuf::from("gone.csv"),
        });
        let overview = handle.overview(Path::new("gone.csv"), "HadHeartAttack == Yes".to_string());

        assert!(!overview.available);
        assert_eq!(overview.rows, 0);
        assert_eq!(overview.error.as_deref(), Some("dataset not found at gone.csv"));
    }
}
