//! Data models for the heart-attack risk report.
//!
//! This module contains the dataset representation, the aggregation
//! result types shared by the pipeline and the ranking layer, and the
//! report structures handed to the renderers.

use crate::error::{RiskError, RiskResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Metric carried by an aggregation row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Number of records in the cohort.
    TotalPopulation,
    /// Number of records in the cohort with a positive outcome.
    CaseCount,
    /// Cases per 100 members of the cohort.
    IncidenceRatio,
    /// Cohort cases as a percentage of all cases in the run.
    GlobalCaseShare,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::TotalPopulation => write!(f, "Total Population"),
            Metric::CaseCount => write!(f, "Case Count"),
            Metric::IncidenceRatio => write!(f, "Incidence Ratio"),
            Metric::GlobalCaseShare => write!(f, "Global Case Share"),
        }
    }
}

/// One or more categorical values identifying a cohort.
///
/// Equality and ordering are structural over the component values.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupKey(Vec<String>);

impl GroupKey {
    pub fn new(parts: Vec<String>) -> Self {
        Self(parts)
    }

    pub fn single(value: impl Into<String>) -> Self {
        Self(vec![value.into()])
    }

    pub fn pair(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self(vec![first.into(), second.into()])
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// Returns the value at `index`, if the key has that many components.
    pub fn component(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" / "))
    }
}

/// One row of the source table. Values are positional against
/// [`Dataset::columns`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    values: Vec<String>,
}

impl RawRecord {
    pub fn new(values: Vec<String>) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }
}

/// The loaded survey table. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Dataset {
    source: PathBuf,
    columns: Vec<String>,
    index: HashMap<String, usize>,
    records: Vec<RawRecord>,
}

impl Dataset {
    /// Creates a dataset from a header and its records.
    ///
    /// Callers guarantee every record has `columns.len()` values.
    pub fn new(source: PathBuf, columns: Vec<String>, records: Vec<RawRecord>) -> Self {
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        Self {
            source,
            columns,
            index,
            records,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Position of `field` in the schema.
    pub fn column_index(&self, field: &str) -> RiskResult<usize> {
        self.index
            .get(field)
            .copied()
            .ok_or_else(|| RiskError::Schema {
                field: field.to_string(),
            })
    }
}

#[cfg(test)]
impl Dataset {
    /// Builds an in-memory dataset for tests.
    pub fn from_rows(columns: &[&str], rows: &[&[&str]]) -> Self {
        Dataset::new(
            PathBuf::from("in-memory.csv"),
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|row| RawRecord::new(row.iter().map(|v| v.to_string()).collect()))
                .collect(),
        )
    }
}

/// Aggregated figures for one cohort.
///
/// Percentages are stored unrounded; rounding happens when a table is
/// materialized for presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationRow {
    pub key: GroupKey,
    pub total_population: u64,
    pub case_count: u64,
    /// `case_count / total_population * 100`, or 0 for an empty cohort.
    pub incidence_ratio: f64,
    /// `case_count / total_cases * 100`, or 0 when the run has no cases.
    pub global_case_share: f64,
}

impl AggregationRow {
    /// Builds a row and derives both percentages.
    pub fn new(key: GroupKey, total_population: u64, case_count: u64, total_cases: u64) -> Self {
        Self {
            key,
            total_population,
            case_count,
            incidence_ratio: percentage(case_count, total_population),
            global_case_share: percentage(case_count, total_cases),
        }
    }

    /// Returns the value of `metric` as a float.
    pub fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::TotalPopulation => self.total_population as f64,
            Metric::CaseCount => self.case_count as f64,
            Metric::IncidenceRatio => self.incidence_ratio,
            Metric::GlobalCaseShare => self.global_case_share,
        }
    }
}

/// `part / whole * 100`, defined as 0 when `whole` is 0.
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// How the rows of an [`OrderedSeries`] were arranged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy", content = "by")]
pub enum OrderPolicy {
    /// Lexical group-key order as produced by the pipeline.
    Natural,
    /// Caller-supplied category order.
    Fixed(Vec<GroupKey>),
    /// Descending by a metric, ties by group key.
    Descending(Metric),
    /// Ascending by the numeric value of the first key component.
    NumericAscending,
}

/// Aggregation rows with an explicit ordering policy and an optional
/// first difference per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderedSeries {
    pub policy: OrderPolicy,
    pub rows: Vec<AggregationRow>,
    /// Metric the differences were taken over.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difference_metric: Option<Metric>,
    /// `metric[i] - metric[i - 1]`, with 0 for the first row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_difference: Option<Vec<f64>>,
    /// Each row's cases as a percentage of the cases in its enclosing group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_share: Option<Vec<f64>>,
}

impl OrderedSeries {
    pub fn new(policy: OrderPolicy, rows: Vec<AggregationRow>) -> Self {
        Self {
            policy,
            rows,
            difference_metric: None,
            first_difference: None,
            group_share: None,
        }
    }
}

#[cfg(test)]
impl OrderedSeries {
    pub fn total_cases(&self) -> u64 {
        self.rows.iter().map(|r| r.case_count).sum()
    }
}

/// Column shown in a rendered section table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Population,
    Cases,
    IncidenceRatio,
    CaseShare,
    AbsoluteIncrease,
    /// Share of the cases within the row's enclosing group.
    GroupShare,
    /// Per-row annotation derived from the first key component.
    Annotation,
}

impl Column {
    pub fn header(&self) -> &'static str {
        match self {
            Column::Population => "Total Population",
            Column::Cases => "Heart Attack Cases",
            Column::IncidenceRatio => "Incidence Ratio (%)",
            Column::CaseShare => "Share of All Cases (%)",
            Column::AbsoluteIncrease => "Absolute Increase (%)",
            Column::GroupShare => "Share Within Group (%)",
            Column::Annotation => "Code",
        }
    }
}

/// A table row after rounding for presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentedRow {
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    pub total_population: u64,
    pub case_count: u64,
    pub incidence_ratio: f64,
    pub global_case_share: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub absolute_increase: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_share: Option<f64>,
}

/// One table inside a study case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    /// Header for each key component.
    pub key_columns: Vec<String>,
    pub columns: Vec<Column>,
    /// Unrounded series backing the table.
    pub series: OrderedSeries,
    /// Rounded rows, materialized once from `series`.
    pub table: Vec<PresentedRow>,
}

/// A "N times higher" comparison between two cohorts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub numerator: GroupKey,
    pub denominator: GroupKey,
    pub metric: Metric,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio: Option<f64>,
    /// Why the ratio could not be computed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Finding {
    /// Human-readable sentence for the report.
    pub fn sentence(&self) -> String {
        match (self.ratio, &self.error) {
            (Some(ratio), _) => format!(
                "{} of **{}** is {:.2}x that of **{}**.",
                self.metric, self.numerator, ratio, self.denominator
            ),
            (None, Some(error)) => format!(
                "{} of **{}** vs **{}** could not be computed: {}",
                self.metric, self.numerator, self.denominator, error
            ),
            (None, None) => format!(
                "{} of **{}** vs **{}** was not computed.",
                self.metric, self.numerator, self.denominator
            ),
        }
    }
}

/// Result of running one study case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    pub number: u8,
    pub slug: String,
    pub title: String,
    pub question: String,
    pub sections: Vec<Section>,
    pub findings: Vec<Finding>,
    /// Set when the case degraded to an empty result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Summary of the loaded source table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetOverview {
    pub source: String,
    pub available: bool,
    pub rows: usize,
    pub columns: usize,
    /// Outcome definition, e.g. `HadHeartAttack == Yes`.
    pub outcome: String,
    /// Record filters every case was restricted by.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Metadata about the report run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub generated_at: DateTime<Utc>,
    pub version: String,
    pub cases_run: usize,
    pub duration_seconds: f64,
}

/// The complete risk report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub dataset: DatasetOverview,
    pub cases: Vec<CaseReport>,
}

impl Report {
    /// Number of cases that degraded to an empty result.
    pub fn degraded_cases(&self) -> usize {
        self.cases.iter().filter(|c| c.warning.is_some()).count()
    }
}
