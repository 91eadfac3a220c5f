//! Study cases.
//!
//! Each case is a declarative descriptor over the shared aggregation
//! pipeline: what to group by, how to order the result, which columns to
//! show and which cohorts to compare. [`run_case`] turns a descriptor into
//! a [`CaseReport`].

mod catalog;

pub use catalog::{catalog, find};

use crate::analysis::{
    aggregate, cross_group_ratio, descending_rank, fixed_order, numeric_order, present,
    share_within, top_n_fold, AggregationSpec, Precision,
};
use crate::dataset::DatasetHandle;
use crate::error::RiskResult;
use crate::models::{
    AggregationRow, CaseReport, Column, Finding, GroupKey, Metric, OrderPolicy, OrderedSeries,
    Section,
};
use crate::normalize::Normalizer;
use tracing::{debug, warn};

/// How a case arranges its aggregation rows into tables.
#[derive(Debug, Clone)]
pub enum Layout {
    /// One table in a fixed category order.
    Fixed {
        order: Vec<GroupKey>,
        difference: Option<Metric>,
    },
    /// One table sorted descending by a metric.
    Ranked(Metric),
    /// One table sorted by the numeric value of the key.
    Numeric,
    /// One table per value of key component `component`, each keeping the
    /// pipeline's row order. `within` names the key component whose groups
    /// each row's share of cases is taken over, across all tables.
    Split {
        component: usize,
        values: Vec<String>,
        difference: Option<Metric>,
        within: Option<usize>,
    },
    /// A full ranking by `metric` plus a Top-N fold with an "Other" row.
    TopN(Metric),
}

/// Descriptor of one study case.
#[derive(Debug, Clone)]
pub struct StudyCase {
    pub number: u8,
    pub slug: &'static str,
    pub title: &'static str,
    pub question: &'static str,
    pub aggregation: AggregationSpec,
    /// Header for each key component.
    pub key_headers: Vec<&'static str>,
    pub layout: Layout,
    pub columns: Vec<Column>,
    /// Cohort pairs whose incidence ratios are compared.
    pub comparisons: Vec<(GroupKey, GroupKey)>,
    /// Overrides the configured share precision.
    pub share_decimals: Option<u32>,
    /// Labels the first key component in an extra column.
    pub annotate: Option<Normalizer>,
}

impl StudyCase {
    pub fn new(
        number: u8,
        slug: &'static str,
        title: &'static str,
        question: &'static str,
        aggregation: AggregationSpec,
    ) -> Self {
        Self {
            number,
            slug,
            title,
            question,
            aggregation,
            key_headers: Vec::new(),
            layout: Layout::Ranked(Metric::IncidenceRatio),
            columns: vec![Column::Population, Column::Cases, Column::IncidenceRatio],
            comparisons: Vec::new(),
            share_decimals: None,
            annotate: None,
        }
    }

    pub fn keys(mut self, headers: &[&'static str]) -> Self {
        self.key_headers = headers.to_vec();
        self
    }

    pub fn layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn columns(mut self, columns: &[Column]) -> Self {
        self.columns = columns.to_vec();
        self
    }

    pub fn compare(mut self, numerator: GroupKey, denominator: GroupKey) -> Self {
        self.comparisons.push((numerator, denominator));
        self
    }

    pub fn share_decimals(mut self, decimals: u32) -> Self {
        self.share_decimals = Some(decimals);
        self
    }

    pub fn annotate(mut self, normalizer: Normalizer) -> Self {
        self.annotate = Some(normalizer);
        self
    }

    /// Returns true if `selector` names this case by number or slug.
    pub fn matches(&self, selector: &str) -> bool {
        let selector = selector.trim();
        selector.eq_ignore_ascii_case(self.slug)
            || selector.parse::<u8>().is_ok_and(|n| n == self.number)
    }
}

/// Run-wide settings shared by every case.
#[derive(Debug, Clone)]
pub struct CaseSettings {
    pub top_n: usize,
    pub precision: Precision,
    pub include_findings: bool,
}

impl Default for CaseSettings {
    fn default() -> Self {
        Self {
            top_n: 10,
            precision: Precision::default(),
            include_findings: true,
        }
    }
}

/// Runs one study case against the dataset handle.
///
/// An unavailable dataset yields a report with empty tables and a warning.
/// Schema errors propagate.
pub fn run_case(case: &StudyCase, handle: &DatasetHandle, settings: &CaseSettings) -> RiskResult<CaseReport> {
    debug!("Running case {} ({})", case.number, case.slug);

    let rows = aggregate(handle, &case.aggregation)?;
    let precision = Precision {
        ratio: settings.precision.ratio,
        share: case.share_decimals.unwrap_or(settings.precision.share),
    };

    let sections = arrange(case, &rows, settings.top_n)
        .into_iter()
        .map(|(title, series)| Section {
            title,
            key_columns: case.key_headers.iter().map(|h| h.to_string()).collect(),
            columns: case.columns.clone(),
            table: present(&series, precision, case.annotate.as_ref()),
            series,
        })
        .collect();

    let findings = if handle.is_available() && settings.include_findings {
        case.comparisons
            .iter()
            .map(|(numerator, denominator)| compare(&rows, numerator, denominator))
            .collect()
    } else {
        Vec::new()
    };

    Ok(CaseReport {
        number: case.number,
        slug: case.slug.to_string(),
        title: case.title.to_string(),
        question: case.question.to_string(),
        sections,
        findings,
        warning: handle.warning(),
    })
}

/// Runs every case in order, stopping at the first schema error.
pub fn run_cases(
    cases: &[StudyCase],
    handle: &DatasetHandle,
    settings: &CaseSettings,
) -> RiskResult<Vec<CaseReport>> {
    cases
        .iter()
        .map(|case| run_case(case, handle, settings))
        .collect()
}

fn arrange(case: &StudyCase, rows: &[AggregationRow], top_n: usize) -> Vec<(String, OrderedSeries)> {
    match &case.layout {
        Layout::Fixed { order, difference } => {
            let series = fixed_order(rows, order);
            let series = match difference {
                Some(metric) => series.with_first_difference(*metric),
                None => series,
            };
            vec![(case.title.to_string(), series)]
        }
        Layout::Ranked(metric) => vec![(case.title.to_string(), descending_rank(rows, *metric))],
        Layout::Numeric => vec![(case.title.to_string(), numeric_order(rows))],
        Layout::Split {
            component,
            values,
            difference,
            within,
        } => {
            let shares = within.map(|group| share_within(rows, group));
            values
                .iter()
                .map(|value| {
                    let (subset, subset_shares): (Vec<AggregationRow>, Vec<f64>) = rows
                        .iter()
                        .enumerate()
                        .filter(|(_, row)| row.key.component(*component) == Some(value.as_str()))
                        .map(|(i, row)| {
                            let share = shares.as_ref().and_then(|s| s.get(i)).copied();
                            (row.clone(), share.unwrap_or(0.0))
                        })
                        .unzip();
                    let mut series = OrderedSeries::new(OrderPolicy::Natural, subset);
                    if shares.is_some() {
                        series.group_share = Some(subset_shares);
                    }
                    let series = match difference {
                        Some(metric) => series.with_first_difference(*metric),
                        None => series,
                    };
                    (value.clone(), series)
                })
                .collect()
        }
        Layout::TopN(metric) => vec![
            (format!("Ranking by {}", metric), descending_rank(rows, *metric)),
            (
                format!("Top {} and {}", top_n, crate::analysis::OTHER_LABEL),
                top_n_fold(rows, top_n, *metric),
            ),
        ],
    }
}

fn compare(rows: &[AggregationRow], numerator: &GroupKey, denominator: &GroupKey) -> Finding {
    let metric = Metric::IncidenceRatio;
    match cross_group_ratio(rows, numerator, denominator, metric) {
        Ok(ratio) => Finding {
            numerator: numerator.clone(),
            denominator: denominator.clone(),
            metric,
            ratio: Some(ratio),
            error: None,
        },
        Err(err) => {
            warn!("Comparison {} vs {} skipped: {}", numerator, denominator, err);
            Finding {
                numerator: numerator.clone(),
                denominator: denominator.clone(),
                metric,
                ratio: None,
                error: Some(err.to_string()),
            }
        }
    }
}
