//! Cohort aggregation.
//!
//! A single parameterized pipeline that partitions the dataset by a group
//! key, counts population and positive outcomes per cohort, and derives the
//! incidence ratio and the global case share.

use crate::dataset::DatasetHandle;
use crate::error::RiskResult;
use crate::models::{AggregationRow, Dataset, GroupKey, OrderedSeries, PresentedRow};
use crate::normalize::Normalizer;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// One component of a group key: a column, optionally passed through a
/// normalizer.
#[derive(Debug, Clone)]
pub struct KeyPart {
    pub field: String,
    pub normalizer: Option<Normalizer>,
}

impl KeyPart {
    pub fn column(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            normalizer: None,
        }
    }

    pub fn normalized(field: impl Into<String>, normalizer: Normalizer) -> Self {
        Self {
            field: field.into(),
            normalizer: Some(normalizer),
        }
    }
}

/// Record filter applied before grouping.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Keep records whose `field` equals `value`.
    Equals { field: String, value: String },
    /// Keep records whose `field` differs from `value`.
    NotEquals { field: String, value: String },
}

impl Filter {
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn not_equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::NotEquals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Filter::Equals { field, .. } | Filter::NotEquals { field, .. } => field,
        }
    }

    fn keeps(&self, value: &str) -> bool {
        let value = value.trim();
        match self {
            Filter::Equals { value: expected, .. } => value == expected,
            Filter::NotEquals { value: excluded, .. } => value != excluded,
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Equals { field, value } => write!(f, "{} = {}", field, value),
            Filter::NotEquals { field, value } => write!(f, "{} != {}", field, value),
        }
    }
}

/// Parses `FIELD=VALUE` or `FIELD!=VALUE`.
impl FromStr for Filter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, value, negated) = match s.split_once("!=") {
            Some((field, value)) => (field, value, true),
            None => match s.split_once('=') {
                Some((field, value)) => (field, value, false),
                None => {
                    return Err(format!(
                        "Filter '{}' must look like FIELD=VALUE or FIELD!=VALUE",
                        s
                    ))
                }
            },
        };

        let field = field.trim();
        if field.is_empty() {
            return Err(format!("Filter '{}' has no field name", s));
        }
        let value = value.trim();

        Ok(if negated {
            Filter::not_equals(field, value)
        } else {
            Filter::equals(field, value)
        })
    }
}

/// Declarative description of one aggregation run.
#[derive(Debug, Clone)]
pub struct AggregationSpec {
    pub group_by: Vec<KeyPart>,
    pub outcome_field: String,
    pub positive_value: String,
    pub filters: Vec<Filter>,
    /// Explicit key universe. Every key listed appears in the output, in
    /// this order, with zero counts when no record carries it.
    pub universe: Option<Vec<GroupKey>>,
}

impl AggregationSpec {
    /// Starts a spec grouped by `part`, counting `HadHeartAttack == Yes`.
    pub fn group_by(part: KeyPart) -> Self {
        Self {
            group_by: vec![part],
            outcome_field: "HadHeartAttack".to_string(),
            positive_value: "Yes".to_string(),
            filters: Vec::new(),
            universe: None,
        }
    }

    /// Adds another key component.
    pub fn then_by(mut self, part: KeyPart) -> Self {
        self.group_by.push(part);
        self
    }

    pub fn outcome(mut self, field: impl Into<String>, positive_value: impl Into<String>) -> Self {
        self.outcome_field = field.into();
        self.positive_value = positive_value.into();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn universe(mut self, keys: Vec<GroupKey>) -> Self {
        self.universe = Some(keys);
        self
    }

    /// Header names for the key components.
    pub fn key_fields(&self) -> Vec<String> {
        self.group_by.iter().map(|p| p.field.clone()).collect()
    }
}

/// Runs the aggregation against a loader handle.
///
/// An unavailable dataset yields an empty result rather than an error.
pub fn aggregate(handle: &DatasetHandle, spec: &AggregationSpec) -> RiskResult<Vec<AggregationRow>> {
    match handle.dataset() {
        Some(dataset) => aggregate_dataset(dataset, spec),
        None => {
            debug!("Dataset unavailable; aggregation by {:?} is empty", spec.key_fields());
            Ok(Vec::new())
        }
    }
}

/// Runs the aggregation against a loaded dataset.
///
/// Population and case counts are accumulated in one pass, so every cohort
/// with a population has a case count (possibly zero) and no separate join
/// is needed.
pub fn aggregate_dataset(dataset: &Dataset, spec: &AggregationSpec) -> RiskResult<Vec<AggregationRow>> {
    let key_columns = spec
        .group_by
        .iter()
        .map(|part| Ok((dataset.column_index(&part.field)?, part)))
        .collect::<RiskResult<Vec<_>>>()?;
    let outcome_column = dataset.column_index(&spec.outcome_field)?;
    let filters = spec
        .filters
        .iter()
        .map(|filter| Ok((dataset.column_index(filter.field())?, filter)))
        .collect::<RiskResult<Vec<_>>>()?;

    for (_, part) in &key_columns {
        if let Some(normalizer) = &part.normalizer {
            debug!("Normalizing {} by {}", part.field, normalizer.name());
        }
    }

    let mut counts: BTreeMap<GroupKey, (u64, u64)> = BTreeMap::new();

    for record in dataset.records() {
        let value = |index: usize| record.get(index).unwrap_or("");

        if !filters.iter().all(|(index, filter)| filter.keeps(value(*index))) {
            continue;
        }

        let key = GroupKey::new(
            key_columns
                .iter()
                .map(|(index, part)| match &part.normalizer {
                    Some(normalizer) => normalizer.normalize(value(*index)).into_owned(),
                    None => value(*index).to_string(),
                })
                .collect(),
        );

        let entry = counts.entry(key).or_insert((0, 0));
        entry.0 += 1;
        if value(outcome_column) == spec.positive_value {
            entry.1 += 1;
        }
    }

    let total_cases: u64 = counts.values().map(|(_, cases)| cases).sum();

    let mut ordered: Vec<(GroupKey, (u64, u64))> = Vec::with_capacity(counts.len());
    if let Some(universe) = &spec.universe {
        for key in universe {
            let tally = counts.remove(key).unwrap_or((0, 0));
            ordered.push((key.clone(), tally));
        }
    }
    // Observed keys outside any universe follow in lexical order.
    ordered.extend(counts);

    debug!(
        "Aggregated {} groups by {:?} ({} cases)",
        ordered.len(),
        spec.key_fields(),
        total_cases
    );

    Ok(ordered
        .into_iter()
        .map(|(key, (population, cases))| AggregationRow::new(key, population, cases, total_cases))
        .collect())
}

/// Largest number of decimal places an `f64` can meaningfully carry.
pub const MAX_DECIMALS: u32 = 15;

/// Rounds half away from zero to `decimals` places, capped at
/// [`MAX_DECIMALS`].
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals.min(MAX_DECIMALS) as i32);
    (value * factor).round() / factor
}

/// Decimal places used when materializing a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precision {
    pub ratio: u32,
    pub share: u32,
}

impl Default for Precision {
    fn default() -> Self {
        Self { ratio: 2, share: 2 }
    }
}

/// Materializes a series into rounded presentation rows.
///
/// `annotate` maps the first key component to an extra label (e.g. a
/// postal code).
pub fn present(
    series: &OrderedSeries,
    precision: Precision,
    annotate: Option<&Normalizer>,
) -> Vec<PresentedRow> {
    series
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| PresentedRow {
            labels: row.key.parts().to_vec(),
            annotation: annotate.and_then(|normalizer| {
                row.key
                    .component(0)
                    .map(|first| normalizer.normalize(first).into_owned())
            }),
            total_population: row.total_population,
            case_count: row.case_count,
            incidence_ratio: round_to(row.incidence_ratio, precision.ratio),
            global_case_share: round_to(row.global_case_share, precision.share),
            absolute_increase: series
                .first_difference
                .as_ref()
                .and_then(|diffs| diffs.get(i))
                .map(|d| round_to(*d, precision.share)),
            group_share: series
                .group_share
                .as_ref()
                .and_then(|shares| shares.get(i))
                .map(|s| round_to(*s, precision.share)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RiskError;
    use crate::models::{Metric, OrderPolicy};
    use crate::normalize::AGE_BUCKETS;
    use approx::assert_abs_diff_eq;
    use std::path::PathBuf;
    use std::sync::Arc;

    const COLUMNS: [&str; 4] = ["AgeCategory", "Sex", "SmokerStatus", "HadHeartAttack"];

    fn sample() -> Dataset {
        Dataset::from_rows(
            &COLUMNS,
            &[
                &["Age 18 to 24", "Male", "Never smoked", "No"],
                &["Age 18 to 24", "Female", "Never smoked", "Yes"],
                &["Age 50 to 54", "Male", "Current smoker - now smokes every day", "Yes"],
                &["Age 50 to 54", "Male", "Former smoker", "Yes"],
                &["Age 50 to 54", "Female", "Never smoked", "No"],
                &["Age 80 or older", "Female", "Former smoker", "Yes"],
                &["Age 80 or older", "Male", "Current smoker - now smokes some days", "No"],
            ],
        )
    }

    #[test]
    fn test_two_record_cohort() {
        let dataset = Dataset::from_rows(
            &["AgeCategory", "HadHeartAttack"],
            &[&["18-24", "Yes"], &["18-24", "No"]],
        );
        let spec = AggregationSpec::group_by(KeyPart::column("AgeCategory"));

        let rows = aggregate_dataset(&dataset, &spec).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, GroupKey::single("18-24"));
        assert_eq!(rows[0].total_population, 2);
        assert_eq!(rows[0].case_count, 1);
        assert_eq!(round_to(rows[0].incidence_ratio, 2), 50.00);
    }

    #[test]
    fn test_counts_are_conserved() {
        let dataset = sample();
        let spec = AggregationSpec::group_by(KeyPart::column("AgeCategory"))
            .then_by(KeyPart::column("Sex"));

        let rows = aggregate_dataset(&dataset, &spec).unwrap();

        let ungrouped_cases = dataset
            .records()
            .iter()
            .filter(|r| r.get(3) == Some("Yes"))
            .count() as u64;
        let grouped_cases: u64 = rows.iter().map(|r| r.case_count).sum();
        let grouped_population: u64 = rows.iter().map(|r| r.total_population).sum();

        assert_eq!(grouped_cases, ungrouped_cases);
        assert_eq!(grouped_population, dataset.len() as u64);

        for row in &rows {
            assert!(row.case_count <= row.total_population);
            assert!((0.0..=100.0).contains(&row.incidence_ratio));
            // Ratio implies the same case count.
            assert_abs_diff_eq!(
                row.incidence_ratio * row.total_population as f64 / 100.0,
                row.case_count as f64,
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn test_case_shares_sum_to_hundred() {
        let spec = AggregationSpec::group_by(KeyPart::column("SmokerStatus"));
        let rows = aggregate_dataset(&sample(), &spec).unwrap();

        let total: f64 = rows.iter().map(|r| r.global_case_share).sum();
        assert_abs_diff_eq!(total, 100.0, epsilon = 0.1);

        let rounded: f64 = rows.iter().map(|r| round_to(r.global_case_share, 2)).sum();
        assert_abs_diff_eq!(rounded, 100.0, epsilon = 0.1);
    }

    #[test]
    fn test_filter_parsing() {
        assert_eq!("Sex=Female".parse::<Filter>(), Ok(Filter::equals("Sex", "Female")));
        assert_eq!(
            " State != Guam ".parse::<Filter>(),
            Ok(Filter::not_equals("State", "Guam"))
        );
        assert_eq!(
            "CovidPos=Tested positive using home test".parse::<Filter>().map(|f| f.to_string()),
            Ok("CovidPos = Tested positive using home test".to_string())
        );
        assert!("Sex".parse::<Filter>().is_err());
        assert!("=Female".parse::<Filter>().is_err());
    }

    #[test]
    fn test_not_equals_filter_excludes_records() {
        let all = aggregate_dataset(&sample(), &AggregationSpec::group_by(KeyPart::column("Sex")))
            .unwrap();
        let spec = AggregationSpec::group_by(KeyPart::column("Sex"))
            .filter(Filter::not_equals("Sex", "Male"));
        let rows = aggregate_dataset(&sample(), &spec).unwrap();

        assert!(rows.iter().all(|r| r.key != GroupKey::single("Male")));
        let female = all.iter().find(|r| r.key == GroupKey::single("Female")).unwrap();
        assert_eq!(rows[0].total_population, female.total_population);
        assert_eq!(rows[0].global_case_share, 100.0);
    }

    #[test]
    fn test_filter_ignores_surrounding_whitespace() {
        let dataset = Dataset::from_rows(
            &["Sex", "HadHeartAttack"],
            &[&[" Female", "Yes"], &["Female ", "No"], &["Male", "Yes"]],
        );
        let spec = AggregationSpec::group_by(KeyPart::column("HadHeartAttack"))
            .filter("Sex=Female".parse::<Filter>().unwrap());

        let rows = aggregate_dataset(&dataset, &spec).unwrap();
        let population: u64 = rows.iter().map(|r| r.total_population).sum();
        assert_eq!(population, 2);

        let spec = AggregationSpec::group_by(KeyPart::column("HadHeartAttack"))
            .filter(Filter::not_equals("Sex", "Female"));
        let rows = aggregate_dataset(&dataset, &spec).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_population, 1);
    }

    #[test]
    fn test_universe_keeps_empty_groups_in_order() {
        let spec = AggregationSpec::group_by(KeyPart::normalized(
            "AgeCategory",
            Normalizer::age_buckets(),
        ))
        .filter(Filter::equals("Sex", "Female"))
        .universe(AGE_BUCKETS.iter().map(|b| GroupKey::single(*b)).collect());

        let rows = aggregate_dataset(&sample(), &spec).unwrap();
        let keys: Vec<String> = rows.iter().map(|r| r.key.to_string()).collect();

        assert_eq!(keys, AGE_BUCKETS);
        assert_eq!(rows[2].total_population, 0);
        assert_eq!(rows[2].incidence_ratio, 0.0);
        assert_eq!(rows[3].case_count, 1);
    }

    #[test]
    fn test_observed_keys_outside_universe_are_appended() {
        let spec = AggregationSpec::group_by(KeyPart::column("Sex"))
            .universe(vec![GroupKey::single("Female")]);

        let rows = aggregate_dataset(&sample(), &spec).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, GroupKey::single("Female"));
        assert_eq!(rows[1].key, GroupKey::single("Male"));
    }

    #[test]
    fn test_normalized_pair_key() {
        let spec = AggregationSpec::group_by(KeyPart::column("Sex"))
            .then_by(KeyPart::normalized("SmokerStatus", Normalizer::smoker_status()));

        let rows = aggregate_dataset(&sample(), &spec).unwrap();
        let current_male = rows
            .iter()
            .find(|r| r.key == GroupKey::pair("Male", "Current Smoker"))
            .unwrap();

        assert_eq!(current_male.total_population, 2);
        assert_eq!(current_male.case_count, 1);
        assert_eq!(current_male.incidence_ratio, 50.0);
    }

    #[test]
    fn test_unknown_group_field_is_schema_error() {
        let spec = AggregationSpec::group_by(KeyPart::column("BloodType"));
        let err = aggregate_dataset(&sample(), &spec).unwrap_err();
        assert_eq!(
            err,
            RiskError::Schema {
                field: "BloodType".to_string()
            }
        );

        let spec = AggregationSpec::group_by(KeyPart::column("Sex"))
            .filter(Filter::equals("Region", "West"));
        assert!(matches!(
            aggregate_dataset(&sample(), &spec),
            Err(RiskError::Schema { .. })
        ));
    }

    #[test]
    fn test_unavailable_dataset_is_empty() {
        let handle = DatasetHandle::Unavailable(RiskError::NotFound {
            path: PathBuf::from("missing.csv"),
        });
        let spec = AggregationSpec::group_by(KeyPart::column("AgeCategory"));

        assert_eq!(aggregate(&handle, &spec), Ok(Vec::new()));
    }

    #[test]
    fn test_aggregation_is_repeatable() {
        let handle = DatasetHandle::Available(Arc::new(sample()));
        let spec = AggregationSpec::group_by(KeyPart::column("AgeCategory"))
            .then_by(KeyPart::column("Sex"));

        let first = aggregate(&handle, &spec).unwrap();
        let second = aggregate(&handle, &spec).unwrap();

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.key, b.key);
            assert_eq!(a.incidence_ratio.to_bits(), b.incidence_ratio.to_bits());
            assert_eq!(a.global_case_share.to_bits(), b.global_case_share.to_bits());
        }
    }

    #[test]
    fn test_custom_outcome() {
        let spec = AggregationSpec::group_by(KeyPart::column("Sex")).outcome("HadHeartAttack", "No");
        let rows = aggregate_dataset(&sample(), &spec).unwrap();
        let cases: u64 = rows.iter().map(|r| r.case_count).sum();
        assert_eq!(cases, 3);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(10.355, 1), 10.4);
        assert_eq!(round_to(2.0 / 3.0 * 100.0, 2), 66.67);
        assert_eq!(round_to(-1.005, 0), -1.0);
    }

    #[test]
    fn test_round_to_caps_precision() {
        assert_eq!(round_to(0.0, 400), 0.0);
        assert_eq!(round_to(12.5, u32::MAX), 12.5);
        assert_eq!(round_to(1.0 / 3.0, 40), round_to(1.0 / 3.0, MAX_DECIMALS));
    }

    #[test]
    fn test_present_with_excessive_precision_stays_finite() {
        let series = OrderedSeries::new(
            OrderPolicy::Natural,
            vec![
                AggregationRow::new(GroupKey::single("Texas"), 3, 1, 1),
                AggregationRow::new(GroupKey::single("Guam"), 0, 0, 1),
            ],
        );

        let table = present(&series, Precision { ratio: 400, share: 400 }, None);

        for row in &table {
            assert!(row.incidence_ratio.is_finite());
            assert!(row.global_case_share.is_finite());
        }
        assert_eq!(table[1].incidence_ratio, 0.0);
        assert_abs_diff_eq!(table[0].incidence_ratio, 100.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_present_rounds_once() {
        let mut series = OrderedSeries::new(
            OrderPolicy::Natural,
            vec![
                AggregationRow::new(GroupKey::single("Texas"), 3, 1, 3),
                AggregationRow::new(GroupKey::single("Utah"), 3, 2, 3),
            ],
        );
        series.difference_metric = Some(Metric::GlobalCaseShare);
        series.first_difference = Some(vec![0.0, 33.333333]);

        let table = present(
            &series,
            Precision { ratio: 2, share: 1 },
            Some(&Normalizer::state_codes()),
        );

        assert_eq!(table[0].incidence_ratio, 33.33);
        assert_eq!(table[0].global_case_share, 33.3);
        assert_eq!(table[1].annotation.as_deref(), Some("UT"));
        assert_eq!(table[1].absolute_increase, Some(33.3));
    }
}
