//! Ordering and derived metrics over aggregation rows.
//!
//! Every function here is a pure transform; none of them touch the dataset.

use crate::error::{RiskError, RiskResult};
use crate::models::{percentage, AggregationRow, GroupKey, Metric, OrderPolicy, OrderedSeries};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Label of the synthetic row produced by [`top_n_fold`].
pub const OTHER_LABEL: &str = "Other";

/// Reorders rows to follow `canonical_order`.
///
/// Canonical keys without a row are skipped. Rows whose key is not in the
/// order are appended after the ordered rows, keeping their input order.
pub fn fixed_order(rows: &[AggregationRow], canonical_order: &[GroupKey]) -> OrderedSeries {
    let position = |key: &GroupKey| canonical_order.iter().position(|k| k == key);

    let mut ordered: Vec<(usize, &AggregationRow)> = rows
        .iter()
        .filter_map(|row| position(&row.key).map(|p| (p, row)))
        .collect();
    ordered.sort_by_key(|(p, _)| *p);

    let rest = rows.iter().filter(|row| position(&row.key).is_none());

    OrderedSeries::new(
        OrderPolicy::Fixed(canonical_order.to_vec()),
        ordered
            .into_iter()
            .map(|(_, row)| row)
            .chain(rest)
            .cloned()
            .collect(),
    )
}

/// Sorts rows descending by `metric`, breaking ties by group key.
pub fn descending_rank(rows: &[AggregationRow], metric: Metric) -> OrderedSeries {
    let mut sorted = rows.to_vec();
    sorted.sort_by(|a, b| {
        b.metric(metric)
            .partial_cmp(&a.metric(metric))
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.key.cmp(&b.key))
    });
    OrderedSeries::new(OrderPolicy::Descending(metric), sorted)
}

/// Sorts rows ascending by the numeric value of the first key component.
///
/// Keys that are not numbers sort after all numeric keys, lexically.
pub fn numeric_order(rows: &[AggregationRow]) -> OrderedSeries {
    let numeric = |row: &AggregationRow| {
        row.key
            .component(0)
            .and_then(|v| v.trim().parse::<f64>().ok())
    };

    let mut sorted = rows.to_vec();
    sorted.sort_by(|a, b| match (numeric(a), numeric(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.key.cmp(&b.key),
    });
    OrderedSeries::new(OrderPolicy::NumericAscending, sorted)
}

/// `diff[i] = metric[i] - metric[i - 1]`, with `diff[0] = 0`.
pub fn first_difference(rows: &[AggregationRow], metric: Metric) -> Vec<f64> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| match i {
            0 => 0.0,
            _ => row.metric(metric) - rows[i - 1].metric(metric),
        })
        .collect()
}

impl OrderedSeries {
    /// Attaches the first difference of `metric` in the current order.
    pub fn with_first_difference(mut self, metric: Metric) -> Self {
        self.first_difference = Some(first_difference(&self.rows, metric));
        self.difference_metric = Some(metric);
        self
    }
}

/// Each row's case count as a percentage of the cases of every row sharing
/// key component `component`, aligned with `rows`.
///
/// A group without cases gives 0 for each of its rows.
pub fn share_within(rows: &[AggregationRow], component: usize) -> Vec<f64> {
    let mut group_cases: BTreeMap<Option<&str>, u64> = BTreeMap::new();
    for row in rows {
        *group_cases.entry(row.key.component(component)).or_insert(0) += row.case_count;
    }

    rows.iter()
        .map(|row| {
            let whole = group_cases
                .get(&row.key.component(component))
                .copied()
                .unwrap_or(0);
            percentage(row.case_count, whole)
        })
        .collect()
}

/// Keeps the top `n` rows by `metric` and folds the rest into one
/// [`OTHER_LABEL`] row.
///
/// The folded row sums population, cases and case share; its incidence
/// ratio is recomputed from the summed counts. With `n` or fewer rows no
/// folding happens.
pub fn top_n_fold(rows: &[AggregationRow], n: usize, metric: Metric) -> OrderedSeries {
    let mut ranked = descending_rank(rows, metric);
    if ranked.rows.len() <= n {
        return ranked;
    }

    let folded = ranked.rows.split_off(n);
    let population: u64 = folded.iter().map(|r| r.total_population).sum();
    let cases: u64 = folded.iter().map(|r| r.case_count).sum();
    let share: f64 = folded.iter().map(|r| r.global_case_share).sum();

    ranked.rows.push(AggregationRow {
        key: GroupKey::single(OTHER_LABEL),
        total_population: population,
        case_count: cases,
        incidence_ratio: percentage(cases, population),
        global_case_share: share,
    });
    ranked
}

/// `metric[numerator] / metric[denominator]`.
///
/// Fails when either key is missing or the denominator's metric is zero.
pub fn cross_group_ratio(
    rows: &[AggregationRow],
    numerator: &GroupKey,
    denominator: &GroupKey,
    metric: Metric,
) -> RiskResult<f64> {
    let find = |key: &GroupKey| {
        rows.iter()
            .find(|row| &row.key == key)
            .ok_or_else(|| RiskError::KeyNotFound {
                key: key.to_string(),
            })
    };

    let top = find(numerator)?.metric(metric);
    let bottom = find(denominator)?.metric(metric);

    if bottom == 0.0 {
        return Err(RiskError::DivisionByZero {
            key: denominator.to_string(),
            metric: metric.to_string(),
        });
    }

    Ok(top / bottom)
}
