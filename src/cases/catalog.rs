//! The ten study cases of the report.

use super::{Layout, StudyCase};
use crate::analysis::{AggregationSpec, KeyPart};
use crate::models::{Column, GroupKey, Metric};
use crate::normalize::{Normalizer, AGE_BRACKETS, AGE_BUCKETS};

const SEXES: [&str; 2] = ["Male", "Female"];

const COVID_ORDER: [&str; 3] = [
    "No",
    "Tested positive using home test without a health professional",
    "Yes",
];

const DIABETES_ORDER: [&str; 4] = [
    "Yes",
    "No, pre-diabetes or borderline diabetes",
    "Yes, but only during pregnancy (female)",
    "No",
];

fn keys(values: &[&str]) -> Vec<GroupKey> {
    values.iter().map(|v| GroupKey::single(*v)).collect()
}

/// All study cases in report order.
pub fn catalog() -> Vec<StudyCase> {
    vec![
        age(),
        sex_age(),
        sleep(),
        covid(),
        alcohol_smoking(),
        smoking_vaping(),
        regional(),
        physical_activity(),
        diabetes(),
        stroke(),
    ]
}

/// Looks a case up by number or slug.
pub fn find(selector: &str) -> Option<StudyCase> {
    catalog().into_iter().find(|case| case.matches(selector))
}

fn age() -> StudyCase {
    StudyCase::new(
        1,
        "age",
        "Heart-Attack Risk by Age",
        "Which age group shows the steepest rise in heart-attack risk?",
        AggregationSpec::group_by(KeyPart::column("AgeCategory")).universe(keys(&AGE_BRACKETS)),
    )
    .keys(&["Age Group"])
    .layout(Layout::Fixed {
        order: keys(&AGE_BRACKETS),
        difference: Some(Metric::GlobalCaseShare),
    })
    .columns(&[
        Column::Population,
        Column::Cases,
        Column::IncidenceRatio,
        Column::CaseShare,
        Column::AbsoluteIncrease,
    ])
}

fn sex_age() -> StudyCase {
    let universe = AGE_BUCKETS
        .iter()
        .flat_map(|bucket| SEXES.iter().map(move |sex| GroupKey::pair(*bucket, *sex)))
        .collect();

    StudyCase::new(
        2,
        "sex-age",
        "Heart-Attack Cases by Sex and Age Phase",
        "Is the share of heart-attack cases among women lower than among men in every age phase?",
        AggregationSpec::group_by(KeyPart::normalized("AgeCategory", Normalizer::age_buckets()))
            .then_by(KeyPart::column("Sex"))
            .universe(universe),
    )
    .keys(&["Age Phase", "Sex"])
    .layout(Layout::Split {
        component: 1,
        values: SEXES.iter().map(|s| s.to_string()).collect(),
        difference: Some(Metric::GlobalCaseShare),
        within: Some(0),
    })
    .columns(&[
        Column::Population,
        Column::Cases,
        Column::IncidenceRatio,
        Column::CaseShare,
        Column::GroupShare,
        Column::AbsoluteIncrease,
    ])
}

fn sleep() -> StudyCase {
    StudyCase::new(
        3,
        "sleep",
        "Sleep Duration and Heart-Attack Incidence",
        "How does nightly sleep duration relate to heart-attack incidence?",
        AggregationSpec::group_by(KeyPart::column("SleepHours")),
    )
    .keys(&["Sleep Hours"])
    .layout(Layout::Numeric)
}

fn covid() -> StudyCase {
    StudyCase::new(
        4,
        "covid",
        "COVID-19 History and Heart-Attack Risk",
        "Is a history of COVID-19 associated with more heart-attack cases?",
        AggregationSpec::group_by(KeyPart::column("CovidPos")),
    )
    .keys(&["COVID-19 History"])
    .layout(Layout::Fixed {
        order: keys(&COVID_ORDER),
        difference: None,
    })
    .columns(&[
        Column::Population,
        Column::Cases,
        Column::IncidenceRatio,
        Column::CaseShare,
    ])
    .compare(GroupKey::single("Yes"), GroupKey::single("No"))
}

fn alcohol_smoking() -> StudyCase {
    StudyCase::new(
        5,
        "alcohol-smoking",
        "Smoking, Alcohol and Heart-Attack Risk",
        "How do smoking and alcohol consumption interact in heart-attack incidence?",
        AggregationSpec::group_by(KeyPart::column("AlcoholDrinkers"))
            .then_by(KeyPart::normalized("SmokerStatus", Normalizer::smoker_status())),
    )
    .keys(&["Drinks Alcohol", "Smoking Status"])
    .layout(Layout::Ranked(Metric::IncidenceRatio))
    .compare(
        GroupKey::pair("Yes", "Current Smoker"),
        GroupKey::pair("No", "Never Smoked"),
    )
}

fn smoking_vaping() -> StudyCase {
    StudyCase::new(
        6,
        "smoking-vaping",
        "Traditional Smoking vs. E-Cigarette Use",
        "How does traditional smoking compare with e-cigarette use in heart-attack incidence?",
        AggregationSpec::group_by(KeyPart::column("SmokerStatus"))
            .then_by(KeyPart::column("ECigaretteUsage")),
    )
    .keys(&["Smoking Status", "E-Cigarette Use"])
    .layout(Layout::Ranked(Metric::IncidenceRatio))
}

fn regional() -> StudyCase {
    StudyCase::new(
        7,
        "regional",
        "Regional Heart-Attack Burden",
        "Which states carry the largest absolute heart-attack burden?",
        AggregationSpec::group_by(KeyPart::column("State")),
    )
    .keys(&["State"])
    .layout(Layout::TopN(Metric::CaseCount))
    .columns(&[Column::Annotation, Column::Cases, Column::CaseShare])
    .annotate(Normalizer::state_codes())
}

fn physical_activity() -> StudyCase {
    StudyCase::new(
        8,
        "physical-activity",
        "Physical Activity and Heart-Attack Incidence",
        "Is physical inactivity associated with a higher heart-attack incidence?",
        AggregationSpec::group_by(KeyPart::column("PhysicalActivities")),
    )
    .keys(&["Physically Active"])
    .layout(Layout::Fixed {
        order: keys(&["Yes", "No"]),
        difference: None,
    })
    .compare(GroupKey::single("No"), GroupKey::single("Yes"))
}

fn diabetes() -> StudyCase {
    StudyCase::new(
        9,
        "diabetes",
        "Diabetes and Heart-Attack Risk",
        "How much higher is heart-attack incidence among people with diabetes?",
        AggregationSpec::group_by(KeyPart::column("HadDiabetes")),
    )
    .keys(&["Diabetes Status"])
    .layout(Layout::Fixed {
        order: keys(&DIABETES_ORDER),
        difference: None,
    })
    .columns(&[
        Column::Cases,
        Column::CaseShare,
        Column::Population,
        Column::IncidenceRatio,
    ])
    .share_decimals(1)
    .compare(GroupKey::single("Yes"), GroupKey::single("No"))
}

fn stroke() -> StudyCase {
    StudyCase::new(
        10,
        "stroke",
        "Stroke History and Heart-Attack Risk",
        "Does a history of stroke come with a higher heart-attack incidence?",
        AggregationSpec::group_by(KeyPart::column("HadStroke")),
    )
    .keys(&["Stroke History"])
    .layout(Layout::Fixed {
        order: keys(&["No", "Yes"]),
        difference: None,
    })
    .columns(&[
        Column::Cases,
        Column::CaseShare,
        Column::Population,
        Column::IncidenceRatio,
    ])
    .share_decimals(1)
    .compare(GroupKey::single("Yes"), GroupKey::single("No"))
}
