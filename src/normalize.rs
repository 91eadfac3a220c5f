//! Category normalization.
//!
//! Maps fine-grained categorical values onto a smaller set of canonical
//! labels using an ordered list of rules. The first matching rule wins;
//! values no rule matches pass through unchanged.

use std::borrow::Cow;
use std::fmt;

/// Age brackets as they appear in the source table, youngest first.
pub const AGE_BRACKETS: [&str; 13] = [
    "Age 18 to 24",
    "Age 25 to 29",
    "Age 30 to 34",
    "Age 35 to 39",
    "Age 40 to 44",
    "Age 45 to 49",
    "Age 50 to 54",
    "Age 55 to 59",
    "Age 60 to 64",
    "Age 65 to 69",
    "Age 70 to 74",
    "Age 75 to 79",
    "Age 80 or older",
];

/// Coarse age buckets, youngest first.
pub const AGE_BUCKETS: [&str; 4] = ["Under 45", "45 to 64", "65 to 79", "80 or older"];

/// Coarse smoking statuses in the order they are checked.
pub const SMOKER_BUCKETS: [&str; 3] = ["Current Smoker", "Former Smoker", "Never Smoked"];

/// Test applied to a raw value.
#[derive(Clone)]
pub enum Matcher {
    /// Value equals the string exactly.
    Exact(String),
    /// Value contains the substring.
    Contains(String),
    /// Arbitrary predicate over the value.
    Predicate(fn(&str) -> bool),
}

impl Matcher {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Matcher::Exact(expected) => value == expected,
            Matcher::Contains(needle) => value.contains(needle.as_str()),
            Matcher::Predicate(predicate) => predicate(value),
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Exact(s) => write!(f, "Exact({:?})", s),
            Matcher::Contains(s) => write!(f, "Contains({:?})", s),
            Matcher::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

/// Ordered mapping from matchers to canonical labels.
#[derive(Debug, Clone)]
pub struct Normalizer {
    name: &'static str,
    rules: Vec<(Matcher, String)>,
}

impl Normalizer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            rules: Vec::new(),
        }
    }

    /// Appends a rule; rules are evaluated in insertion order.
    pub fn rule(mut self, matcher: Matcher, label: impl Into<String>) -> Self {
        self.rules.push((matcher, label.into()));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Maps `raw` to its canonical label, or returns it unchanged.
    pub fn normalize<'a>(&'a self, raw: &'a str) -> Cow<'a, str> {
        self.rules
            .iter()
            .find(|(matcher, _)| matcher.matches(raw))
            .map(|(_, label)| Cow::Borrowed(label.as_str()))
            .unwrap_or(Cow::Borrowed(raw))
    }

    /// Coarsens the 13 age brackets into four buckets by range membership.
    pub fn age_buckets() -> Self {
        Self::new("age bucket")
            .rule(Matcher::Predicate(|v| lower_age_in(v, 18, 44)), AGE_BUCKETS[0])
            .rule(Matcher::Predicate(|v| lower_age_in(v, 45, 64)), AGE_BUCKETS[1])
            .rule(Matcher::Predicate(|v| lower_age_in(v, 65, 79)), AGE_BUCKETS[2])
            .rule(Matcher::Predicate(|v| lower_age_in(v, 80, u32::MAX)), AGE_BUCKETS[3])
    }

    /// Coarsens detailed smoking statuses. "Current" is checked before
    /// "Former", which is checked before "Never".
    pub fn smoker_status() -> Self {
        Self::new("smoker status")
            .rule(Matcher::Contains("Current".to_string()), SMOKER_BUCKETS[0])
            .rule(Matcher::Contains("Former".to_string()), SMOKER_BUCKETS[1])
            .rule(Matcher::Contains("Never".to_string()), SMOKER_BUCKETS[2])
    }

    /// Maps US state and territory names to their postal codes.
    pub fn state_codes() -> Self {
        STATE_CODES
            .iter()
            .fold(Self::new("state code"), |normalizer, (state, code)| {
                normalizer.rule(Matcher::Exact(state.to_string()), *code)
            })
    }
}

/// Lower bound of an age bracket such as `Age 45 to 49` or `Age 80 or older`.
pub fn bracket_lower_bound(bracket: &str) -> Option<u32> {
    bracket
        .strip_prefix("Age ")?
        .split_whitespace()
        .next()?
        .parse()
        .ok()
}

fn lower_age_in(bracket: &str, min: u32, max: u32) -> bool {
    bracket_lower_bound(bracket).is_some_and(|age| (min..=max).contains(&age))
}

const STATE_CODES: [(&str, &str); 54] = [
    ("Alabama", "AL"),
    ("Alaska", "AK"),
    ("Arizona", "AZ"),
    ("Arkansas", "AR"),
    ("California", "CA"),
    ("Colorado", "CO"),
    ("Connecticut", "CT"),
    ("Delaware", "DE"),
    ("Florida", "FL"),
    ("Georgia", "GA"),
    ("Hawaii", "HI"),
    ("Idaho", "ID"),
    ("Illinois", "IL"),
    ("Indiana", "IN"),
    ("Iowa", "IA"),
    ("Kansas", "KS"),
    ("Kentucky", "KY"),
    ("Louisiana", "LA"),
    ("Maine", "ME"),
    ("Maryland", "MD"),
    ("Massachusetts", "MA"),
    ("Michigan", "MI"),
    ("Minnesota", "MN"),
    ("Mississippi", "MS"),
    ("Missouri", "MO"),
    ("Montana", "MT"),
    ("Nebraska", "NE"),
    ("Nevada", "NV"),
    ("New Hampshire", "NH"),
    ("New Jersey", "NJ"),
    ("New Mexico", "NM"),
    ("New York", "NY"),
    ("North Carolina", "NC"),
    ("North Dakota", "ND"),
    ("Ohio", "OH"),
    ("Oklahoma", "OK"),
    ("Oregon", "OR"),
    ("Pennsylvania", "PA"),
    ("Rhode Island", "RI"),
    ("South Carolina", "SC"),
    ("South Dakota", "SD"),
    ("Tennessee", "TN"),
    ("Texas", "TX"),
    ("Utah", "UT"),
    ("Vermont", "VT"),
    ("Virginia", "VA"),
    ("Washington", "WA"),
    ("West Virginia", "WV"),
    ("Wisconsin", "WI"),
    ("Wyoming", "WY"),
    ("District of Columbia", "DC"),
    ("Puerto Rico", "PR"),
    ("Guam", "GU"),
    ("Virgin Islands", "VI"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_buckets_cover_all_brackets() {
        let normalizer = Normalizer::age_buckets();
        let buckets: Vec<_> = AGE_BRACKETS
            .iter()
            .map(|b| normalizer.normalize(b).into_owned())
            .collect();

        assert_eq!(buckets[0], "Under 45");
        assert_eq!(buckets[4], "Under 45");
        assert_eq!(buckets[5], "45 to 64");
        assert_eq!(buckets[8], "45 to 64");
        assert_eq!(buckets[9], "65 to 79");
        assert_eq!(buckets[11], "65 to 79");
        assert_eq!(buckets[12], "80 or older");
    }

    #[test]
    fn test_smoker_status_priority() {
        let normalizer = Normalizer::smoker_status();
        assert_eq!(
            normalizer.normalize("Current smoker - now smokes every day"),
            "Current Smoker"
        );
        assert_eq!(normalizer.normalize("Former smoker"), "Former Smoker");
        assert_eq!(normalizer.normalize("Never smoked"), "Never Smoked");
        // Both substrings present: the earlier rule wins.
        assert_eq!(
            normalizer.normalize("Former Current mixed"),
            "Current Smoker"
        );
    }

    #[test]
    fn test_unmapped_value_passes_through() {
        assert_eq!(Normalizer::smoker_status().normalize("Unknown"), "Unknown");
        assert_eq!(Normalizer::age_buckets().normalize("Age unknown"), "Age unknown");
        assert_eq!(Normalizer::state_codes().normalize("Atlantis"), "Atlantis");
    }

    #[test]
    fn test_state_codes() {
        let normalizer = Normalizer::state_codes();
        assert_eq!(normalizer.normalize("New York"), "NY");
        assert_eq!(normalizer.normalize("District of Columbia"), "DC");
        assert_eq!(normalizer.normalize("Virgin Islands"), "VI");
    }

    #[test]
    fn test_bracket_lower_bound() {
        assert_eq!(bracket_lower_bound("Age 45 to 49"), Some(45));
        assert_eq!(bracket_lower_bound("Age 80 or older"), Some(80));
        assert_eq!(bracket_lower_bound("45 to 49"), None);
    }
}
