use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt::Display;

/// Cohorts known out of the box. Deployments may replace this list
/// through the `statistics.cohorts` configuration key.
pub const DEFAULT_COHORTS: &[&str] = &[
    "0-400",
    "400-600",
    "600-800",
    "800-1000",
    "1000-1200",
    "1200-1400",
    "1400-1600",
    "1600-1800",
    "1800-2000",
    "2000-2200",
    "2200-2400",
    "2400+",
];

/// A named peer group of users, usually a rating range such as `1200-1400`.
///
/// A cohort is also a valid newsfeed: fan-out writes one entry
/// addressed to the poster's cohort for every activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Cohort(String);

impl Cohort {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every cohort in [`DEFAULT_COHORTS`].
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        DEFAULT_COHORTS.iter().copied().map(Self::from).collect()
    }
}

impl Display for Cohort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Cohort {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Cohort {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Cohort {
    fn from(value: String) -> Self {
        Self(value)
    }
}
