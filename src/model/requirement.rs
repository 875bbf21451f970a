use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Cohort;

/// A training requirement users make progress on.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: String,
    /// How many units a member of the cohort must complete. Cohorts
    /// missing from this map are not expected to do this requirement.
    #[serde(default)]
    pub counts: BTreeMap<Cohort, u32>,
    /// Score given for each completed unit.
    #[serde(default)]
    pub unit_score: f32,
    /// Score given once the requirement is complete. When zero,
    /// units are scored individually through `unit_score`.
    #[serde(default)]
    pub total_score: f32,
}

impl Requirement {
    /// Score a member of `cohort` earns after completing `count` units.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn score(&self, cohort: &Cohort, count: u32) -> f32 {
        let Some(&target) = self.counts.get(cohort) else {
            return 0.0;
        };
        if target == 0 {
            return 0.0;
        }

        if count >= target && self.total_score > 0.0 {
            self.total_score
        } else {
            self.unit_score * count.min(target) as f32
        }
    }
}
