use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Cohort, Requirement};

/// The slice of a user's profile the statistics job reads.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub dojo_cohort: Cohort,
    /// Rating system the user chose (e.g. `USCF`). Empty if the
    /// user has not configured one yet.
    #[serde(default)]
    pub rating_system: String,
    #[serde(default)]
    pub ratings: BTreeMap<String, Rating>,
    /// Progress keyed by requirement id.
    #[serde(default)]
    pub progress: BTreeMap<String, RequirementProgress>,
    /// Last time the profile was updated (RFC 3339).
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub start_rating: i32,
    pub current_rating: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementProgress {
    pub requirement_id: String,
    #[serde(default)]
    pub counts: BTreeMap<Cohort, u32>,
    #[serde(default)]
    pub minutes_spent: BTreeMap<Cohort, u32>,
}

impl User {
    /// Rating gained (or lost) since joining, in the user's
    /// preferred rating system.
    #[must_use]
    pub fn rating_change(&self) -> i64 {
        self.ratings
            .get(&self.rating_system)
            .map_or(0, |r| i64::from(r.current_rating) - i64::from(r.start_rating))
    }

    /// Score earned in the user's current cohort.
    #[must_use]
    pub fn score(&self, requirements: &[Requirement]) -> f32 {
        requirements
            .iter()
            .map(|requirement| {
                let count = self
                    .progress
                    .get(&requirement.id)
                    .and_then(|p| p.counts.get(&self.dojo_cohort))
                    .copied()
                    .unwrap_or_default();
                requirement.score(&self.dojo_cohort, count)
            })
            .sum()
    }

    /// Minutes spent on requirements while in the current cohort.
    /// Time spent while in earlier cohorts is not counted.
    #[must_use]
    pub fn minutes_spent(&self) -> u64 {
        self.progress
            .values()
            .filter_map(|p| p.minutes_spent.get(&self.dojo_cohort))
            .map(|minutes| u64::from(*minutes))
            .sum()
    }
}
