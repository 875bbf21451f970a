use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Cohort, Requirement, User};

/// Running totals for one group of participants.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantStats {
    pub participants: u64,
    pub dojo_scores: f32,
    pub rating_changes: i64,
    /// Sum of each participant's rating change per hour of training.
    /// Participants without any recorded minutes do not contribute.
    pub rating_change_per_hour: f32,
    pub minutes_spent: u64,
    /// Participants per rating system.
    pub rating_systems: BTreeMap<String, u64>,
}

/// Statistics of a cohort, split by whether the participants
/// were recently active.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortStatistics {
    pub active: ParticipantStats,
    pub inactive: ParticipantStats,
}

impl CohortStatistics {
    pub fn bucket_mut(&mut self, active: bool) -> &mut ParticipantStats {
        if active {
            &mut self.active
        } else {
            &mut self.inactive
        }
    }

    #[must_use]
    pub fn participants(&self) -> u64 {
        self.active.participants + self.inactive.participants
    }
}

/// Snapshot of every cohort's statistics.
///
/// It is built from scratch on every aggregation run and replaces
/// the previously stored snapshot as a whole.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatistics {
    pub cohorts: BTreeMap<Cohort, CohortStatistics>,
}

impl UserStatistics {
    /// Creates a zeroed snapshot with one entry per cohort.
    #[must_use]
    pub fn new<'a>(cohorts: impl IntoIterator<Item = &'a Cohort>) -> Self {
        let cohorts = cohorts
            .into_iter()
            .map(|c| (c.clone(), CohortStatistics::default()))
            .collect();

        Self { cohorts }
    }

    #[must_use]
    pub fn cohort(&self, cohort: &str) -> Option<&CohortStatistics> {
        self.cohorts.get(cohort)
    }

    /// Adds the user to the statistics of their cohort.
    ///
    /// `active_since` is an RFC 3339 timestamp: users updated at or after
    /// it are counted as active. Users outside the known cohorts or without
    /// a rating system are skipped and `false` is returned.
    #[allow(clippy::cast_precision_loss)]
    pub fn record(&mut self, user: &User, requirements: &[Requirement], active_since: &str) -> bool {
        if user.rating_system.is_empty() {
            return false;
        }
        let Some(stats) = self.cohorts.get_mut(&user.dojo_cohort) else {
            return false;
        };

        let is_active = user.updated_at.as_str() >= active_since;
        let rating_change = user.rating_change();
        let score = user.score(requirements);
        let minutes = user.minutes_spent();

        let bucket = stats.bucket_mut(is_active);
        bucket.participants += 1;
        bucket.dojo_scores += score;
        bucket.rating_changes = bucket.rating_changes.saturating_add(rating_change);
        bucket.minutes_spent = bucket.minutes_spent.saturating_add(minutes);
        *bucket
            .rating_systems
            .entry(user.rating_system.clone())
            .or_default() += 1;

        if minutes > 0 {
            bucket.rating_change_per_hour += 60.0 * (rating_change as f32 / minutes as f32);
        }

        true
    }
}
