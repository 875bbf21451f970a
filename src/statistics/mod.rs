//! Per-cohort statistics of the whole user base.
//!
//! The aggregator reads every requirement and every user of the known
//! cohorts, folds them into a fresh [`UserStatistics`] snapshot and
//! replaces the stored one at the very end. A failed run leaves the
//! previous snapshot in place.
use error_stack::{Result, ResultExt};
use thiserror::Error;

use crate::model::{Cohort, UserStatistics};
use crate::pagination::{Pager, Requirements, UsersInCohort};
use crate::store::{RequirementStore, StatisticsStore, UserStore};
use crate::util::{format_timestamp, Clock, SystemClock};

mod job;

pub use self::job::{ScheduledEvent, StatisticsJob};

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("Could not scan requirements")]
    ScanRequirements,
    #[error("Could not list users of cohort {0}")]
    ListUsers(Cohort),
    #[error("Could not save statistics")]
    SaveStatistics,
}

#[derive(Debug)]
pub struct Aggregator<'a, S, C = SystemClock> {
    store: &'a S,
    clock: C,
    cohorts: Vec<Cohort>,
    active_window: chrono::Duration,
}

impl<'a, S> Aggregator<'a, S> {
    pub const DEFAULT_ACTIVE_WINDOW_DAYS: i64 = 30;

    #[must_use]
    pub fn new(store: &'a S, cohorts: Vec<Cohort>) -> Self {
        Self {
            store,
            clock: SystemClock,
            cohorts,
            active_window: chrono::Duration::days(Self::DEFAULT_ACTIVE_WINDOW_DAYS),
        }
    }
}

impl<'a, S, C> Aggregator<'a, S, C>
where
    S: UserStore + RequirementStore + StatisticsStore,
    C: Clock,
{
    #[must_use]
    pub fn with_clock<N: Clock>(self, clock: N) -> Aggregator<'a, S, N> {
        Aggregator {
            store: self.store,
            clock,
            cohorts: self.cohorts,
            active_window: self.active_window,
        }
    }

    /// Users updated within `window` of the run are counted as active.
    #[must_use]
    pub fn with_active_window(mut self, window: chrono::Duration) -> Self {
        self.active_window = window;
        self
    }

    /// Computes the statistics of every known cohort and stores them.
    #[tracing::instrument(skip_all, name = "statistics.aggregate")]
    pub async fn run(&self) -> Result<UserStatistics, AggregateError> {
        let requirements = Pager::new(Requirements::new(self.store))
            .collect_all()
            .await
            .change_context(AggregateError::ScanRequirements)?;

        tracing::debug!(requirements = requirements.len(), "Scanned requirements");

        let active_since = format_timestamp(self.clock.now() - self.active_window);
        let mut stats = UserStatistics::new(&self.cohorts);
        let mut counted = 0;
        let mut skipped = 0;

        for cohort in &self.cohorts {
            let mut users = Pager::new(UsersInCohort::new(self.store, cohort));
            while let Some(page) = users
                .next_page()
                .await
                .change_context_lazy(|| AggregateError::ListUsers(cohort.clone()))?
            {
                for user in page {
                    if stats.record(&user, &requirements, &active_since) {
                        counted += 1;
                    } else {
                        skipped += 1;
                    }
                }
            }
        }

        self.store
            .set_statistics(&stats)
            .await
            .change_context(AggregateError::SaveStatistics)?;

        tracing::info!(counted, skipped, "Updated user statistics");
        Ok(stats)
    }
}
