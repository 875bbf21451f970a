use serde::Deserialize;
use std::collections::BTreeSet;
use std::num::NonZeroU64;
use std::time::Duration;
use validator::{Validate, ValidationError};

use crate::model::Cohort;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Statistics {
    /// Cohorts statistics are collected for. Users in any other
    /// cohort are left out.
    ///
    /// **Environment variables**:
    /// - `TIDINGS_STATISTICS_COHORTS`
    #[serde(default = "Cohort::defaults")]
    #[validate(
        length(min = 1, message = "at least one cohort is required"),
        custom(function = "check_cohorts")
    )]
    pub cohorts: Vec<Cohort>,
    /// Users updated within this many days are counted as active.
    ///
    /// **Environment variables**:
    /// - `TIDINGS_STATISTICS_ACTIVE_WINDOW_DAYS`
    #[serde(default = "Statistics::default_active_window_days")]
    #[validate(range(min = 1, message = "must be at least 1 day"))]
    pub active_window_days: u32,
    /// How often `tidings statistics --every` recomputes the snapshot.
    ///
    /// **Environment variables**:
    /// - `TIDINGS_STATISTICS_INTERVAL_SECS`
    #[serde(default = "Statistics::default_interval_secs")]
    pub interval_secs: NonZeroU64,
}

impl Statistics {
    const DEFAULT_ACTIVE_WINDOW_DAYS: u32 = 30;
    const DEFAULT_INTERVAL_SECS: u64 = 60 * 60;

    #[must_use]
    pub fn active_window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.active_window_days))
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.get())
    }

    const fn default_active_window_days() -> u32 {
        Self::DEFAULT_ACTIVE_WINDOW_DAYS
    }

    const fn default_interval_secs() -> NonZeroU64 {
        match NonZeroU64::new(Self::DEFAULT_INTERVAL_SECS) {
            Some(n) => n,
            None => panic!("DEFAULT_INTERVAL_SECS is accidentally set to 0"),
        }
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            cohorts: Cohort::defaults(),
            active_window_days: Self::DEFAULT_ACTIVE_WINDOW_DAYS,
            interval_secs: Self::default_interval_secs(),
        }
    }
}

fn check_cohorts(cohorts: &[Cohort]) -> Result<(), ValidationError> {
    let message = if cohorts.iter().any(Cohort::is_empty) {
        "cohort names cannot be empty"
    } else if cohorts.iter().collect::<BTreeSet<_>>().len() != cohorts.len() {
        "cohorts are listed more than once"
    } else {
        return Ok(());
    };

    let mut error = ValidationError::new("cohorts");
    error.message = Some(message.into());
    Err(error)
}
