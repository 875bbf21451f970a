//! Delivering timeline activities into newsfeeds.
//!
//! Creating an activity writes one [`NewsfeedEntry`] to the newsfeed of
//! every follower of the poster plus one to the poster's cohort.
//! Deleting it removes every entry the activity generated. Both are
//! safe to run again after a failure: puts overwrite entries with the
//! same key and deleting a missing entry is not an error.
//!
//! [`NewsfeedEntry`]: crate::model::NewsfeedEntry
use crate::model::Cohort;
use crate::store::MAX_BATCH_SIZE;
use crate::util::{Clock, SystemClock};

mod create;
mod retract;
mod trigger;

pub use self::create::FanOutError;
pub use self::retract::RetractError;

/// An activity of a poster's timeline to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub poster: String,
    /// Id of the timeline entry.
    pub id: String,
    /// Cohort the poster belonged to when posting. Without it
    /// no cohort entry is written.
    pub cohort: Option<Cohort>,
}

impl Activity {
    #[must_use]
    pub fn new(poster: impl Into<String>, id: impl Into<String>, cohort: Option<Cohort>) -> Self {
        Self {
            poster: poster.into(),
            id: id.into(),
            cohort,
        }
    }
}

/// Fans activities out to newsfeeds and takes them back.
#[derive(Debug)]
pub struct FanOut<'a, S, C = SystemClock> {
    store: &'a S,
    clock: C,
    batch_size: usize,
}

impl<'a, S> FanOut<'a, S> {
    #[must_use]
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            clock: SystemClock,
            batch_size: MAX_BATCH_SIZE,
        }
    }
}

impl<'a, S, C: Clock> FanOut<'a, S, C> {
    /// Replaces the clock used to stamp new entries.
    #[must_use]
    pub fn with_clock<N: Clock>(self, clock: N) -> FanOut<'a, S, N> {
        FanOut {
            store: self.store,
            clock,
            batch_size: self.batch_size,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}
