mod change;
mod cohort;
mod follower;
mod newsfeed;
mod requirement;
mod statistics;
mod user;

pub use self::change::{ActivityKeys, BatchResponse, ChangeBatch, ChangeRecord, EventName, ItemFailure};
pub use self::cohort::{Cohort, DEFAULT_COHORTS};
pub use self::follower::FollowerEntry;
pub use self::newsfeed::{EntryKey, FeedStamp, NewsfeedEntry};
pub use self::requirement::Requirement;
pub use self::statistics::{CohortStatistics, ParticipantStats, UserStatistics};
pub use self::user::{Rating, RequirementProgress, User};
