use chrono::{DateTime, TimeZone, Utc};

use crate::model::{Cohort, Requirement, User};
use crate::store::MemoryStore;
use crate::util::{format_timestamp, FixedClock};

pub fn init() {
    crate::logging::init_for_tests();
}

/// The instant every test treats as "now".
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn clock() -> FixedClock {
    FixedClock(now())
}

/// Follower usernames, sorted the same way the store lists them.
pub fn follower_names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("follower{i:05}")).collect()
}

pub fn store_with_followers(poster: &str, n: usize) -> MemoryStore {
    let store = MemoryStore::new();
    for follower in follower_names(n) {
        store.add_follower(poster, &follower);
    }
    store
}

/// A rated user of `cohort` who was active just now.
pub fn user(username: &str, cohort: &str) -> User {
    User {
        username: username.to_string(),
        dojo_cohort: Cohort::new(cohort),
        rating_system: "USCF".to_string(),
        updated_at: format_timestamp(now()),
        ..Default::default()
    }
}

pub fn requirement(id: &str, cohort: &str, target: u32, unit_score: f32) -> Requirement {
    Requirement {
        id: id.to_string(),
        name: id.to_string(),
        counts: [(Cohort::new(cohort), target)].into_iter().collect(),
        unit_score,
        ..Default::default()
    }
}
