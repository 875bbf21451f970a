use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::util::format_timestamp;

/// An entry in a newsfeed, generated from one timeline activity.
///
/// Entries are never mutated: they are created in bulk when an
/// activity is fanned out and deleted in bulk when it is retracted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct NewsfeedEntry {
    /// The newsfeed this entry is part of. Usually a follower's username,
    /// but it can be a cohort as well.
    pub newsfeed_id: String,
    /// Formatted as `<created_at>_<timeline_id>`.
    pub sort_key: String,
    /// When the entry was generated (RFC 3339, second precision).
    pub created_at: String,
    /// The user whose activity generated this entry.
    pub poster: String,
    /// The id of the activity in the poster's timeline.
    pub timeline_id: String,
}

impl NewsfeedEntry {
    #[must_use]
    pub fn new(
        newsfeed_id: impl Into<String>,
        stamp: &FeedStamp,
        poster: &str,
        timeline_id: &str,
    ) -> Self {
        Self {
            newsfeed_id: newsfeed_id.into(),
            sort_key: stamp.sort_key.clone(),
            created_at: stamp.created_at.clone(),
            poster: poster.to_string(),
            timeline_id: timeline_id.to_string(),
        }
    }

    #[must_use]
    pub fn key(&self) -> EntryKey {
        EntryKey {
            newsfeed_id: self.newsfeed_id.clone(),
            sort_key: self.sort_key.clone(),
        }
    }
}

/// Primary key of a [`NewsfeedEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryKey {
    pub newsfeed_id: String,
    pub sort_key: String,
}

impl EntryKey {
    #[must_use]
    pub fn new(newsfeed_id: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            newsfeed_id: newsfeed_id.into(),
            sort_key: sort_key.into(),
        }
    }
}

/// Creation time and sort key shared by every entry fanned out
/// from the same activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedStamp {
    created_at: String,
    sort_key: String,
}

impl FeedStamp {
    #[must_use]
    pub fn new(at: DateTime<Utc>, timeline_id: &str) -> Self {
        let created_at = format_timestamp(at);
        let sort_key = format!("{created_at}_{timeline_id}");
        Self {
            created_at,
            sort_key,
        }
    }

    #[must_use]
    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    #[must_use]
    pub fn sort_key(&self) -> &str {
        &self.sort_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn sort_key_is_derived_from_time_and_activity() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 15, 0).unwrap();
        let stamp = FeedStamp::new(at, "tl-42");
        assert_eq!(stamp.created_at(), "2024-03-01T08:15:00Z");
        assert_eq!(stamp.sort_key(), "2024-03-01T08:15:00Z_tl-42");

        let entry = NewsfeedEntry::new("bob", &stamp, "alice", "tl-42");
        assert_eq!(entry.key(), EntryKey::new("bob", "2024-03-01T08:15:00Z_tl-42"));
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({
                "newsfeedId": "bob",
                "sortKey": "2024-03-01T08:15:00Z_tl-42",
                "createdAt": "2024-03-01T08:15:00Z",
                "poster": "alice",
                "timelineId": "tl-42",
            })
        );
    }
}
