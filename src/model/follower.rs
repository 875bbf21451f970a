use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One "follower follows poster" relationship.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FollowerEntry {
    /// The user being followed.
    pub poster: String,
    /// The user who follows the poster. Fan-out uses this as the
    /// newsfeed id of the generated entry.
    pub follower: String,
    pub created_at: String,
}
