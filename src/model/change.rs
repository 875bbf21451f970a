use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Cohort;

/// A batch of change records delivered by the timeline's change stream.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeBatch {
    pub records: Vec<ChangeRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventName {
    Insert,
    Modify,
    Remove,
    /// Any event this crate does not know about.
    #[serde(other)]
    Unknown,
}

/// One changed timeline entry.
///
/// Everything but the event name may be missing, so one malformed record
/// does not spoil the whole batch.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub event_name: EventName,
    /// Position of the record in the stream. It is what gets reported
    /// back when the record has to be redelivered.
    #[serde(default)]
    pub sequence_number: String,
    #[serde(default)]
    pub keys: ActivityKeys,
    /// Attributes of the timeline entry after the change. Absent for removals.
    #[serde(default)]
    pub new_image: Option<Map<String, Value>>,
}

/// Primary key of a timeline entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ActivityKeys {
    /// The poster.
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub id: String,
}

impl ActivityKeys {
    /// Both the owner and the id are known.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.owner.is_empty() && !self.id.is_empty()
    }
}

impl ChangeRecord {
    /// Cohort the poster belonged to when the activity was written.
    #[must_use]
    pub fn cohort(&self) -> Option<Cohort> {
        self.new_image
            .as_ref()?
            .get("cohort")?
            .as_str()
            .filter(|s| !s.is_empty())
            .map(Cohort::from)
    }
}

/// Records the change stream has to deliver again.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub batch_item_failures: Vec<ItemFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFailure {
    pub item_identifier: String,
}
