use super::{Activity, FanOut};
use crate::model::{BatchResponse, ChangeBatch, ChangeRecord, EventName, ItemFailure};
use crate::store::{FollowerStore, NewsfeedStore};
use crate::util::Clock;

impl<S, C> FanOut<'_, S, C>
where
    S: NewsfeedStore + FollowerStore,
    C: Clock,
{
    /// Fans out every inserted activity of a change batch, one record
    /// at a time and in order.
    ///
    /// Records that failed are listed in the response by their sequence
    /// number so only those get delivered again. An insert without an
    /// owner or id counts as failed. Every other event is ignored.
    pub async fn handle_batch(&self, batch: &ChangeBatch) -> BatchResponse {
        let mut response = BatchResponse::default();

        for record in &batch.records {
            if record.event_name != EventName::Insert {
                continue;
            }

            let Some(activity) = activity_of(record) else {
                tracing::error!(
                    sequence_number = %record.sequence_number,
                    keys = ?record.keys,
                    "Inserted activity has no owner or id"
                );
                if !record.sequence_number.is_empty() {
                    response.batch_item_failures.push(ItemFailure {
                        item_identifier: record.sequence_number.clone(),
                    });
                }
                continue;
            };

            let tally = self.process_activity(&activity).await;
            let submitted = tally.succeeded;
            match tally.into_error() {
                None => tracing::debug!(
                    sequence_number = %record.sequence_number,
                    submitted,
                    "Submitted newsfeed entries"
                ),
                Some(report) => {
                    tracing::error!(
                        sequence_number = %record.sequence_number,
                        submitted,
                        "Failed to fan out activity: {report:?}"
                    );
                    response.batch_item_failures.push(ItemFailure {
                        item_identifier: record.sequence_number.clone(),
                    });
                }
            }
        }

        response
    }
}

fn activity_of(record: &ChangeRecord) -> Option<Activity> {
    let keys = &record.keys;
    keys.is_complete()
        .then(|| Activity::new(&keys.owner, &keys.id, record.cohort()))
}
