use thiserror::Error;

use super::FanOut;
use crate::batch::{BatchWriter, Tally};
use crate::pagination::{EntriesOfActivity, Pager};
use crate::store::{NewsfeedStore, WriteRequest};

#[derive(Debug, Error)]
pub enum RetractError {
    #[error("Could not list newsfeed entries of the activity")]
    ListEntries,
    #[error("Could not delete newsfeed entries")]
    DeleteEntries,
}

impl<S: NewsfeedStore, C> FanOut<'_, S, C> {
    /// Deletes every newsfeed entry generated by one activity of `poster`.
    ///
    /// The tally counts the entries the store confirmed deleted. A batch
    /// is only counted once its write returns.
    #[tracing::instrument(skip(self), name = "fanout.retract")]
    pub async fn delete_entries_for(&self, poster: &str, activity_id: &str) -> Tally<RetractError> {
        let mut writer = BatchWriter::new(self.store)
            .with_batch_size(self.batch_size)
            .buffered();
        let mut entries = Pager::new(EntriesOfActivity::new(self.store, poster, activity_id));

        loop {
            let page = match entries.next_page().await {
                Ok(Some(page)) => page,
                Ok(None) => break,
                Err(report) => {
                    let report = report.change_context(RetractError::ListEntries);
                    return Tally::failed(writer.succeeded(), report);
                }
            };

            for entry in page {
                if let Err(report) = writer.push(WriteRequest::Delete(entry.key())).await {
                    let report = report.change_context(RetractError::DeleteEntries);
                    return Tally::failed(writer.succeeded(), report);
                }
            }
        }

        if let Err(report) = writer.flush().await {
            let report = report.change_context(RetractError::DeleteEntries);
            return Tally::failed(writer.succeeded(), report);
        }

        tracing::debug!(deleted = writer.succeeded(), "Retracted activity");
        Tally::ok(writer.succeeded())
    }
}
