use error_stack::{Context, Report};
use std::mem;
use thiserror::Error;

use crate::model::{EntryKey, NewsfeedEntry};
use crate::store::{NewsfeedStore, WriteRequest, MAX_BATCH_SIZE};

#[derive(Debug, Error)]
#[error("Could not write batch of newsfeed entries")]
pub struct WriteBatchError;

/// How far a multi-step write got.
#[must_use]
#[derive(Debug)]
pub struct Tally<C> {
    /// Items known to be committed. Never more than what the store
    /// actually holds, but possibly fewer.
    pub succeeded: usize,
    pub outcome: Outcome<C>,
}

#[derive(Debug)]
pub enum Outcome<C> {
    Ok,
    /// Failed before anything was committed.
    TransientFailure(Report<C>),
    /// Failed after `at` items were committed.
    PartialFailure { at: usize, report: Report<C> },
}

impl<C: Context> Tally<C> {
    pub fn ok(succeeded: usize) -> Self {
        Self {
            succeeded,
            outcome: Outcome::Ok,
        }
    }

    pub fn failed(succeeded: usize, report: Report<C>) -> Self {
        let outcome = if succeeded == 0 {
            Outcome::TransientFailure(report)
        } else {
            Outcome::PartialFailure {
                at: succeeded,
                report,
            }
        };
        Self { succeeded, outcome }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, Outcome::Ok)
    }

    #[must_use]
    pub fn error(&self) -> Option<&Report<C>> {
        match &self.outcome {
            Outcome::Ok => None,
            Outcome::TransientFailure(report) | Outcome::PartialFailure { report, .. } => {
                Some(report)
            }
        }
    }

    #[must_use]
    pub fn into_error(self) -> Option<Report<C>> {
        match self.outcome {
            Outcome::Ok => None,
            Outcome::TransientFailure(report) | Outcome::PartialFailure { report, .. } => {
                Some(report)
            }
        }
    }

    /// Converts into a plain result. The committed count of a
    /// partial failure is kept as an attachment of the report.
    pub fn into_result(self) -> error_stack::Result<usize, C> {
        match self.outcome {
            Outcome::Ok => Ok(self.succeeded),
            Outcome::TransientFailure(report) => Err(report),
            Outcome::PartialFailure { at, report } => Err(report.attach_printable(format!(
                "{at} items were committed before the failure"
            ))),
        }
    }
}

/// Splits writes into batches the store accepts and applies them
/// one after another.
#[derive(Debug)]
pub struct BatchWriter<'a, S> {
    store: &'a S,
    batch_size: usize,
}

impl<'a, S: NewsfeedStore> BatchWriter<'a, S> {
    #[must_use]
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            batch_size: MAX_BATCH_SIZE,
        }
    }

    /// Sets the size of each batch. It is kept within `1..=MAX_BATCH_SIZE`.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Writes every request, one batch at a time and in order.
    ///
    /// Stops at the first batch the store rejects. The returned count only
    /// covers the batches before it; nothing is retried here.
    #[tracing::instrument(skip_all, name = "batch.write", fields(requests = requests.len()))]
    pub async fn write(&self, mut requests: Vec<WriteRequest>) -> Tally<WriteBatchError> {
        let mut succeeded = 0;
        let mut batch_index = 0;

        while !requests.is_empty() {
            let batch: Vec<_> = requests
                .drain(..requests.len().min(self.batch_size))
                .collect();

            let len = batch.len();
            if let Err(report) = self.store.batch_write(batch).await {
                tracing::warn!(batch = batch_index, succeeded, "Batch write failed");
                let report = report
                    .change_context(WriteBatchError)
                    .attach_printable(format!("batch #{batch_index} of {len} requests was rejected"));

                return Tally::failed(succeeded, report);
            }

            succeeded += len;
            batch_index += 1;
        }

        Tally::ok(succeeded)
    }

    pub async fn put_entries(&self, entries: Vec<NewsfeedEntry>) -> Tally<WriteBatchError> {
        self.write(entries.into_iter().map(WriteRequest::Put).collect())
            .await
    }

    pub async fn delete_entries(&self, keys: Vec<EntryKey>) -> Tally<WriteBatchError> {
        self.write(keys.into_iter().map(WriteRequest::Delete).collect())
            .await
    }

    /// Wraps this writer with a buffer that is flushed every time it
    /// holds a full batch.
    #[must_use]
    pub fn buffered(self) -> BufferedWriter<'a, S> {
        BufferedWriter {
            buffer: Vec::with_capacity(self.batch_size),
            writer: self,
            succeeded: 0,
        }
    }
}

/// Accumulates write requests and writes them as soon as a full
/// batch is available.
#[derive(Debug)]
pub struct BufferedWriter<'a, S> {
    writer: BatchWriter<'a, S>,
    buffer: Vec<WriteRequest>,
    succeeded: usize,
}

impl<S: NewsfeedStore> BufferedWriter<'_, S> {
    /// Adds a request, writing the buffer out if it becomes full.
    pub async fn push(&mut self, request: WriteRequest) -> Result<(), Report<WriteBatchError>> {
        self.buffer.push(request);
        if self.buffer.len() >= self.writer.batch_size() {
            self.flush().await?;
        }
        Ok(())
    }

    /// Writes whatever is buffered, even if it is less than a batch.
    pub async fn flush(&mut self) -> Result<(), Report<WriteBatchError>> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let requests = mem::replace(
            &mut self.buffer,
            Vec::with_capacity(self.writer.batch_size()),
        );

        let tally = self.writer.write(requests).await;
        self.succeeded += tally.succeeded;
        tally.into_error().map_or(Ok(()), Err)
    }

    /// Requests committed so far.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    /// Requests waiting for the next flush.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FeedStamp;
    use crate::store::MemoryStore;
    use crate::test_utils;

    fn entries(n: usize) -> Vec<NewsfeedEntry> {
        let stamp = FeedStamp::new(test_utils::now(), "tl-1");
        (0..n)
            .map(|i| NewsfeedEntry::new(format!("user{i:04}"), &stamp, "alice", "tl-1"))
            .collect()
    }

    #[tokio::test]
    async fn should_split_into_batches_of_at_most_25() {
        for (n, expected) in [
            (0, vec![]),
            (24, vec![24]),
            (25, vec![25]),
            (26, vec![25, 1]),
            (60, vec![25, 25, 10]),
        ] {
            let store = MemoryStore::new();
            let tally = BatchWriter::new(&store).put_entries(entries(n)).await;

            assert!(tally.is_ok());
            assert_eq!(tally.succeeded, n);
            assert_eq!(store.batch_sizes(), expected, "writing {n} entries");
            assert_eq!(store.entries().len(), n);
        }
    }

    #[tokio::test]
    async fn should_stop_at_first_failed_batch() {
        for k in 0..4 {
            let store = MemoryStore::new();
            store.fail_batch_write_at(k);

            let tally = BatchWriter::new(&store).put_entries(entries(90)).await;
            assert_eq!(tally.succeeded, 25 * k);
            assert_eq!(store.entries().len(), 25 * k);

            match tally.outcome {
                Outcome::TransientFailure(..) => assert_eq!(k, 0),
                Outcome::PartialFailure { at, .. } => assert_eq!(at, 25 * k),
                Outcome::Ok => panic!("batch #{k} should have failed"),
            }
        }
    }

    #[tokio::test]
    async fn should_honor_smaller_batch_size() {
        let store = MemoryStore::new();
        let writer = BatchWriter::new(&store).with_batch_size(10);
        let tally = writer.put_entries(entries(25)).await;

        assert_eq!(tally.succeeded, 25);
        assert_eq!(store.batch_sizes(), vec![10, 10, 5]);
        assert_eq!(BatchWriter::new(&store).with_batch_size(100).batch_size(), 25);
    }

    #[tokio::test]
    async fn deletes_by_key() {
        let store = MemoryStore::new();
        let written = entries(30);
        let keys = written.iter().map(NewsfeedEntry::key).collect();
        let writer = BatchWriter::new(&store);

        assert!(writer.put_entries(written).await.is_ok());
        let tally = writer.delete_entries(keys).await;
        assert_eq!(tally.succeeded, 30);
        assert!(store.entries().is_empty());
    }

    #[tokio::test]
    async fn buffered_writer_flushes_full_batches_only() {
        let store = MemoryStore::new();
        let mut buffered = BatchWriter::new(&store).buffered();

        for entry in entries(26) {
            buffered.push(WriteRequest::Put(entry)).await.unwrap();
        }
        assert_eq!(buffered.succeeded(), 25);
        assert_eq!(buffered.pending(), 1);

        buffered.flush().await.unwrap();
        assert_eq!(buffered.succeeded(), 26);
        assert_eq!(store.batch_sizes(), vec![25, 1]);

        // nothing left to write
        buffered.flush().await.unwrap();
        assert_eq!(store.batch_sizes().len(), 2);
    }

    #[tokio::test]
    async fn into_result_keeps_committed_count() {
        let store = MemoryStore::new();
        store.fail_batch_write_at(1);

        let error = BatchWriter::new(&store)
            .put_entries(entries(30))
            .await
            .into_result()
            .unwrap_err();

        let message = format!("{error:?}");
        assert!(message.contains("25 items were committed before the failure"));
    }
}
