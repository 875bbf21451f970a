use error_stack::Report;
use thiserror::Error;

use super::{Activity, FanOut};
use crate::batch::{BatchWriter, Tally};
use crate::model::{FeedStamp, NewsfeedEntry};
use crate::pagination::{FollowersOf, Pager};
use crate::store::{FollowerStore, NewsfeedStore, WriteRequest};
use crate::util::Clock;

#[derive(Debug, Error)]
pub enum FanOutError {
    #[error("Could not list followers of the poster")]
    ListFollowers,
    #[error("Could not write newsfeed entries")]
    WriteEntries,
    #[error("Only {succeeded} of {attempted} newsfeed entries were written")]
    Reconciliation { succeeded: usize, attempted: usize },
}

impl<S, C> FanOut<'_, S, C>
where
    S: NewsfeedStore + FollowerStore,
    C: Clock,
{
    /// Writes an entry for the activity into the newsfeed of every
    /// follower of the poster, then one into the poster's cohort.
    ///
    /// Entries are stamped with the current time, not the time the
    /// activity was posted. On failure the tally tells how many entries
    /// made it; running this again for the same activity overwrites them.
    #[tracing::instrument(
        skip_all,
        name = "fanout.create",
        fields(poster = %activity.poster, activity = %activity.id)
    )]
    pub async fn process_activity(&self, activity: &Activity) -> Tally<FanOutError> {
        let stamp = FeedStamp::new(self.clock.now(), &activity.id);
        let mut writer = BatchWriter::new(self.store)
            .with_batch_size(self.batch_size)
            .buffered();

        let mut followers = Pager::new(FollowersOf::new(self.store, &activity.poster));
        let mut attempted = 0;

        loop {
            let page = match followers.next_page().await {
                Ok(Some(page)) => page,
                Ok(None) => break,
                Err(report) => {
                    let report = report
                        .change_context(FanOutError::ListFollowers)
                        .attach_printable(format!("failed on page #{}", followers.pages()));
                    return Tally::failed(writer.succeeded(), report);
                }
            };

            attempted += page.len();
            for follower in page {
                let entry =
                    NewsfeedEntry::new(follower.follower, &stamp, &activity.poster, &activity.id);

                if let Err(report) = writer.push(WriteRequest::Put(entry)).await {
                    let report = report.change_context(FanOutError::WriteEntries);
                    return Tally::failed(writer.succeeded(), report);
                }
            }
        }

        if let Some(cohort) = &activity.cohort {
            let entry = NewsfeedEntry::new(cohort.as_str(), &stamp, &activity.poster, &activity.id);
            if let Err(report) = writer.push(WriteRequest::Put(entry)).await {
                let report = report.change_context(FanOutError::WriteEntries);
                return Tally::failed(writer.succeeded(), report);
            }
        } else {
            tracing::warn!("Activity has no cohort, skipping cohort newsfeed");
        }

        if let Err(report) = writer.flush().await {
            let report = report.change_context(FanOutError::WriteEntries);
            return Tally::failed(writer.succeeded(), report);
        }

        let succeeded = writer.succeeded();
        match reconcile(succeeded, attempted) {
            Ok(()) => Tally::ok(succeeded),
            Err(report) => Tally::failed(succeeded, report),
        }
    }
}

/// Compares what was written with the number of followers listed.
///
/// The cohort entry counts towards `succeeded` but not towards
/// `attempted`, so a missing cohort entry alone never trips this.
pub(crate) fn reconcile(succeeded: usize, attempted: usize) -> Result<(), Report<FanOutError>> {
    if succeeded < attempted {
        return Err(Report::new(FanOutError::Reconciliation {
            succeeded,
            attempted,
        }));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Outcome;
    use crate::model::Cohort;
    use crate::pagination::Newsfeed;
    use crate::store::MemoryStore;
    use crate::test_utils;

    fn activity() -> Activity {
        Activity::new("alice", "tl-1", Some(Cohort::new("1200-1400")))
    }

    fn fanout(store: &MemoryStore) -> FanOut<'_, MemoryStore, crate::util::FixedClock> {
        FanOut::new(store).with_clock(test_utils::clock())
    }

    #[tokio::test]
    async fn should_write_one_entry_per_follower_and_one_for_cohort() {
        test_utils::init();

        for n in [0, 24, 25, 26, 1000] {
            let store = test_utils::store_with_followers("alice", n);
            let tally = fanout(&store).process_activity(&activity()).await;

            assert!(tally.is_ok(), "{n} followers: {:?}", tally.error());
            assert_eq!(tally.succeeded, n + 1);

            let entries = store.entries();
            assert_eq!(entries.len(), n + 1);
            assert_eq!(
                entries.iter().filter(|e| e.newsfeed_id == "1200-1400").count(),
                1
            );
            for name in test_utils::follower_names(n) {
                assert!(entries.iter().any(|e| e.newsfeed_id == name));
            }

            let batches = store.batch_sizes();
            assert!(batches.iter().all(|size| *size <= 25));
            assert_eq!(batches.iter().sum::<usize>(), n + 1);
        }
    }

    #[tokio::test]
    async fn entries_carry_fanout_time_and_activity() {
        let store = test_utils::store_with_followers("alice", 1);
        let tally = fanout(&store).process_activity(&activity()).await;
        assert!(tally.is_ok());

        let feed = Pager::new(Newsfeed::new(&store, &test_utils::follower_names(1)[0]))
            .collect_all()
            .await
            .unwrap();

        let stamp = FeedStamp::new(test_utils::now(), "tl-1");
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].poster, "alice");
        assert_eq!(feed[0].timeline_id, "tl-1");
        assert_eq!(feed[0].created_at, stamp.created_at());
        assert_eq!(feed[0].sort_key, stamp.sort_key());
    }

    #[tokio::test]
    async fn should_be_idempotent() {
        let store = test_utils::store_with_followers("alice", 30);
        let fanout = fanout(&store);

        assert!(fanout.process_activity(&activity()).await.is_ok());
        let first = store.entries();
        assert!(fanout.process_activity(&activity()).await.is_ok());

        assert_eq!(store.entries(), first);
        assert_eq!(first.len(), 31);
    }

    #[tokio::test]
    async fn should_stop_at_failed_flush() {
        for k in 0..3 {
            let store = test_utils::store_with_followers("alice", 60);
            store.fail_batch_write_at(k);

            let tally = fanout(&store).process_activity(&activity()).await;
            assert_eq!(tally.succeeded, 25 * k);
            assert_eq!(store.entries().len(), 25 * k);

            match tally.outcome {
                Outcome::TransientFailure(report) => {
                    assert_eq!(k, 0);
                    assert!(matches!(report.current_context(), FanOutError::WriteEntries));
                }
                Outcome::PartialFailure { at, report } => {
                    assert_eq!(at, 25 * k);
                    assert!(matches!(report.current_context(), FanOutError::WriteEntries));
                }
                Outcome::Ok => panic!("flush #{k} should have failed"),
            }
        }
    }

    #[tokio::test]
    async fn should_keep_progress_when_listing_fails() {
        let store = test_utils::store_with_followers("alice", 30).with_page_size(25);
        store.fail_list_at(1);

        let tally = fanout(&store).process_activity(&activity()).await;
        assert_eq!(tally.succeeded, 25);
        assert_eq!(store.entries().len(), 25);
        assert!(matches!(
            tally.error().map(Report::current_context),
            Some(FanOutError::ListFollowers)
        ));
    }

    #[tokio::test]
    async fn skips_cohort_entry_without_cohort() {
        let store = test_utils::store_with_followers("alice", 3);
        let activity = Activity::new("alice", "tl-1", None);

        let tally = fanout(&store).process_activity(&activity).await;
        assert!(tally.is_ok());
        assert_eq!(tally.succeeded, 3);
        assert_eq!(store.entries().len(), 3);
    }

    #[tokio::test]
    async fn honors_configured_batch_size() {
        let store = test_utils::store_with_followers("alice", 20);
        let tally = fanout(&store)
            .with_batch_size(10)
            .process_activity(&activity())
            .await;

        assert!(tally.is_ok());
        assert_eq!(store.batch_sizes(), vec![10, 10, 1]);
    }

    #[test]
    fn reconcile_flags_missing_entries() {
        assert!(reconcile(10, 10).is_ok());
        assert!(reconcile(11, 10).is_ok());

        let report = reconcile(9, 10).unwrap_err();
        assert!(matches!(
            report.current_context(),
            FanOutError::Reconciliation {
                succeeded: 9,
                attempted: 10
            }
        ));
    }
}
