use error_stack::{Report, Result};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{
    FollowerStore, NewsfeedStore, RequirementStore, StatisticsStore, StoreError, UserStore,
    WriteRequest, MAX_BATCH_SIZE,
};
use crate::model::{
    EntryKey, FollowerEntry, NewsfeedEntry, Requirement, User, UserStatistics,
};
use crate::pagination::{Cursor, Page};

/// A store kept entirely in memory.
///
/// It behaves like the hosted store where it matters to callers: batch
/// writes are capped at [`MAX_BATCH_SIZE`], listings are paged with opaque
/// cursors and the poster index is read like a filtered scan, so a page
/// can come back empty while more pages remain.
///
/// Failures can be injected to exercise partial progress.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
    page_size: usize,
}

#[derive(Debug, Default)]
struct State {
    newsfeed: BTreeMap<EntryKey, NewsfeedEntry>,
    followers: BTreeMap<String, BTreeMap<String, FollowerEntry>>,
    users: BTreeMap<String, User>,
    requirements: BTreeMap<String, Requirement>,
    statistics: Option<UserStatistics>,

    batch_writes: usize,
    batch_sizes: Vec<usize>,
    fail_batch_write_at: Option<usize>,
    list_calls: usize,
    fail_list_at: Option<usize>,
}

impl MemoryStore {
    pub const DEFAULT_PAGE_SIZE: usize = 100;

    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::default(),
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }

    /// Sets how many rows one listing call reads.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_follower(&self, poster: &str, follower: &str) {
        let entry = FollowerEntry {
            poster: poster.to_string(),
            follower: follower.to_string(),
            created_at: String::new(),
        };
        self.state()
            .followers
            .entry(poster.to_string())
            .or_default()
            .insert(follower.to_string(), entry);
    }

    pub fn add_user(&self, user: User) {
        self.state().users.insert(user.username.clone(), user);
    }

    pub fn add_requirement(&self, requirement: Requirement) {
        self.state()
            .requirements
            .insert(requirement.id.clone(), requirement);
    }

    /// Makes the `n`-th batch write (counting from zero, across the
    /// store's lifetime) fail without applying anything.
    pub fn fail_batch_write_at(&self, n: usize) {
        self.state().fail_batch_write_at = Some(n);
    }

    /// Makes the `n`-th listing call (counting from zero) fail.
    pub fn fail_list_at(&self, n: usize) {
        self.state().fail_list_at = Some(n);
    }

    /// Sizes of every successfully applied batch write, in order.
    #[must_use]
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.state().batch_sizes.clone()
    }

    #[must_use]
    pub fn entries(&self) -> Vec<NewsfeedEntry> {
        self.state().newsfeed.values().cloned().collect()
    }

    /// Listing calls made so far, failed ones included.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.state().list_calls
    }

    fn begin_list(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        let mut state = self.state();
        let call = state.list_calls;
        state.list_calls += 1;
        if state.fail_list_at == Some(call) {
            return Err(Report::new(StoreError::Unavailable)
                .attach_printable(format!("injected failure on listing call #{call}")));
        }
        Ok(state)
    }

    /// Reads up to `page_size` rows after the cursor, keeping those
    /// `keep` accepts. The cursor is the encoded key of the last row read.
    fn scan_page<K, V, T>(
        &self,
        rows: &BTreeMap<K, V>,
        cursor: &Cursor,
        decode: impl Fn(&str) -> Option<K>,
        encode: impl Fn(&K) -> String,
        keep: impl Fn(&V) -> Option<T>,
    ) -> Result<Page<T>, StoreError>
    where
        K: Ord,
    {
        let lower = if cursor.has_more() {
            let key = decode(cursor.as_str()).ok_or_else(|| {
                Report::new(StoreError::InvalidCursor)
                    .attach_printable(format!("cursor: {:?}", cursor.as_str()))
            })?;
            Bound::Excluded(key)
        } else {
            Bound::Unbounded
        };

        let mut scanned = rows.range((lower, Bound::Unbounded));
        let mut items = Vec::new();
        let mut last = None;
        for (key, value) in scanned.by_ref().take(self.page_size) {
            if let Some(item) = keep(value) {
                items.push(item);
            }
            last = Some(key);
        }

        let next = match (last, scanned.next()) {
            (Some(last), Some(..)) => Cursor::new(encode(last)),
            _ => Cursor::start(),
        };
        Ok(Page::new(items, next))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// Newsfeed keys are encoded as `<newsfeed_id>\n<sort_key>` inside cursors.
fn encode_entry_key(key: &EntryKey) -> String {
    format!("{}\n{}", key.newsfeed_id, key.sort_key)
}

fn decode_entry_key(cursor: &str) -> Option<EntryKey> {
    let (newsfeed_id, sort_key) = cursor.split_once('\n')?;
    Some(EntryKey::new(newsfeed_id, sort_key))
}

impl NewsfeedStore for MemoryStore {
    async fn batch_write(&self, requests: Vec<WriteRequest>) -> Result<(), StoreError> {
        if requests.len() > MAX_BATCH_SIZE {
            return Err(Report::new(StoreError::BatchTooLarge(requests.len())));
        }

        let mut state = self.state();
        let call = state.batch_writes;
        state.batch_writes += 1;
        if state.fail_batch_write_at == Some(call) {
            return Err(Report::new(StoreError::Unavailable)
                .attach_printable(format!("injected failure on batch write #{call}")));
        }

        state.batch_sizes.push(requests.len());
        for request in requests {
            match request {
                WriteRequest::Put(entry) => {
                    state.newsfeed.insert(entry.key(), entry);
                }
                WriteRequest::Delete(key) => {
                    state.newsfeed.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn get_entry(&self, key: &EntryKey) -> Result<Option<NewsfeedEntry>, StoreError> {
        Ok(self.state().newsfeed.get(key).cloned())
    }

    async fn put_entry(&self, entry: &NewsfeedEntry) -> Result<(), StoreError> {
        self.state().newsfeed.insert(entry.key(), entry.clone());
        Ok(())
    }

    async fn delete_entry(&self, key: &EntryKey) -> Result<(), StoreError> {
        self.state().newsfeed.remove(key);
        Ok(())
    }

    async fn list_by_activity(
        &self,
        poster: &str,
        timeline_id: &str,
        cursor: &Cursor,
    ) -> Result<Page<NewsfeedEntry>, StoreError> {
        let state = self.begin_list()?;
        self.scan_page(
            &state.newsfeed,
            cursor,
            decode_entry_key,
            encode_entry_key,
            |entry| {
                (entry.poster == poster && entry.timeline_id == timeline_id)
                    .then(|| entry.clone())
            },
        )
    }

    async fn list_newsfeed(
        &self,
        newsfeed_id: &str,
        cursor: &Cursor,
    ) -> Result<Page<NewsfeedEntry>, StoreError> {
        let state = self.begin_list()?;
        let upper = if cursor.has_more() {
            Bound::Excluded(EntryKey::new(newsfeed_id, cursor.as_str()))
        } else {
            Bound::Unbounded
        };

        let mut entries = state
            .newsfeed
            .range((Bound::Included(EntryKey::new(newsfeed_id, "")), upper))
            .rev()
            .skip_while(|(key, _)| key.newsfeed_id != newsfeed_id)
            .take_while(|(key, _)| key.newsfeed_id == newsfeed_id)
            .take(self.page_size + 1)
            .map(|(_, entry)| entry.clone())
            .collect::<Vec<_>>();

        let next = if entries.len() > self.page_size {
            entries.truncate(self.page_size);
            entries
                .last()
                .map_or_else(Cursor::start, |e| Cursor::new(e.sort_key.clone()))
        } else {
            Cursor::start()
        };
        Ok(Page::new(entries, next))
    }
}

impl FollowerStore for MemoryStore {
    async fn list_followers(
        &self,
        poster: &str,
        cursor: &Cursor,
    ) -> Result<Page<FollowerEntry>, StoreError> {
        let state = self.begin_list()?;
        let Some(followers) = state.followers.get(poster) else {
            return Ok(Page::last(Vec::new()));
        };
        self.scan_page(
            followers,
            cursor,
            |c| Some(c.to_string()),
            Clone::clone,
            |entry| Some(entry.clone()),
        )
    }
}

impl UserStore for MemoryStore {
    async fn list_users_in_cohort(
        &self,
        cohort: &str,
        cursor: &Cursor,
    ) -> Result<Page<User>, StoreError> {
        let state = self.begin_list()?;
        self.scan_page(
            &state.users,
            cursor,
            |c| Some(c.to_string()),
            Clone::clone,
            |user| (user.dojo_cohort.as_str() == cohort).then(|| user.clone()),
        )
    }
}

impl RequirementStore for MemoryStore {
    async fn scan_requirements(&self, cursor: &Cursor) -> Result<Page<Requirement>, StoreError> {
        let state = self.begin_list()?;
        self.scan_page(
            &state.requirements,
            cursor,
            |c| Some(c.to_string()),
            Clone::clone,
            |requirement| Some(requirement.clone()),
        )
    }
}

impl StatisticsStore for MemoryStore {
    async fn set_statistics(&self, stats: &UserStatistics) -> Result<(), StoreError> {
        self.state().statistics = Some(stats.clone());
        Ok(())
    }

    async fn get_statistics(&self) -> Result<Option<UserStatistics>, StoreError> {
        Ok(self.state().statistics.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cohort, FeedStamp};
    use crate::pagination::{EntriesOfActivity, FollowersOf, Newsfeed, Pager};
    use crate::test_utils;
    use static_assertions::assert_impl_all;

    assert_impl_all!(MemoryStore: Send, Sync);

    fn entry(newsfeed_id: &str, timeline_id: &str) -> NewsfeedEntry {
        let stamp = FeedStamp::new(test_utils::now(), timeline_id);
        NewsfeedEntry::new(newsfeed_id, &stamp, "alice", timeline_id)
    }

    #[tokio::test]
    async fn should_reject_oversized_batches() {
        let store = MemoryStore::new();
        let requests = (0..26)
            .map(|i| WriteRequest::Put(entry(&format!("user{i}"), "tl-1")))
            .collect();

        let error = store.batch_write(requests).await.unwrap_err();
        assert!(matches!(
            error.current_context(),
            StoreError::BatchTooLarge(26)
        ));
        assert!(store.entries().is_empty());
    }

    #[tokio::test]
    async fn entries_are_overwritten_and_deleted_by_key() {
        let store = MemoryStore::new();
        let first = entry("bob", "tl-1");
        store.put_entry(&first).await.unwrap();
        store
            .batch_write(vec![WriteRequest::Put(first.clone())])
            .await
            .unwrap();

        assert_eq!(store.entries(), vec![first.clone()]);
        assert_eq!(store.get_entry(&first.key()).await.unwrap(), Some(first.clone()));

        store.delete_entry(&first.key()).await.unwrap();
        assert_eq!(store.get_entry(&first.key()).await.unwrap(), None);
        // deleting twice is fine
        store.delete_entry(&first.key()).await.unwrap();
    }

    #[tokio::test]
    async fn activity_listing_can_return_empty_pages() {
        let store = MemoryStore::new().with_page_size(2);
        for feed in ["a", "b", "c", "d"] {
            store.put_entry(&entry(feed, "tl-other")).await.unwrap();
        }
        store.put_entry(&entry("e", "tl-1")).await.unwrap();

        let mut pager = Pager::new(EntriesOfActivity::new(&store, "alice", "tl-1"));
        let first = pager.next_page().await.unwrap().unwrap();
        assert!(first.is_empty());

        let rest = pager.collect_all().await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].newsfeed_id, "e");
    }

    #[tokio::test]
    async fn should_page_followers_in_order() {
        let store = test_utils::store_with_followers("alice", 7).with_page_size(3);
        let mut pager = Pager::new(FollowersOf::new(&store, "alice"));

        let mut followers = Vec::new();
        while let Some(page) = pager.next_page().await.unwrap() {
            assert!(page.len() <= 3);
            followers.extend(page.into_iter().map(|f| f.follower));
        }

        assert_eq!(pager.pages(), 3);
        assert_eq!(followers, test_utils::follower_names(7));
    }

    #[tokio::test]
    async fn unknown_poster_has_no_followers() {
        let store = MemoryStore::new();
        let followers = Pager::new(FollowersOf::new(&store, "nobody"))
            .collect_all()
            .await
            .unwrap();
        assert!(followers.is_empty());
    }

    #[tokio::test]
    async fn newsfeed_lists_newest_first() {
        let store = MemoryStore::new().with_page_size(2);
        let mut expected = Vec::new();
        for (minutes, id) in [(0, "tl-1"), (1, "tl-2"), (2, "tl-3")] {
            let at = test_utils::now() + chrono::Duration::minutes(minutes);
            let entry = NewsfeedEntry::new("bob", &FeedStamp::new(at, id), "alice", id);
            store.put_entry(&entry).await.unwrap();
            expected.insert(0, entry.timeline_id);
        }
        store.put_entry(&entry("carol", "tl-9")).await.unwrap();

        let feed = Pager::new(Newsfeed::new(&store, "bob"))
            .collect_all()
            .await
            .unwrap();
        let ids: Vec<_> = feed.into_iter().map(|e| e.timeline_id).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn should_fail_injected_listing() {
        let store = MemoryStore::new();
        store.add_user(test_utils::user("bob", "1200-1400"));
        store.fail_list_at(0);

        let error = store
            .list_users_in_cohort("1200-1400", &Cursor::start())
            .await
            .unwrap_err();
        assert!(matches!(error.current_context(), StoreError::Unavailable));

        let page = store
            .list_users_in_cohort(Cohort::new("1200-1400").as_str(), &Cursor::start())
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
    }

    #[tokio::test]
    async fn should_reject_garbage_cursor() {
        let store = MemoryStore::new();
        store.put_entry(&entry("bob", "tl-1")).await.unwrap();
        let error = store
            .list_by_activity("alice", "tl-1", &Cursor::new("no separator"))
            .await
            .unwrap_err();
        assert!(matches!(error.current_context(), StoreError::InvalidCursor));
    }
}
