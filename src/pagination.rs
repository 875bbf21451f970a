//! Cursor based paging over the store.
//!
//! Every listing the crate does goes through [`Pager`]: start with an
//! empty cursor and keep asking for pages until the store hands back an
//! empty cursor. A page may be empty while the cursor is not (a filtered scan
//! can skip every row of a page) and that must not end the listing.
use error_stack::Result;
use serde::{Deserialize, Serialize};

use crate::model::{Cohort, FollowerEntry, NewsfeedEntry, Requirement, User};
use crate::store::{FollowerStore, NewsfeedStore, RequirementStore, StoreError, UserStore};

/// Opaque continuation token handed out by the store.
///
/// An empty cursor either means "start from the beginning" (when
/// passed in) or "there are no more pages" (when handed back).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    #[must_use]
    pub const fn start() -> Self {
        Self(String::new())
    }

    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        !self.0.is_empty()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Cursor,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(items: Vec<T>, next: Cursor) -> Self {
        Self { items, next }
    }

    /// A page with nothing after it.
    #[must_use]
    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, Cursor::start())
    }
}

/// Something that can be listed one page at a time.
#[allow(async_fn_in_trait)]
pub trait PageSource {
    type Item;

    async fn fetch_page(&self, cursor: &Cursor) -> Result<Page<Self::Item>, StoreError>;
}

/// Drives a [`PageSource`] from the first page to the last.
#[derive(Debug)]
pub struct Pager<P> {
    source: P,
    cursor: Cursor,
    exhausted: bool,
    pages: usize,
}

impl<P: PageSource> Pager<P> {
    #[must_use]
    pub fn new(source: P) -> Self {
        Self {
            source,
            cursor: Cursor::start(),
            exhausted: false,
            pages: 0,
        }
    }

    /// Fetches the next page, or `None` once the previous page
    /// came back without a cursor.
    pub async fn next_page(&mut self) -> Result<Option<Vec<P::Item>>, StoreError> {
        if self.exhausted {
            return Ok(None);
        }

        let page = self.source.fetch_page(&self.cursor).await?;
        self.pages += 1;
        self.exhausted = !page.next.has_more();
        self.cursor = page.next;

        Ok(Some(page.items))
    }

    /// Fetches every remaining page and concatenates them.
    pub async fn collect_all(mut self) -> Result<Vec<P::Item>, StoreError> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page);
        }
        Ok(items)
    }

    /// Number of pages fetched so far.
    #[must_use]
    pub fn pages(&self) -> usize {
        self.pages
    }
}

/// Followers of one poster.
#[derive(Debug)]
pub struct FollowersOf<'a, S> {
    store: &'a S,
    poster: &'a str,
}

impl<'a, S: FollowerStore> FollowersOf<'a, S> {
    #[must_use]
    pub fn new(store: &'a S, poster: &'a str) -> Self {
        Self { store, poster }
    }
}

impl<S: FollowerStore> PageSource for FollowersOf<'_, S> {
    type Item = FollowerEntry;

    async fn fetch_page(&self, cursor: &Cursor) -> Result<Page<FollowerEntry>, StoreError> {
        self.store.list_followers(self.poster, cursor).await
    }
}

/// Users currently in a cohort.
#[derive(Debug)]
pub struct UsersInCohort<'a, S> {
    store: &'a S,
    cohort: &'a Cohort,
}

impl<'a, S: UserStore> UsersInCohort<'a, S> {
    #[must_use]
    pub fn new(store: &'a S, cohort: &'a Cohort) -> Self {
        Self { store, cohort }
    }
}

impl<S: UserStore> PageSource for UsersInCohort<'_, S> {
    type Item = User;

    async fn fetch_page(&self, cursor: &Cursor) -> Result<Page<User>, StoreError> {
        self.store
            .list_users_in_cohort(self.cohort.as_str(), cursor)
            .await
    }
}

/// Every requirement definition.
#[derive(Debug)]
pub struct Requirements<'a, S> {
    store: &'a S,
}

impl<'a, S: RequirementStore> Requirements<'a, S> {
    #[must_use]
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }
}

impl<S: RequirementStore> PageSource for Requirements<'_, S> {
    type Item = Requirement;

    async fn fetch_page(&self, cursor: &Cursor) -> Result<Page<Requirement>, StoreError> {
        self.store.scan_requirements(cursor).await
    }
}

/// Newsfeed entries generated by one activity.
#[derive(Debug)]
pub struct EntriesOfActivity<'a, S> {
    store: &'a S,
    poster: &'a str,
    timeline_id: &'a str,
}

impl<'a, S: NewsfeedStore> EntriesOfActivity<'a, S> {
    #[must_use]
    pub fn new(store: &'a S, poster: &'a str, timeline_id: &'a str) -> Self {
        Self {
            store,
            poster,
            timeline_id,
        }
    }
}

impl<S: NewsfeedStore> PageSource for EntriesOfActivity<'_, S> {
    type Item = NewsfeedEntry;

    async fn fetch_page(&self, cursor: &Cursor) -> Result<Page<NewsfeedEntry>, StoreError> {
        self.store
            .list_by_activity(self.poster, self.timeline_id, cursor)
            .await
    }
}

/// One newsfeed, newest entries first.
#[derive(Debug)]
pub struct Newsfeed<'a, S> {
    store: &'a S,
    newsfeed_id: &'a str,
}

impl<'a, S: NewsfeedStore> Newsfeed<'a, S> {
    #[must_use]
    pub fn new(store: &'a S, newsfeed_id: &'a str) -> Self {
        Self { store, newsfeed_id }
    }
}

impl<S: NewsfeedStore> PageSource for Newsfeed<'_, S> {
    type Item = NewsfeedEntry;

    async fn fetch_page(&self, cursor: &Cursor) -> Result<Page<NewsfeedEntry>, StoreError> {
        self.store.list_newsfeed(self.newsfeed_id, cursor).await
    }
}
