//! Persistence primitives the fan-out engine and the statistics
//! job are built on.
//!
//! Each trait covers one table (or index) of the backing store so
//! components only ask for what they actually read or write. Stores
//! are passed to components by reference; the entry point owns them.
use error_stack::Result;
use thiserror::Error;

use crate::model::{EntryKey, FollowerEntry, NewsfeedEntry, Requirement, User, UserStatistics};
use crate::pagination::{Cursor, Page};

pub mod memory;
pub mod postgres;

pub use self::memory::MemoryStore;
pub use self::postgres::PgStore;

/// Most write requests a store accepts in one batch write.
pub const MAX_BATCH_SIZE: usize = 25;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or timed out. Retrying later may work.
    #[error("store is unavailable")]
    Unavailable,
    /// The store refused the request.
    #[error("store rejected the request")]
    Rejected,
    #[error("batch of {0} write requests exceeds the limit of {MAX_BATCH_SIZE}")]
    BatchTooLarge(usize),
    #[error("invalid pagination cursor")]
    InvalidCursor,
    /// A stored record could not be decoded.
    #[error("malformed record")]
    Malformed,
}

/// A single item of a batch write against the newsfeed table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteRequest {
    /// Inserts the entry, overwriting any entry with the same key.
    Put(NewsfeedEntry),
    Delete(EntryKey),
}

impl WriteRequest {
    #[must_use]
    pub fn key(&self) -> EntryKey {
        match self {
            Self::Put(entry) => entry.key(),
            Self::Delete(key) => key.clone(),
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait NewsfeedStore {
    /// Applies up to [`MAX_BATCH_SIZE`] requests. The batch is not
    /// transactional from the caller's point of view: on error, none
    /// of the requests should be assumed to be applied.
    async fn batch_write(&self, requests: Vec<WriteRequest>) -> Result<(), StoreError>;

    async fn get_entry(&self, key: &EntryKey) -> Result<Option<NewsfeedEntry>, StoreError>;

    async fn put_entry(&self, entry: &NewsfeedEntry) -> Result<(), StoreError>;

    async fn delete_entry(&self, key: &EntryKey) -> Result<(), StoreError>;

    /// Lists the entries generated by one activity of `poster`
    /// through the poster index.
    async fn list_by_activity(
        &self,
        poster: &str,
        timeline_id: &str,
        cursor: &Cursor,
    ) -> Result<Page<NewsfeedEntry>, StoreError>;

    /// Lists a newsfeed from the newest entry to the oldest.
    async fn list_newsfeed(
        &self,
        newsfeed_id: &str,
        cursor: &Cursor,
    ) -> Result<Page<NewsfeedEntry>, StoreError>;
}

#[allow(async_fn_in_trait)]
pub trait FollowerStore {
    async fn list_followers(
        &self,
        poster: &str,
        cursor: &Cursor,
    ) -> Result<Page<FollowerEntry>, StoreError>;
}

#[allow(async_fn_in_trait)]
pub trait UserStore {
    async fn list_users_in_cohort(
        &self,
        cohort: &str,
        cursor: &Cursor,
    ) -> Result<Page<User>, StoreError>;
}

#[allow(async_fn_in_trait)]
pub trait RequirementStore {
    async fn scan_requirements(&self, cursor: &Cursor) -> Result<Page<Requirement>, StoreError>;
}

#[allow(async_fn_in_trait)]
pub trait StatisticsStore {
    /// Replaces the stored snapshot as a whole.
    async fn set_statistics(&self, stats: &UserStatistics) -> Result<(), StoreError>;

    async fn get_statistics(&self) -> Result<Option<UserStatistics>, StoreError>;
}
