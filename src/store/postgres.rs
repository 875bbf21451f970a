use error_stack::{Report, Result, ResultExt};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use std::collections::BTreeMap;

use super::{
    FollowerStore, NewsfeedStore, RequirementStore, StatisticsStore, StoreError, UserStore,
    WriteRequest, MAX_BATCH_SIZE,
};
use crate::database::{self, ErrorExt, ReportExt};
use crate::model::{EntryKey, FollowerEntry, NewsfeedEntry, Requirement, User, UserStatistics};
use crate::pagination::{Cursor, Page};

/// Row id of the only statistics snapshot kept.
const STATISTICS_ID: &str = "STATISTICS";

/// Store backed by Postgres.
///
/// Listings use keyset pagination: the cursor handed out is the key of
/// the last row of the page, encoded as a JSON array of strings.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: database::Pool,
    page_size: usize,
}

impl PgStore {
    pub const DEFAULT_PAGE_SIZE: usize = 100;

    #[must_use]
    pub fn new(pool: database::Pool) -> Self {
        Self {
            pool,
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    #[must_use]
    pub fn pool(&self) -> &database::Pool {
        &self.pool
    }

    async fn conn(&self) -> Result<database::PoolConnection, StoreError> {
        self.pool.get().await.map_err(into_store_error)
    }

    /// One more row than a page holds, to tell whether another page exists.
    fn fetch_limit(&self) -> i64 {
        i64::try_from(self.page_size).map_or(i64::MAX, |n| n.saturating_add(1))
    }

    fn paged<T>(&self, mut rows: Vec<T>, key: impl Fn(&T) -> Vec<&str>) -> Page<T> {
        if rows.len() <= self.page_size {
            return Page::last(rows);
        }
        rows.truncate(self.page_size);
        let next = rows.last().map_or_else(Cursor::start, |row| encode_cursor(&key(row)));
        Page::new(rows, next)
    }
}

fn into_store_error(report: Report<database::Error>) -> Report<StoreError> {
    if report.is_readonly() {
        report.change_context(StoreError::Rejected)
    } else if report.is_malformed() {
        report.change_context(StoreError::Malformed)
    } else {
        report.change_context(StoreError::Unavailable)
    }
}

fn encode_cursor(key: &[&str]) -> Cursor {
    Cursor::new(serde_json::json!(key).to_string())
}

/// Decodes a cursor made by [`encode_cursor`] with `N` key parts.
/// An empty cursor decodes to `None`.
fn decode_cursor<const N: usize>(cursor: &Cursor) -> Result<Option<[String; N]>, StoreError> {
    if !cursor.has_more() {
        return Ok(None);
    }

    let parts = serde_json::from_str::<Vec<String>>(cursor.as_str())
        .change_context(StoreError::InvalidCursor)
        .attach_printable_lazy(|| format!("cursor: {:?}", cursor.as_str()))?;

    <[String; N]>::try_from(parts)
        .map(Some)
        .map_err(|parts| {
            Report::new(StoreError::InvalidCursor)
                .attach_printable(format!("expected {N} key parts, got {}", parts.len()))
        })
}

/// Keeps the last request of every key. Postgres refuses to touch the
/// same row twice in one `INSERT .. ON CONFLICT`.
fn squash(requests: Vec<WriteRequest>) -> (Vec<NewsfeedEntry>, Vec<EntryKey>) {
    let mut latest = BTreeMap::new();
    for request in requests {
        latest.insert(request.key(), request);
    }

    let mut puts = Vec::new();
    let mut deletes = Vec::new();
    for (key, request) in latest {
        match request {
            WriteRequest::Put(entry) => puts.push(entry),
            WriteRequest::Delete(..) => deletes.push(key),
        }
    }
    (puts, deletes)
}

impl NewsfeedStore for PgStore {
    #[tracing::instrument(skip_all, name = "db.newsfeed.batch_write", fields(requests = requests.len()))]
    async fn batch_write(&self, requests: Vec<WriteRequest>) -> Result<(), StoreError> {
        if requests.len() > MAX_BATCH_SIZE {
            return Err(Report::new(StoreError::BatchTooLarge(requests.len())));
        }

        let (puts, deletes) = squash(requests);
        let mut tx = self.pool.begin().await.map_err(into_store_error)?;

        if !puts.is_empty() {
            let mut builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO newsfeed (newsfeed_id, sort_key, created_at, poster, timeline_id) ",
            );
            builder.push_values(puts, |mut row, entry| {
                row.push_bind(entry.newsfeed_id)
                    .push_bind(entry.sort_key)
                    .push_bind(entry.created_at)
                    .push_bind(entry.poster)
                    .push_bind(entry.timeline_id);
            });
            builder.push(
                " ON CONFLICT (newsfeed_id, sort_key) DO UPDATE SET \
                 created_at = EXCLUDED.created_at, \
                 poster = EXCLUDED.poster, \
                 timeline_id = EXCLUDED.timeline_id",
            );

            builder
                .build()
                .execute(&mut *tx)
                .await
                .into_db_error()
                .map_err(into_store_error)
                .attach_printable("could not insert newsfeed entries")?;
        }

        if !deletes.is_empty() {
            let mut builder = QueryBuilder::<Postgres>::new(
                "DELETE FROM newsfeed WHERE (newsfeed_id, sort_key) IN ",
            );
            builder.push_tuples(deletes, |mut row, key| {
                row.push_bind(key.newsfeed_id).push_bind(key.sort_key);
            });

            builder
                .build()
                .execute(&mut *tx)
                .await
                .into_db_error()
                .map_err(into_store_error)
                .attach_printable("could not delete newsfeed entries")?;
        }

        tx.commit()
            .await
            .into_db_error()
            .map_err(into_store_error)
    }

    #[tracing::instrument(skip_all, name = "db.newsfeed.get")]
    async fn get_entry(&self, key: &EntryKey) -> Result<Option<NewsfeedEntry>, StoreError> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<_, NewsfeedEntry>(
            "SELECT * FROM newsfeed WHERE newsfeed_id = $1 AND sort_key = $2",
        )
        .bind(&key.newsfeed_id)
        .bind(&key.sort_key)
        .fetch_optional(&mut *conn)
        .await
        .into_db_error()
        .map_err(into_store_error)
    }

    async fn put_entry(&self, entry: &NewsfeedEntry) -> Result<(), StoreError> {
        self.batch_write(vec![WriteRequest::Put(entry.clone())])
            .await
    }

    async fn delete_entry(&self, key: &EntryKey) -> Result<(), StoreError> {
        self.batch_write(vec![WriteRequest::Delete(key.clone())])
            .await
    }

    #[tracing::instrument(skip_all, name = "db.newsfeed.list_by_activity")]
    async fn list_by_activity(
        &self,
        poster: &str,
        timeline_id: &str,
        cursor: &Cursor,
    ) -> Result<Page<NewsfeedEntry>, StoreError> {
        let (after_feed, after_sort_key) = match decode_cursor::<2>(cursor)? {
            Some([feed, sort_key]) => (Some(feed), Some(sort_key)),
            None => (None, None),
        };

        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, NewsfeedEntry>(
            "SELECT * FROM newsfeed \
             WHERE poster = $1 AND timeline_id = $2 \
             AND ($3::TEXT IS NULL OR (newsfeed_id, sort_key) > ($3, $4)) \
             ORDER BY newsfeed_id, sort_key \
             LIMIT $5",
        )
        .bind(poster)
        .bind(timeline_id)
        .bind(after_feed)
        .bind(after_sort_key)
        .bind(self.fetch_limit())
        .fetch_all(&mut *conn)
        .await
        .into_db_error()
        .map_err(into_store_error)?;

        Ok(self.paged(rows, |e| vec![e.newsfeed_id.as_str(), e.sort_key.as_str()]))
    }

    #[tracing::instrument(skip_all, name = "db.newsfeed.list")]
    async fn list_newsfeed(
        &self,
        newsfeed_id: &str,
        cursor: &Cursor,
    ) -> Result<Page<NewsfeedEntry>, StoreError> {
        let before = decode_cursor::<1>(cursor)?.map(|[sort_key]| sort_key);

        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, NewsfeedEntry>(
            "SELECT * FROM newsfeed \
             WHERE newsfeed_id = $1 AND ($2::TEXT IS NULL OR sort_key < $2) \
             ORDER BY sort_key DESC \
             LIMIT $3",
        )
        .bind(newsfeed_id)
        .bind(before)
        .bind(self.fetch_limit())
        .fetch_all(&mut *conn)
        .await
        .into_db_error()
        .map_err(into_store_error)?;

        Ok(self.paged(rows, |e| vec![e.sort_key.as_str()]))
    }
}

impl FollowerStore for PgStore {
    #[tracing::instrument(skip_all, name = "db.followers.list")]
    async fn list_followers(
        &self,
        poster: &str,
        cursor: &Cursor,
    ) -> Result<Page<FollowerEntry>, StoreError> {
        let after = decode_cursor::<1>(cursor)?.map(|[follower]| follower);

        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, FollowerEntry>(
            "SELECT * FROM followers \
             WHERE poster = $1 AND ($2::TEXT IS NULL OR follower > $2) \
             ORDER BY follower \
             LIMIT $3",
        )
        .bind(poster)
        .bind(after)
        .bind(self.fetch_limit())
        .fetch_all(&mut *conn)
        .await
        .into_db_error()
        .map_err(into_store_error)?;

        Ok(self.paged(rows, |f| vec![f.follower.as_str()]))
    }
}

impl UserStore for PgStore {
    #[tracing::instrument(skip_all, name = "db.users.list_in_cohort")]
    async fn list_users_in_cohort(
        &self,
        cohort: &str,
        cursor: &Cursor,
    ) -> Result<Page<User>, StoreError> {
        let after = decode_cursor::<1>(cursor)?.map(|[username]| username);

        let mut conn = self.conn().await?;
        let rows = sqlx::query_scalar::<_, Json<User>>(
            "SELECT payload FROM users \
             WHERE cohort = $1 AND ($2::TEXT IS NULL OR username > $2) \
             ORDER BY username \
             LIMIT $3",
        )
        .bind(cohort)
        .bind(after)
        .bind(self.fetch_limit())
        .fetch_all(&mut *conn)
        .await
        .into_db_error()
        .map_err(into_store_error)?;

        let users = rows.into_iter().map(|Json(user)| user).collect();
        Ok(self.paged(users, |u| vec![u.username.as_str()]))
    }
}

impl RequirementStore for PgStore {
    #[tracing::instrument(skip_all, name = "db.requirements.scan")]
    async fn scan_requirements(&self, cursor: &Cursor) -> Result<Page<Requirement>, StoreError> {
        let after = decode_cursor::<1>(cursor)?.map(|[id]| id);

        let mut conn = self.conn().await?;
        let rows = sqlx::query_scalar::<_, Json<Requirement>>(
            "SELECT payload FROM requirements \
             WHERE ($1::TEXT IS NULL OR id > $1) \
             ORDER BY id \
             LIMIT $2",
        )
        .bind(after)
        .bind(self.fetch_limit())
        .fetch_all(&mut *conn)
        .await
        .into_db_error()
        .map_err(into_store_error)?;

        let requirements = rows.into_iter().map(|Json(r)| r).collect();
        Ok(self.paged(requirements, |r| vec![r.id.as_str()]))
    }
}

impl StatisticsStore for PgStore {
    #[tracing::instrument(skip_all, name = "db.statistics.set")]
    async fn set_statistics(&self, stats: &UserStatistics) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        sqlx::query(
            "INSERT INTO user_statistics (id, payload, updated_at) VALUES ($1, $2, now()) \
             ON CONFLICT (id) DO UPDATE SET payload = EXCLUDED.payload, updated_at = now()",
        )
        .bind(STATISTICS_ID)
        .bind(Json(stats))
        .execute(&mut *conn)
        .await
        .into_db_error()
        .map_err(into_store_error)?;

        Ok(())
    }

    #[tracing::instrument(skip_all, name = "db.statistics.get")]
    async fn get_statistics(&self) -> Result<Option<UserStatistics>, StoreError> {
        let mut conn = self.conn().await?;
        let payload = sqlx::query_scalar::<_, Json<UserStatistics>>(
            "SELECT payload FROM user_statistics WHERE id = $1",
        )
        .bind(STATISTICS_ID)
        .fetch_optional(&mut *conn)
        .await
        .into_db_error()
        .map_err(into_store_error)?;

        Ok(payload.map(|Json(stats)| stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::{Activity, FanOut};
    use crate::model::{Cohort, FeedStamp};
    use crate::pagination::{EntriesOfActivity, FollowersOf, Pager};
    use crate::statistics::Aggregator;
    use crate::test_utils;

    #[test]
    fn cursor_holds_last_key() {
        let cursor = encode_cursor(&["bob", "2024-03-01T08:15:00Z_tl-1"]);
        assert_eq!(cursor.as_str(), r#"["bob","2024-03-01T08:15:00Z_tl-1"]"#);

        let [feed, sort_key] = decode_cursor::<2>(&cursor).unwrap().unwrap();
        assert_eq!(feed, "bob");
        assert_eq!(sort_key, "2024-03-01T08:15:00Z_tl-1");
    }

    #[test]
    fn empty_cursor_starts_from_beginning() {
        assert!(decode_cursor::<1>(&Cursor::start()).unwrap().is_none());
    }

    #[test]
    fn should_reject_foreign_cursors() {
        for token in ["not json", r#"{"k":1}"#, r#"["only one"]"#] {
            let error = decode_cursor::<2>(&Cursor::new(token)).unwrap_err();
            assert!(
                matches!(error.current_context(), StoreError::InvalidCursor),
                "{token}"
            );
        }
    }

    #[test]
    fn squash_keeps_last_request_per_key() {
        let stamp = FeedStamp::new(test_utils::now(), "tl-1");
        let bob = NewsfeedEntry::new("bob", &stamp, "alice", "tl-1");
        let carol = NewsfeedEntry::new("carol", &stamp, "alice", "tl-1");

        let (puts, deletes) = squash(vec![
            WriteRequest::Put(bob.clone()),
            WriteRequest::Put(carol.clone()),
            WriteRequest::Put(bob.clone()),
            WriteRequest::Delete(carol.key()),
        ]);

        assert_eq!(puts, vec![bob]);
        assert_eq!(deletes, vec![carol.key()]);
    }

    // The tests below need a Postgres server; `sqlx::test` creates a
    // fresh database per test from `DATABASE_URL`.

    async fn seed_followers(pool: &sqlx::PgPool, poster: &str, followers: &[String]) {
        for follower in followers {
            sqlx::query("INSERT INTO followers (poster, follower) VALUES ($1, $2)")
                .bind(poster)
                .bind(follower)
                .execute(pool)
                .await
                .unwrap();
        }
    }

    async fn seed_user(pool: &sqlx::PgPool, user: &User) {
        sqlx::query("INSERT INTO users (username, cohort, payload) VALUES ($1, $2, $3)")
            .bind(&user.username)
            .bind(user.dojo_cohort.as_str())
            .bind(Json(user))
            .execute(pool)
            .await
            .unwrap();
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres server at DATABASE_URL"]
    async fn batch_write_puts_overwrites_and_deletes(pool: sqlx::PgPool) {
        let store = PgStore::new(pool.into());
        let stamp = FeedStamp::new(test_utils::now(), "tl-1");
        let bob = NewsfeedEntry::new("bob", &stamp, "alice", "tl-1");
        let carol = NewsfeedEntry::new("carol", &stamp, "alice", "tl-1");

        store
            .batch_write(vec![
                WriteRequest::Put(bob.clone()),
                WriteRequest::Put(carol.clone()),
            ])
            .await
            .unwrap();

        let mut moved = bob.clone();
        moved.poster = "dave".into();
        store
            .batch_write(vec![
                WriteRequest::Put(bob.clone()),
                WriteRequest::Put(moved.clone()),
                WriteRequest::Delete(carol.key()),
            ])
            .await
            .unwrap();

        assert_eq!(store.get_entry(&bob.key()).await.unwrap(), Some(moved));
        assert_eq!(store.get_entry(&carol.key()).await.unwrap(), None);

        store.delete_entry(&bob.key()).await.unwrap();
        assert_eq!(store.get_entry(&bob.key()).await.unwrap(), None);

        let error = store
            .batch_write(vec![WriteRequest::Delete(bob.key()); MAX_BATCH_SIZE + 1])
            .await
            .unwrap_err();
        assert!(matches!(
            error.current_context(),
            StoreError::BatchTooLarge(26)
        ));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres server at DATABASE_URL"]
    async fn should_page_followers_by_keyset(pool: sqlx::PgPool) {
        seed_followers(&pool, "alice", &test_utils::follower_names(5)).await;
        seed_followers(&pool, "bob", &test_utils::follower_names(2)).await;
        let store = PgStore::new(pool.into()).with_page_size(2);

        let mut pager = Pager::new(FollowersOf::new(&store, "alice"));
        let mut followers = Vec::new();
        while let Some(page) = pager.next_page().await.unwrap() {
            assert!(page.len() <= 2);
            followers.extend(page.into_iter().map(|f| f.follower));
        }

        assert_eq!(pager.pages(), 3);
        assert_eq!(followers, test_utils::follower_names(5));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres server at DATABASE_URL"]
    async fn fanout_and_retract_round_trip(pool: sqlx::PgPool) {
        seed_followers(&pool, "alice", &test_utils::follower_names(30)).await;
        let store = PgStore::new(pool.into()).with_page_size(7);
        let fanout = FanOut::new(&store).with_clock(test_utils::clock());
        let activity = Activity::new("alice", "tl-1", Some(Cohort::new("1200-1400")));

        let tally = fanout.process_activity(&activity).await;
        assert!(tally.is_ok(), "{:?}", tally.error());
        assert_eq!(tally.succeeded, 31);

        let mut pager = Pager::new(EntriesOfActivity::new(&store, "alice", "tl-1"));
        let mut listed = 0;
        while let Some(page) = pager.next_page().await.unwrap() {
            listed += page.len();
        }
        assert_eq!(listed, 31);
        assert_eq!(pager.pages(), 5);

        let tally = fanout.delete_entries_for("alice", "tl-1").await;
        assert!(tally.is_ok(), "{:?}", tally.error());
        assert_eq!(tally.succeeded, 31);

        let left = Pager::new(EntriesOfActivity::new(&store, "alice", "tl-1"))
            .collect_all()
            .await
            .unwrap();
        assert!(left.is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres server at DATABASE_URL"]
    async fn aggregates_stored_users_and_replaces_snapshot(pool: sqlx::PgPool) {
        seed_user(&pool, &test_utils::user("bob", "1200-1400")).await;
        seed_user(&pool, &test_utils::user("carol", "1200-1400")).await;

        let requirement = test_utils::requirement("req-1", "1200-1400", 10, 1.0);
        sqlx::query("INSERT INTO requirements (id, payload) VALUES ($1, $2)")
            .bind(&requirement.id)
            .bind(Json(&requirement))
            .execute(&pool)
            .await
            .unwrap();

        let store = PgStore::new(pool.clone().into()).with_page_size(1);
        assert_eq!(store.get_statistics().await.unwrap(), None);

        store
            .set_statistics(&UserStatistics::new(&[Cohort::new("0-300")]))
            .await
            .unwrap();

        let stats = Aggregator::new(&store, Cohort::defaults())
            .with_clock(test_utils::clock())
            .run()
            .await
            .unwrap();
        assert_eq!(stats.cohort("1200-1400").unwrap().active.participants, 2);
        assert_eq!(store.get_statistics().await.unwrap(), Some(stats));

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_statistics")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres server at DATABASE_URL"]
    async fn undecodable_rows_are_malformed(pool: sqlx::PgPool) {
        sqlx::query("INSERT INTO users (username, cohort, payload) VALUES ($1, $2, $3)")
            .bind("bob")
            .bind("1200-1400")
            .bind(Json(serde_json::json!({ "nonsense": true })))
            .execute(&pool)
            .await
            .unwrap();

        let store = PgStore::new(pool.into());
        let error = store
            .list_users_in_cohort("1200-1400", &Cursor::start())
            .await
            .unwrap_err();
        assert!(matches!(error.current_context(), StoreError::Malformed));
    }
}
