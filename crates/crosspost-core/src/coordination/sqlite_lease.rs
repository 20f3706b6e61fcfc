//! `SQLite`-backed lease store for processes sharing one database file.
//!
//! Acquisition is a single conditional upsert, so two processes racing for
//! the same key cannot both see a free slot.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};

use super::lease::{Lease, LeaseStore};
use crate::{
    content::{ChannelName, ContentId, LeaseKey},
    Error, Result,
};

/// Lease store over a `publication_leases` table.
#[derive(Debug, Clone)]
pub struct SqliteLeaseStore {
    db: SqlitePool,
}

impl SqliteLeaseStore {
    /// Wrap an existing pool. Call [`Self::init`] before use.
    #[must_use]
    pub const fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Open (creating if needed) the database file and initialize the table.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let db = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let store = Self::new(db);
        store.init().await?;
        Ok(store)
    }

    /// Get the database pool
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Initialize the leases table.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS publication_leases (
                content_id TEXT NOT NULL,
                channel TEXT NOT NULL,
                acquired_at_ms INTEGER NOT NULL,
                PRIMARY KEY (content_id, channel)
            )",
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_publication_leases_acquired
             ON publication_leases (acquired_at_ms)",
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

fn to_lease(content_id: String, channel: &str, acquired_at_ms: i64) -> Result<Lease> {
    let acquired_at = DateTime::from_timestamp_millis(acquired_at_ms).ok_or_else(|| {
        Error::ParseError(format!("Invalid lease timestamp: {acquired_at_ms}"))
    })?;
    Ok(Lease {
        content_id: ContentId::new(content_id),
        channel: ChannelName::parse(channel)?,
        acquired_at,
    })
}

fn count(rows: u64) -> usize {
    usize::try_from(rows).unwrap_or(usize::MAX)
}

#[async_trait]
impl LeaseStore for SqliteLeaseStore {
    async fn try_acquire(
        &self,
        key: &LeaseKey,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool> {
        let now_ms = now.timestamp_millis();
        let cutoff_ms = (now - ttl).timestamp_millis();

        let result = sqlx::query(
            "INSERT INTO publication_leases (content_id, channel, acquired_at_ms)
             VALUES (?, ?, ?)
             ON CONFLICT (content_id, channel) DO UPDATE
                SET acquired_at_ms = excluded.acquired_at_ms
                WHERE publication_leases.acquired_at_ms < ?",
        )
        .bind(key.0.as_str())
        .bind(key.1.as_str())
        .bind(now_ms)
        .bind(cutoff_ms)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, key: &LeaseKey) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM publication_leases WHERE content_id = ? AND channel = ?")
                .bind(key.0.as_str())
                .bind(key.1.as_str())
                .execute(&self.db)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn release_all(&self, content_id: &ContentId) -> Result<usize> {
        let result = sqlx::query("DELETE FROM publication_leases WHERE content_id = ?")
            .bind(content_id.as_str())
            .execute(&self.db)
            .await?;
        Ok(count(result.rows_affected()))
    }

    async fn is_held(&self, key: &LeaseKey, now: DateTime<Utc>, ttl: Duration) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT acquired_at_ms FROM publication_leases
             WHERE content_id = ? AND channel = ? AND acquired_at_ms >= ?",
        )
        .bind(key.0.as_str())
        .bind(key.1.as_str())
        .bind((now - ttl).timestamp_millis())
        .fetch_optional(&self.db)
        .await?;
        Ok(row.is_some())
    }

    async fn remove_acquired_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let result = sqlx::query("DELETE FROM publication_leases WHERE acquired_at_ms < ?")
            .bind(cutoff.timestamp_millis())
            .execute(&self.db)
            .await?;
        Ok(count(result.rows_affected()))
    }

    async fn evict_oldest(&self, count_to_evict: usize) -> Result<usize> {
        let limit = i64::try_from(count_to_evict).unwrap_or(i64::MAX);
        let result = sqlx::query(
            "DELETE FROM publication_leases WHERE rowid IN (
                SELECT rowid FROM publication_leases
                ORDER BY acquired_at_ms ASC, content_id ASC, channel ASC
                LIMIT ?
            )",
        )
        .bind(limit)
        .execute(&self.db)
        .await?;
        Ok(count(result.rows_affected()))
    }

    async fn len(&self) -> Result<usize> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM publication_leases")
            .fetch_one(&self.db)
            .await?;
        Ok(usize::try_from(total).unwrap_or(0))
    }

    async fn snapshot(&self) -> Result<Vec<Lease>> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT content_id, channel, acquired_at_ms FROM publication_leases
             ORDER BY acquired_at_ms ASC, content_id ASC, channel ASC",
        )
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|(content_id, channel, acquired_at_ms)| {
                to_lease(content_id, &channel, acquired_at_ms)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;
    use crate::coordination::lease::DEFAULT_TTL_SECS;

    async fn setup() -> Result<SqliteLeaseStore> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = SqliteLeaseStore::new(pool);
        store.init().await?;
        Ok(store)
    }

    fn key(id: &str, channel: &str) -> Result<LeaseKey> {
        Ok((ContentId::new(id), ChannelName::parse(channel)?))
    }

    fn ttl() -> Duration {
        Duration::seconds(DEFAULT_TTL_SECS)
    }

    #[tokio::test]
    async fn test_acquire_then_denied() -> Result<()> {
        let store = setup().await?;
        let key = key("c-1", "telegram")?;
        let now = Utc::now();

        assert!(store.try_acquire(&key, now, ttl()).await?);
        assert!(!store.try_acquire(&key, now + Duration::seconds(1), ttl()).await?);
        assert!(!store.try_acquire(&key, now + ttl(), ttl()).await?, "reclaim needs age > ttl");
        assert!(store.is_held(&key, now, ttl()).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_row_is_reclaimed_in_place() -> Result<()> {
        let store = setup().await?;
        let key = key("c-1", "vk")?;
        let start = Utc::now();

        assert!(store.try_acquire(&key, start, ttl()).await?);
        let later = start + ttl() + Duration::seconds(1);
        assert!(store.try_acquire(&key, later, ttl()).await?);

        let leases = store.snapshot().await?;
        assert_eq!(leases.len(), 1);
        assert_eq!(
            leases[0].acquired_at.timestamp_millis(),
            later.timestamp_millis()
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_release_and_release_all() -> Result<()> {
        let store = setup().await?;
        let now = Utc::now();
        let a_tg = key("c-a", "telegram")?;
        let a_vk = key("c-a", "vk")?;
        let b_vk = key("c-b", "vk")?;
        for k in [&a_tg, &a_vk, &b_vk] {
            store.try_acquire(k, now, ttl()).await?;
        }

        assert!(store.release(&a_tg).await?);
        assert!(!store.release(&a_tg).await?);
        assert_eq!(store.release_all(&ContentId::new("c-a")).await?, 1);
        assert_eq!(store.len().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_sweep_helpers() -> Result<()> {
        let store = setup().await?;
        let start = Utc::now();
        for i in 0..6 {
            let k = key(&format!("c-{i}"), "telegram")?;
            store
                .try_acquire(&k, start + Duration::seconds(i), ttl())
                .await?;
        }

        assert_eq!(
            store
                .remove_acquired_before(start + Duration::seconds(2))
                .await?,
            2
        );
        assert_eq!(store.evict_oldest(2).await?, 2);

        let left: Vec<String> = store
            .snapshot()
            .await?
            .into_iter()
            .map(|l| l.content_id.to_string())
            .collect();
        assert_eq!(left, vec!["c-4".to_string(), "c-5".to_string()]);
        Ok(())
    }
}
