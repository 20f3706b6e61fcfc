//! Advisory publication leases keyed by (content id, channel).
//!
//! A lease marks a publish attempt as in flight. Leases carry no owner: the
//! worker that acquired one releases it, and a lease older than the TTL is
//! treated as abandoned and reclaimed by the next `acquire`.
//!
//! `acquire` never waits for a holder. It is a check-and-set against the
//! backing [`LeaseStore`], which is process-local by default; see
//! [`super::SqliteLeaseStore`] for a store shared between processes.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

use std::{collections::HashMap, sync::Arc, time::Duration as StdDuration};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};

use crate::{
    config::LeaseConfig,
    content::{ChannelName, ContentId, LeaseKey},
    shutdown::ShutdownSignal,
    Error, Result,
};

/// Default lease TTL in seconds (5 minutes).
pub const DEFAULT_TTL_SECS: i64 = 300;

/// Default lease ceiling before the sweep starts evicting.
pub const DEFAULT_MAX_LEASES: usize = 500;

/// A live lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lease {
    pub content_id: ContentId,
    pub channel: ChannelName,
    pub acquired_at: DateTime<Utc>,
}

impl Lease {
    #[must_use]
    pub fn key(&self) -> LeaseKey {
        (self.content_id.clone(), self.channel.clone())
    }
}

/// Result of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Leases removed because they outlived the TTL.
    pub expired: usize,
    /// Leases evicted because the ceiling was exceeded.
    pub evicted: usize,
    /// Leases left after the sweep.
    pub remaining: usize,
}

/// Storage behind the lease coordinator.
///
/// Every method takes the clock reading from the caller so implementations
/// agree on "now" and tests can move time explicitly.
#[async_trait]
pub trait LeaseStore: Send + Sync + std::fmt::Debug {
    /// Create the lease iff no lease at most `ttl` old exists for the key.
    /// An older lease is replaced. Returns whether the caller now holds it.
    async fn try_acquire(&self, key: &LeaseKey, now: DateTime<Utc>, ttl: Duration)
        -> Result<bool>;

    /// Remove the lease. Returns whether one was present.
    async fn release(&self, key: &LeaseKey) -> Result<bool>;

    /// Remove every lease of a content item. Returns the number removed.
    async fn release_all(&self, content_id: &ContentId) -> Result<usize>;

    /// Whether a lease at most `ttl` old exists for the key.
    async fn is_held(&self, key: &LeaseKey, now: DateTime<Utc>, ttl: Duration) -> Result<bool>;

    /// Remove leases acquired strictly before `cutoff`.
    async fn remove_acquired_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Remove the `count` oldest leases by acquisition time.
    async fn evict_oldest(&self, count: usize) -> Result<usize>;

    /// Number of stored leases, live or not yet swept.
    async fn len(&self) -> Result<usize>;

    /// All stored leases, oldest first.
    async fn snapshot(&self) -> Result<Vec<Lease>>;
}

/// Process-local lease store.
///
/// The map lock is held only for the check-and-set itself, never across an
/// await on anything else.
#[derive(Debug, Default)]
pub struct MemoryLeaseStore {
    leases: Mutex<HashMap<LeaseKey, DateTime<Utc>>>,
}

impl MemoryLeaseStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn try_acquire(
        &self,
        key: &LeaseKey,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool> {
        let mut leases = self.leases.lock().await;
        match leases.get(key) {
            Some(acquired_at) if now - *acquired_at <= ttl => Ok(false),
            Some(acquired_at) => {
                tracing::warn!(
                    content_id = %key.0,
                    channel = %key.1,
                    acquired_at = %acquired_at,
                    "Reclaiming abandoned lease"
                );
                leases.insert(key.clone(), now);
                Ok(true)
            }
            None => {
                leases.insert(key.clone(), now);
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &LeaseKey) -> Result<bool> {
        Ok(self.leases.lock().await.remove(key).is_some())
    }

    async fn release_all(&self, content_id: &ContentId) -> Result<usize> {
        let mut leases = self.leases.lock().await;
        let before = leases.len();
        leases.retain(|(id, _), _| id != content_id);
        Ok(before - leases.len())
    }

    async fn is_held(&self, key: &LeaseKey, now: DateTime<Utc>, ttl: Duration) -> Result<bool> {
        Ok(self
            .leases
            .lock()
            .await
            .get(key)
            .is_some_and(|acquired_at| now - *acquired_at <= ttl))
    }

    async fn remove_acquired_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut leases = self.leases.lock().await;
        let before = leases.len();
        leases.retain(|_, acquired_at| *acquired_at >= cutoff);
        Ok(before - leases.len())
    }

    async fn evict_oldest(&self, count: usize) -> Result<usize> {
        let mut leases = self.leases.lock().await;
        let mut by_age: Vec<(LeaseKey, DateTime<Utc>)> =
            leases.iter().map(|(k, at)| (k.clone(), *at)).collect();
        by_age.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        let victims: Vec<LeaseKey> = by_age.into_iter().take(count).map(|(k, _)| k).collect();
        for key in &victims {
            leases.remove(key);
        }
        Ok(victims.len())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.leases.lock().await.len())
    }

    async fn snapshot(&self) -> Result<Vec<Lease>> {
        let mut all: Vec<Lease> = self
            .leases
            .lock()
            .await
            .iter()
            .map(|((content_id, channel), acquired_at)| Lease {
                content_id: content_id.clone(),
                channel: channel.clone(),
                acquired_at: *acquired_at,
            })
            .collect();
        all.sort_by(|a, b| a.acquired_at.cmp(&b.acquired_at).then_with(|| a.key().cmp(&b.key())));
        Ok(all)
    }
}

/// Lease timing and capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseSettings {
    pub ttl: Duration,
    pub sweep_interval: StdDuration,
    pub max_leases: usize,
}

impl Default for LeaseSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::seconds(DEFAULT_TTL_SECS),
            sweep_interval: StdDuration::from_secs(300),
            max_leases: DEFAULT_MAX_LEASES,
        }
    }
}

impl From<&LeaseConfig> for LeaseSettings {
    fn from(config: &LeaseConfig) -> Self {
        Self {
            ttl: Duration::seconds(i64::try_from(config.ttl_secs).unwrap_or(DEFAULT_TTL_SECS)),
            sweep_interval: StdDuration::from_secs(config.sweep_interval_secs),
            max_leases: config.max_leases,
        }
    }
}

/// Grants at most one live lease per (content id, channel).
#[derive(Debug, Clone)]
pub struct LeaseCoordinator {
    store: Arc<dyn LeaseStore>,
    settings: LeaseSettings,
}

impl LeaseCoordinator {
    #[must_use]
    pub fn new(store: Arc<dyn LeaseStore>, settings: LeaseSettings) -> Self {
        Self { store, settings }
    }

    /// Coordinator over a fresh process-local store.
    #[must_use]
    pub fn in_memory(settings: LeaseSettings) -> Self {
        Self::new(Arc::new(MemoryLeaseStore::new()), settings)
    }

    #[must_use]
    pub const fn settings(&self) -> &LeaseSettings {
        &self.settings
    }

    /// Try to take the lease. `false` means another attempt is in flight.
    pub async fn acquire(&self, content_id: &ContentId, channel: &ChannelName) -> Result<bool> {
        self.acquire_at(content_id, channel, Utc::now()).await
    }

    /// [`Self::acquire`] against an explicit clock reading.
    pub async fn acquire_at(
        &self,
        content_id: &ContentId,
        channel: &ChannelName,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let key = (content_id.clone(), channel.clone());
        let acquired = self.store.try_acquire(&key, now, self.settings.ttl).await?;
        if acquired {
            tracing::debug!(content_id = %content_id, channel = %channel, "Lease acquired");
        } else {
            tracing::debug!(content_id = %content_id, channel = %channel, "Lease denied");
        }
        Ok(acquired)
    }

    /// [`Self::acquire_at`] as a `Result`: a held key is [`Error::LockDenied`].
    pub async fn claim_at(
        &self,
        content_id: &ContentId,
        channel: &ChannelName,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.acquire_at(content_id, channel, now).await? {
            Ok(())
        } else {
            Err(Error::LockDenied {
                content_id: content_id.to_string(),
                channel: channel.to_string(),
            })
        }
    }

    /// Drop the lease. Releasing a lease that is not held is a no-op.
    pub async fn release(&self, content_id: &ContentId, channel: &ChannelName) -> Result<()> {
        let key = (content_id.clone(), channel.clone());
        if self.store.release(&key).await? {
            tracing::debug!(content_id = %content_id, channel = %channel, "Lease released");
        } else {
            tracing::debug!(
                content_id = %content_id,
                channel = %channel,
                "Release without a lease (double release or reclaimed)"
            );
        }
        Ok(())
    }

    /// Drop every lease of a content item.
    pub async fn release_all(&self, content_id: &ContentId) -> Result<()> {
        let removed = self.store.release_all(content_id).await?;
        tracing::debug!(content_id = %content_id, removed, "Released all leases");
        Ok(())
    }

    pub async fn is_held(&self, content_id: &ContentId, channel: &ChannelName) -> Result<bool> {
        let key = (content_id.clone(), channel.clone());
        self.store.is_held(&key, Utc::now(), self.settings.ttl).await
    }

    pub async fn len(&self) -> Result<usize> {
        self.store.len().await
    }

    pub async fn snapshot(&self) -> Result<Vec<Lease>> {
        self.store.snapshot().await
    }

    /// Remove expired leases, then evict the oldest quarter if still above the ceiling.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let expired = self.store.remove_acquired_before(now - self.settings.ttl).await?;

        let count = self.store.len().await?;
        let evicted = if count > self.settings.max_leases {
            let quartile = (count / 4).max(1);
            let evicted = self.store.evict_oldest(quartile).await?;
            tracing::warn!(
                count,
                max_leases = self.settings.max_leases,
                evicted,
                "Lease ceiling exceeded, evicted oldest quartile"
            );
            evicted
        } else {
            0
        };

        let report = SweepReport {
            expired,
            evicted,
            remaining: count - evicted,
        };
        if expired > 0 {
            tracing::info!(expired, remaining = report.remaining, "Swept expired leases");
        }
        Ok(report)
    }

    /// Run [`Self::sweep`] every `sweep_interval` until shutdown.
    pub async fn run_sweeper(self, mut shutdown: broadcast::Receiver<ShutdownSignal>) {
        let mut interval = tokio::time::interval(self.settings.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!("Lease sweeper stopping");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.sweep(Utc::now()).await {
                        tracing::warn!(error = %e, "Lease sweep failed");
                    }
                }
            }
        }
    }
}
