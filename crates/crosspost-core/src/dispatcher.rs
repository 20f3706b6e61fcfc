//! Polling dispatcher.
//!
//! Each tick walks due content through the same four steps:
//!
//! ```text
//! discover  scheduled items whose due time has passed
//! plan      selected channels that still need a publish attempt
//! guard     take the (content, channel) lease, skip the channel if denied
//! act       call the gateway, commit the outcome, reconcile, release
//! ```
//!
//! followed by an audit pass over published items. Manual "publish now"
//! requests run the identical plan/guard/act path for one item.
//!
//! Failures stay local: a failed channel is recorded on that channel, a
//! failed item is logged and counted, and only a store that cannot list
//! work fails the tick as a whole. The next tick retries.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration as StdDuration,
};

use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tracing::Instrument;

use crate::{
    config::DispatcherConfig,
    content::{ChannelName, ChannelStatus, ContentId, ContentItem, ContentPatch, PublishOutcome},
    coordination::LeaseCoordinator,
    gateway::{PublishDispatch, PublishGateway},
    reconcile::{
        audit_published, classify, derive_aggregate_status_with, reconcile_in_place,
        AuditCorrection, ChannelClass, Finalize, Reconciliation,
    },
    session::SessionCache,
    shutdown::ShutdownSignal,
    store::{ContentFilter, ContentStore},
    Error, Result,
};

/// Store writes per channel outcome before the attempt gives up.
const COMMIT_ATTEMPTS: u32 = 3;
const COMMIT_RETRY_DELAY: StdDuration = StdDuration::from_millis(100);

/// Dispatcher tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherSettings {
    pub tick_interval: StdDuration,
    pub audit_enabled: bool,
    pub due_batch_limit: usize,
    pub audit_batch_limit: usize,
    pub max_concurrent_publishes: usize,
    pub publishing_enabled: bool,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self::from(&DispatcherConfig::default())
    }
}

impl From<&DispatcherConfig> for DispatcherSettings {
    fn from(config: &DispatcherConfig) -> Self {
        Self {
            tick_interval: StdDuration::from_secs(config.tick_interval_secs),
            audit_enabled: config.audit_enabled,
            due_batch_limit: config.due_batch_limit,
            audit_batch_limit: config.audit_batch_limit,
            max_concurrent_publishes: config.max_concurrent_publishes.max(1),
            publishing_enabled: config.publishing_enabled,
        }
    }
}

/// Why a pass is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickMode {
    /// Periodic timer tick: honors due times, leaves failed channels alone.
    Timer,
    /// Operator "publish now": ignores due times and retries failed channels.
    Manual,
}

/// Channels of one item selected for action in this pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelPlan {
    pub eligible: Vec<ChannelName>,
    /// Channels that need work but are not due yet.
    pub not_due: usize,
}

/// Decide which selected channels get a publish attempt.
///
/// Published channels with a URL or post id are done. Published channels
/// without either are sent again. Failed channels are retried only on a
/// manual pass.
#[must_use]
pub fn plan_channels(item: &ContentItem, mode: TickMode, now: DateTime<Utc>) -> ChannelPlan {
    let mut plan = ChannelPlan::default();
    for (name, state) in item.selected_channels() {
        let needs_work = match classify(state) {
            ChannelClass::Published => !state.has_publication_evidence(),
            ChannelClass::Pending => true,
            ChannelClass::Failed => mode == TickMode::Manual,
        };
        if !needs_work {
            continue;
        }
        if mode == TickMode::Timer && !item.is_channel_due(name, now) {
            plan.not_due += 1;
            continue;
        }
        plan.eligible.push(name.clone());
    }
    plan
}

/// Summary of one dispatcher pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub discovered: usize,
    pub attempted: usize,
    pub published: usize,
    pub failed: usize,
    /// Accepted by the gateway; the outcome arrives as a callback.
    pub accepted: usize,
    pub skipped_lease_denied: usize,
    pub skipped_not_due: usize,
    pub statuses_persisted: usize,
    pub audit_corrections: usize,
    /// Item-level errors that were logged and absorbed.
    pub errors: usize,
    pub auth_unavailable: bool,
    pub publishing_disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ChannelAttempt {
    Committed { published: bool, persisted: bool },
    Accepted,
    LeaseDenied,
    Errored,
}

/// Drives publication. Construct once and share behind an `Arc`.
pub struct Dispatcher {
    store: Arc<dyn ContentStore>,
    gateway: Arc<dyn PublishGateway>,
    leases: LeaseCoordinator,
    session: Option<SessionCache>,
    settings: DispatcherSettings,
    /// Serializes read-modify-patch of items so sibling outcomes never overwrite each other.
    commit_lock: Mutex<()>,
    ticks: AtomicU64,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("settings", &self.settings)
            .field("ticks", &self.ticks.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        store: Arc<dyn ContentStore>,
        gateway: Arc<dyn PublishGateway>,
        leases: LeaseCoordinator,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            store,
            gateway,
            leases,
            session: None,
            settings,
            commit_lock: Mutex::new(()),
            ticks: AtomicU64::new(0),
        }
    }

    /// Require a credential before each pass; without one the pass is skipped.
    #[must_use]
    pub fn with_session(mut self, session: SessionCache) -> Self {
        self.session = Some(session);
        self
    }

    #[must_use]
    pub const fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    #[must_use]
    pub const fn leases(&self) -> &LeaseCoordinator {
        &self.leases
    }

    /// One timer tick.
    pub async fn run_tick(&self) -> Result<TickReport> {
        self.run_tick_at(Utc::now()).await
    }

    /// One timer tick against an explicit clock reading.
    pub async fn run_tick_at(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let mut report = self.start_report();
        if !self.credential_available(&mut report).await {
            return Ok(report);
        }

        let items = self
            .store
            .list_due(&ContentFilter::due(now, self.settings.due_batch_limit))
            .await?;
        report.discovered = items.len();

        self.process(items, TickMode::Timer, now, &mut report).await;

        if self.settings.audit_enabled {
            self.audit_pass(now, &mut report).await;
        }

        tracing::info!(
            tick = report.tick,
            discovered = report.discovered,
            attempted = report.attempted,
            published = report.published,
            failed = report.failed,
            persisted = report.statuses_persisted,
            audit_corrections = report.audit_corrections,
            "Tick complete"
        );
        Ok(report)
    }

    /// Manual "publish now" for one item through the same path as a tick.
    pub async fn publish_now(&self, content_id: &ContentId) -> Result<TickReport> {
        let now = Utc::now();
        let mut report = self.start_report();
        if !self.credential_available(&mut report).await {
            return Err(Error::auth_unavailable("no credential for publish request"));
        }

        let item = self.store.get_content_item(content_id).await?;
        report.discovered = 1;
        tracing::info!(content_id = %content_id, "Publish requested");

        self.process(vec![item], TickMode::Manual, now, &mut report).await;
        Ok(report)
    }

    /// Record a gateway outcome delivered by callback, then release the lease.
    ///
    /// The lease stays held if the outcome cannot be stored.
    pub async fn record_outcome(
        &self,
        content_id: &ContentId,
        channel: &ChannelName,
        outcome: &PublishOutcome,
    ) -> Result<Reconciliation> {
        let result = self
            .commit_with_retry(content_id, channel, outcome, Utc::now())
            .await?;
        self.release_lease(content_id, channel).await;
        Ok(result)
    }

    /// Current derived status of an item, without persisting anything.
    pub async fn inspect(&self, content_id: &ContentId) -> Result<(ContentItem, Reconciliation)> {
        let item = self.store.get_content_item(content_id).await?;
        let derived = derive_aggregate_status_with(&item, Finalize::Observed);
        Ok((item, derived))
    }

    /// Tick every `tick_interval` until shutdown. Tick errors are logged and
    /// retried on the next interval.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<ShutdownSignal>) {
        let mut interval = tokio::time::interval(self.settings.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(
            interval_secs = self.settings.tick_interval.as_secs(),
            publishing_enabled = self.settings.publishing_enabled,
            "Dispatcher started"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Dispatcher stopping");
                    break;
                }
                _ = interval.tick() => {
                    let tick = self.ticks.load(Ordering::Relaxed) + 1;
                    let span = tracing::info_span!("tick", tick);
                    if let Err(e) = self.run_tick().instrument(span).await {
                        tracing::warn!(tick, error = %e, "Tick failed, retrying next interval");
                    }
                }
            }
        }
    }

    fn start_report(&self) -> TickReport {
        TickReport {
            tick: self.ticks.fetch_add(1, Ordering::Relaxed) + 1,
            publishing_disabled: !self.settings.publishing_enabled,
            ..TickReport::default()
        }
    }

    async fn credential_available(&self, report: &mut TickReport) -> bool {
        let Some(session) = &self.session else {
            return true;
        };
        match session.get_token().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "No credential this cycle, skipping");
                report.auth_unavailable = true;
                false
            }
        }
    }

    async fn process(
        &self,
        items: Vec<ContentItem>,
        mode: TickMode,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) {
        let mut work: Vec<(ContentId, ChannelName)> = Vec::new();
        let mut discovered: Vec<ContentItem> = Vec::with_capacity(items.len());

        for item in items {
            let plan = plan_channels(&item, mode, now);
            report.skipped_not_due += plan.not_due;

            if !plan.eligible.is_empty() {
                if self.settings.publishing_enabled {
                    let id = &item.id;
                    work.extend(plan.eligible.into_iter().map(|channel| (id.clone(), channel)));
                } else {
                    tracing::debug!(
                        content_id = %item.id,
                        channels = plan.eligible.len(),
                        "Publishing disabled, not sending"
                    );
                }
            }
            discovered.push(item);
        }

        report.attempted = work.len();
        let attempts: Vec<(ContentId, ChannelAttempt)> = stream::iter(work)
            .map(|(content_id, channel)| async move {
                let attempt = self.attempt_channel(&content_id, &channel, now).await;
                (content_id, attempt)
            })
            .buffer_unordered(self.settings.max_concurrent_publishes)
            .collect()
            .await;

        let mut committed: BTreeSet<ContentId> = BTreeSet::new();
        for (content_id, attempt) in attempts {
            match attempt {
                ChannelAttempt::Committed { published, persisted } => {
                    if published {
                        report.published += 1;
                    } else {
                        report.failed += 1;
                    }
                    if persisted {
                        report.statuses_persisted += 1;
                    }
                    committed.insert(content_id);
                }
                ChannelAttempt::Accepted => report.accepted += 1,
                ChannelAttempt::LeaseDenied => report.skipped_lease_denied += 1,
                ChannelAttempt::Errored => report.errors += 1,
            }
        }

        let finalize = match mode {
            TickMode::Timer => Finalize::Observed,
            TickMode::Manual => Finalize::Requested,
        };
        for item in discovered {
            if committed.contains(&item.id) {
                continue;
            }
            match self.reconcile_snapshot(&item, finalize, now).await {
                Ok(true) => report.statuses_persisted += 1,
                Ok(false) => {}
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(content_id = %item.id, error = %e, "Reconciliation failed");
                }
            }
        }
    }

    async fn attempt_channel(
        &self,
        content_id: &ContentId,
        channel: &ChannelName,
        now: DateTime<Utc>,
    ) -> ChannelAttempt {
        match self.leases.claim_at(content_id, channel, now).await {
            Ok(()) => {}
            Err(e @ Error::LockDenied { .. }) => {
                tracing::debug!(error = %e, "Skipping channel this tick");
                return ChannelAttempt::LeaseDenied;
            }
            Err(e) => {
                tracing::warn!(
                    content_id = %content_id,
                    channel = %channel,
                    error = %e,
                    "Lease check failed"
                );
                return ChannelAttempt::Errored;
            }
        }

        let outcome = match self.gateway.publish(content_id, channel).await {
            Ok(PublishDispatch::Completed(outcome)) => outcome,
            Ok(PublishDispatch::Accepted) => {
                tracing::debug!(
                    content_id = %content_id,
                    channel = %channel,
                    "Publish accepted, awaiting callback"
                );
                return ChannelAttempt::Accepted;
            }
            Err(e) => PublishOutcome::failed(e.to_string()),
        };

        match self.commit_with_retry(content_id, channel, &outcome, now).await {
            Ok(result) => {
                self.release_lease(content_id, channel).await;
                ChannelAttempt::Committed {
                    published: outcome.status == ChannelStatus::Published,
                    persisted: result.should_persist,
                }
            }
            Err(e) => {
                // The gateway already acted; the lease guards the key until its TTL.
                tracing::warn!(
                    content_id = %content_id,
                    channel = %channel,
                    status = %outcome.status,
                    ttl_secs = self.leases.settings().ttl.num_seconds(),
                    error = %e,
                    "Could not record publish outcome, keeping lease until it expires"
                );
                ChannelAttempt::Errored
            }
        }
    }

    /// [`Self::commit_outcome`], retried while the store reports a transient failure.
    async fn commit_with_retry(
        &self,
        content_id: &ContentId,
        channel: &ChannelName,
        outcome: &PublishOutcome,
        now: DateTime<Utc>,
    ) -> Result<Reconciliation> {
        let mut attempt = 1;
        loop {
            match self.commit_outcome(content_id, channel, outcome, now).await {
                Err(e) if e.is_retryable() && attempt < COMMIT_ATTEMPTS => {
                    tracing::debug!(
                        content_id = %content_id,
                        channel = %channel,
                        attempt,
                        error = %e,
                        "Commit failed, retrying"
                    );
                    tokio::time::sleep(COMMIT_RETRY_DELAY * attempt).await;
                    attempt += 1;
                }
                committed => return committed,
            }
        }
    }

    async fn release_lease(&self, content_id: &ContentId, channel: &ChannelName) {
        if let Err(e) = self.leases.release(content_id, channel).await {
            tracing::warn!(
                content_id = %content_id,
                channel = %channel,
                error = %e,
                "Lease release failed"
            );
        }
    }

    /// Read-modify-patch one channel outcome and the reconciled aggregate.
    async fn commit_outcome(
        &self,
        content_id: &ContentId,
        channel: &ChannelName,
        outcome: &PublishOutcome,
        now: DateTime<Utc>,
    ) -> Result<Reconciliation> {
        let _guard = self.commit_lock.lock().await;
        let mut item = self.store.get_content_item(content_id).await?;

        let state = item.channel_states.get_mut(channel).ok_or_else(|| {
            Error::NotFound(format!("channel '{channel}' on content item '{content_id}'"))
        })?;
        state.apply_outcome(outcome, now);

        match &state.error {
            Some(error) if outcome.status != ChannelStatus::Published => {
                tracing::warn!(
                    content_id = %content_id,
                    channel = %channel,
                    status = %outcome.status,
                    error = %error,
                    "Channel publish failed"
                );
            }
            _ => {
                tracing::info!(
                    content_id = %content_id,
                    channel = %channel,
                    status = %outcome.status,
                    "Channel outcome recorded"
                );
            }
        }

        let (result, status_patch) = reconcile_in_place(&mut item, Finalize::Observed, now);
        let patch = ContentPatch {
            channel_states: Some(item.channel_states.clone()),
            ..status_patch.unwrap_or_default()
        };
        self.store.patch_content_item(content_id, &patch).await?;

        if result.should_persist {
            tracing::info!(
                content_id = %content_id,
                from = %result.previous,
                status = %result.status,
                rule = %result.rule,
                "Aggregate status changed"
            );
        }
        Ok(result)
    }

    /// Persist the derived status of an item no channel work touched.
    ///
    /// The snapshot only decides whether to look closer; the write is
    /// computed from a fresh read under the commit lock.
    async fn reconcile_snapshot(
        &self,
        snapshot: &ContentItem,
        finalize: Finalize,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if !derive_aggregate_status_with(snapshot, finalize).should_persist {
            return Ok(false);
        }

        let _guard = self.commit_lock.lock().await;
        let mut item = self.store.get_content_item(&snapshot.id).await?;
        let (result, patch) = reconcile_in_place(&mut item, finalize, now);
        let Some(patch) = patch else {
            return Ok(false);
        };
        self.store.patch_content_item(&item.id, &patch).await?;
        tracing::info!(
            content_id = %item.id,
            from = %result.previous,
            status = %result.status,
            rule = %result.rule,
            "Aggregate status changed"
        );
        Ok(true)
    }

    async fn audit_pass(&self, now: DateTime<Utc>, report: &mut TickReport) {
        let published = match self
            .store
            .list_due(&ContentFilter::published(self.settings.audit_batch_limit))
            .await
        {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(error = %e, "Audit pass skipped, store unavailable");
                report.errors += 1;
                return;
            }
        };

        for item in published {
            if audit_published(&item, now).is_none() {
                continue;
            }
            match self.apply_audit(&item.id, now).await {
                Ok(Some(correction)) => {
                    report.audit_corrections += 1;
                    report.statuses_persisted += 1;
                    tracing::warn!(
                        content_id = %item.id,
                        reason = %correction.reason,
                        reset = correction.reset_channels.len(),
                        waiting = correction.waiting_channels.len(),
                        status = %AuditCorrection::DEMOTED_STATUS,
                        "Published item demoted by audit"
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(content_id = %item.id, error = %e, "Audit correction failed");
                }
            }
        }
    }

    async fn apply_audit(
        &self,
        content_id: &ContentId,
        now: DateTime<Utc>,
    ) -> Result<Option<AuditCorrection>> {
        let _guard = self.commit_lock.lock().await;
        let mut item = self.store.get_content_item(content_id).await?;
        let Some(correction) = audit_published(&item, now) else {
            return Ok(None);
        };
        let patch = correction.apply(&mut item);
        self.store.patch_content_item(content_id, &patch).await?;
        Ok(Some(correction))
    }
}
