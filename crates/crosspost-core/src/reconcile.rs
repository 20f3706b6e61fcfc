//! Status Reconciliation (Pure Domain Logic)
//!
//! Derives one aggregate status for a content item from its per-channel states.
//! Every path that changes channel state recomputes through
//! [`derive_aggregate_status`] instead of deciding the aggregate ad hoc.
//!
//! # Rules
//!
//! ```text
//! selected = channels with selected == true
//! partition selected into published | pending (pending/scheduled, no error) | failed
//!
//! B  pending non-empty              -> keep current (draft is promoted to scheduled)
//! A  pending empty, published > 0   -> published   (partial success counts)
//! C  pending empty, published == 0,
//!    failed > 0                     -> failed      (never replaces published)
//! -  no selected channels           -> unchanged, or published on explicit finalize
//! ```
//!
//! Rule B is checked first, so a pending channel always blocks `published`.
//! The functions here never touch `selected`, URLs or ids and have no side
//! effects; redundant invocation from several callers is harmless.

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;

use crate::content::{
    AggregateStatus, ChannelName, ChannelState, ChannelStatus, ContentItem, ContentPatch,
};

/// Whether the caller is explicitly finalizing publication of the item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Finalize {
    /// Recompute from observed channel data only.
    #[default]
    Observed,
    /// The caller finished a publish request; an item with no selected
    /// channels is then treated as published.
    Requested,
}

/// The rule that produced a reconciliation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Rule {
    /// No selected channels and no explicit finalize.
    NoSelectedChannels,
    /// Explicit finalize of an item with no selected channels.
    FinalizedWithoutChannels,
    /// Rule A: nothing pending and at least one channel published.
    AllClear,
    /// Rule B: at least one selected channel still pending.
    StillWorking,
    /// Rule C: nothing pending, nothing published, something failed.
    TotalFailure,
    /// Rule C matched but the item is already published.
    KeepPublished,
}

/// Selected channels grouped by publication outcome. Names are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChannelPartition {
    pub published: Vec<ChannelName>,
    pub pending: Vec<ChannelName>,
    pub failed: Vec<ChannelName>,
}

/// Where a selected channel lands in the partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelClass {
    Published,
    Pending,
    Failed,
}

/// Classify one channel. Published wins over a stale error string; otherwise
/// any error marks the channel failed.
#[must_use]
pub const fn classify(state: &ChannelState) -> ChannelClass {
    match state.status {
        ChannelStatus::Published => ChannelClass::Published,
        ChannelStatus::Failed => ChannelClass::Failed,
        ChannelStatus::Pending | ChannelStatus::Scheduled => {
            if state.error.is_some() {
                ChannelClass::Failed
            } else {
                ChannelClass::Pending
            }
        }
    }
}

impl ChannelPartition {
    /// Partition the selected channels of an item.
    #[must_use]
    pub fn of(item: &ContentItem) -> Self {
        let mut partition = Self::default();
        for (name, state) in item.selected_channels() {
            let bucket = match classify(state) {
                ChannelClass::Published => &mut partition.published,
                ChannelClass::Pending => &mut partition.pending,
                ChannelClass::Failed => &mut partition.failed,
            };
            bucket.push(name.clone());
        }
        partition.published.sort();
        partition.pending.sort();
        partition.failed.sort();
        partition
    }

    #[must_use]
    pub fn selected_count(&self) -> usize {
        self.published.len() + self.pending.len() + self.failed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selected_count() == 0
    }
}

/// Outcome of reconciling one content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    /// Aggregate status the item should have.
    pub status: AggregateStatus,
    /// Aggregate status the item had when reconciled.
    pub previous: AggregateStatus,
    /// True when `status` differs from the stored aggregate.
    pub should_persist: bool,
    pub rule: Rule,
    pub partition: ChannelPartition,
}

impl Reconciliation {
    /// Build the store patch for this result, stamping `published_at` on the
    /// first transition to published. `None` when nothing needs writing.
    #[must_use]
    pub fn to_patch(&self, item: &ContentItem, now: DateTime<Utc>) -> Option<ContentPatch> {
        if !self.should_persist {
            return None;
        }
        let published_at = (self.status == AggregateStatus::Published
            && item.published_at.is_none())
        .then_some(now);
        Some(ContentPatch {
            aggregate_status: Some(self.status),
            channel_states: None,
            published_at,
        })
    }
}

/// Derive the aggregate status from observed channel data.
#[must_use]
pub fn derive_aggregate_status(item: &ContentItem) -> Reconciliation {
    derive_aggregate_status_with(item, Finalize::Observed)
}

/// Derive the aggregate status, optionally as an explicit finalize.
#[must_use]
pub fn derive_aggregate_status_with(item: &ContentItem, finalize: Finalize) -> Reconciliation {
    let current = item.aggregate_status;
    let partition = ChannelPartition::of(item);

    let (status, rule) = if partition.is_empty() {
        match finalize {
            Finalize::Requested => (AggregateStatus::Published, Rule::FinalizedWithoutChannels),
            Finalize::Observed => (current, Rule::NoSelectedChannels),
        }
    } else if !partition.pending.is_empty() {
        let status = match current {
            AggregateStatus::Draft => AggregateStatus::Scheduled,
            other => other,
        };
        (status, Rule::StillWorking)
    } else if !partition.published.is_empty() {
        (AggregateStatus::Published, Rule::AllClear)
    } else if current == AggregateStatus::Published {
        (AggregateStatus::Published, Rule::KeepPublished)
    } else {
        (AggregateStatus::Failed, Rule::TotalFailure)
    };

    Reconciliation {
        status,
        previous: current,
        should_persist: status != current,
        rule,
        partition,
    }
}

/// Reconcile in place and return the patch to persist, if any.
pub fn reconcile_in_place(
    item: &mut ContentItem,
    finalize: Finalize,
    now: DateTime<Utc>,
) -> (Reconciliation, Option<ContentPatch>) {
    let result = derive_aggregate_status_with(item, finalize);
    let patch = result.to_patch(item, now);
    if let Some(patch) = &patch {
        patch.apply_to(item);
    }
    (result, patch)
}

/// Why the audit pass demoted a published item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditReason {
    /// A selected channel is still pending or scheduled.
    SelectedChannelStillWaiting,
    /// The item's scheduled time lies in the future.
    ScheduledForFuture,
}

/// Self-healing transition for an item that is published but should not be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditCorrection {
    pub reason: AuditReason,
    /// Selected channels marked published without a URL or post id; reset to pending.
    pub reset_channels: Vec<ChannelName>,
    /// Selected channels still waiting at audit time.
    pub waiting_channels: Vec<ChannelName>,
}

impl AuditCorrection {
    /// Status the item is demoted to.
    pub const DEMOTED_STATUS: AggregateStatus = AggregateStatus::Scheduled;

    /// Apply the correction to an in-memory item and return the store patch.
    pub fn apply(&self, item: &mut ContentItem) -> ContentPatch {
        item.aggregate_status = Self::DEMOTED_STATUS;
        for name in &self.reset_channels {
            if let Some(state) = item.channel_states.get_mut(name) {
                state.reset_for_retry();
            }
        }
        ContentPatch {
            aggregate_status: Some(Self::DEMOTED_STATUS),
            channel_states: (!self.reset_channels.is_empty())
                .then(|| item.channel_states.clone()),
            published_at: None,
        }
    }
}

/// Inspect a published item for states that should be impossible.
///
/// Returns `None` for items that are not published or look consistent.
#[must_use]
pub fn audit_published(item: &ContentItem, now: DateTime<Utc>) -> Option<AuditCorrection> {
    if item.aggregate_status != AggregateStatus::Published {
        return None;
    }

    let waiting_channels: Vec<ChannelName> = item
        .selected_channels()
        .filter(|(_, state)| state.status.is_waiting())
        .map(|(name, _)| name.clone())
        .collect();

    if item.is_scheduled_for_future(now) {
        let reset_channels = item
            .selected_channels()
            .filter(|(_, state)| state.is_falsely_published())
            .map(|(name, _)| name.clone())
            .collect();
        return Some(AuditCorrection {
            reason: AuditReason::ScheduledForFuture,
            reset_channels,
            waiting_channels,
        });
    }

    if waiting_channels.is_empty() {
        return None;
    }

    Some(AuditCorrection {
        reason: AuditReason::SelectedChannelStillWaiting,
        reset_channels: Vec::new(),
        waiting_channels,
    })
}
