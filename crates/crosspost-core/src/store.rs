//! Content store boundary.
//!
//! The store owns content items; the core reads them and writes back
//! [`ContentPatch`]es. Patches are idempotent field writes, so a retried
//! patch after a failed tick cannot corrupt state.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use tokio::sync::RwLock;

use crate::{
    content::{AggregateStatus, ContentId, ContentItem, ContentPatch},
    Error, Result,
};

/// Selection of content items for a dispatcher pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentFilter {
    pub status: AggregateStatus,
    /// Only items due at or before this instant. Items with no due time match.
    pub due_before: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl ContentFilter {
    /// Scheduled items that are due.
    #[must_use]
    pub const fn due(now: DateTime<Utc>, limit: usize) -> Self {
        Self {
            status: AggregateStatus::Scheduled,
            due_before: Some(now),
            limit,
        }
    }

    /// Published items, regardless of due time.
    #[must_use]
    pub const fn published(limit: usize) -> Self {
        Self {
            status: AggregateStatus::Published,
            due_before: None,
            limit,
        }
    }

    /// Whether an item satisfies the filter. A channel-level due time that
    /// has passed makes the item due even if its own time has not.
    #[must_use]
    pub fn matches(&self, item: &ContentItem) -> bool {
        if item.aggregate_status != self.status {
            return false;
        }
        let Some(now) = self.due_before else {
            return true;
        };
        item.scheduled_at.map_or(true, |at| at <= now)
            || item
                .selected_channels()
                .any(|(_, state)| state.scheduled_at.is_some_and(|at| at <= now))
    }
}

/// External store of content items.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fetch one item. Missing items are [`Error::NotFound`].
    async fn get_content_item(&self, id: &ContentId) -> Result<ContentItem>;

    /// Items matching the filter, earliest due first.
    async fn list_due(&self, filter: &ContentFilter) -> Result<Vec<ContentItem>>;

    /// Write the patch's set fields. Unset fields are left untouched.
    async fn patch_content_item(&self, id: &ContentId, patch: &ContentPatch) -> Result<()>;
}

/// In-process store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    items: RwLock<BTreeMap<ContentId, ContentItem>>,
}

impl MemoryContentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store populated with the given items.
    #[must_use]
    pub fn with_items(items: impl IntoIterator<Item = ContentItem>) -> Self {
        Self {
            items: RwLock::new(items.into_iter().map(|item| (item.id.clone(), item)).collect()),
        }
    }

    /// Insert or replace an item.
    pub async fn insert(&self, item: ContentItem) {
        self.items.write().await.insert(item.id.clone(), item);
    }

    /// Current copy of an item.
    pub async fn snapshot(&self, id: &ContentId) -> Option<ContentItem> {
        self.items.read().await.get(id).cloned()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn get_content_item(&self, id: &ContentId) -> Result<ContentItem> {
        self.items
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("content item '{id}'")))
    }

    async fn list_due(&self, filter: &ContentFilter) -> Result<Vec<ContentItem>> {
        Ok(self
            .items
            .read()
            .await
            .values()
            .filter(|item| filter.matches(item))
            .sorted_by_key(|item| (item.scheduled_at, item.id.clone()))
            .take(filter.limit)
            .cloned()
            .collect())
    }

    async fn patch_content_item(&self, id: &ContentId, patch: &ContentPatch) -> Result<()> {
        let mut items = self.items.write().await;
        let item = items
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("content item '{id}'")))?;
        patch.apply_to(item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::content::ChannelState;

    #[tokio::test]
    async fn test_list_due_filters_status_and_time() -> Result<()> {
        let now = Utc::now();
        let store = MemoryContentStore::with_items([
            ContentItem::new("due", AggregateStatus::Scheduled)
                .with_scheduled_at(now - Duration::minutes(1)),
            ContentItem::new("later", AggregateStatus::Scheduled)
                .with_scheduled_at(now + Duration::hours(1)),
            ContentItem::new("undated", AggregateStatus::Scheduled),
            ContentItem::new("draft", AggregateStatus::Draft),
        ]);

        let due = store.list_due(&ContentFilter::due(now, 10)).await?;
        let ids: Vec<&str> = due.iter().map(|item| item.id.as_str()).collect();

        assert_eq!(ids, vec!["undated", "due"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_channel_due_time_makes_item_due() -> Result<()> {
        let now = Utc::now();
        let item = ContentItem::new("c-1", AggregateStatus::Scheduled)
            .with_scheduled_at(now + Duration::hours(1))
            .with_channel(
                "telegram",
                ChannelState {
                    scheduled_at: Some(now - Duration::minutes(1)),
                    ..ChannelState::default()
                },
            );
        let store = MemoryContentStore::with_items([item]);

        assert_eq!(store.list_due(&ContentFilter::due(now, 10)).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_patch_missing_item_is_not_found() {
        let store = MemoryContentStore::new();
        let result = store
            .patch_content_item(&ContentId::new("ghost"), &ContentPatch::default())
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_patch_is_idempotent() -> Result<()> {
        let id = ContentId::new("c-1");
        let store =
            MemoryContentStore::with_items([ContentItem::new("c-1", AggregateStatus::Scheduled)]);
        let patch = ContentPatch {
            aggregate_status: Some(AggregateStatus::Published),
            ..ContentPatch::default()
        };

        store.patch_content_item(&id, &patch).await?;
        store.patch_content_item(&id, &patch).await?;

        let item = store.get_content_item(&id).await?;
        assert_eq!(item.aggregate_status, AggregateStatus::Published);
        Ok(())
    }
}
