//! Shared fakes for integration tests.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use crosspost_core::{
    coordination::{LeaseCoordinator, LeaseSettings},
    session::{Credential, IdentityProvider},
    ChannelName, ContentFilter, ContentId, ContentItem, ContentPatch, ContentStore, Dispatcher,
    DispatcherSettings, Error, MemoryContentStore, PublishDispatch, PublishGateway,
    PublishOutcome, Result,
};

/// Gateway answering per channel from a script. Unscripted channels publish.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    script: Mutex<HashMap<String, PublishDispatch>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn answer(self, channel: &str, dispatch: PublishDispatch) -> Self {
        self.script
            .lock()
            .unwrap()
            .insert(channel.to_string(), dispatch);
        self
    }

    pub fn fail(self, channel: &str, error: &str) -> Self {
        self.answer(
            channel,
            PublishDispatch::Completed(PublishOutcome::failed(error)),
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PublishGateway for ScriptedGateway {
    async fn publish(
        &self,
        content_id: &ContentId,
        channel: &ChannelName,
    ) -> Result<PublishDispatch> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.script.lock().unwrap().get(channel.as_str()).cloned();
        Ok(scripted.unwrap_or_else(|| {
            PublishDispatch::Completed(PublishOutcome::published(format!(
                "https://{channel}.example/{content_id}"
            )))
        }))
    }
}

/// Identity provider that counts logins and answers after a delay.
#[derive(Debug)]
pub struct SlowIdentity {
    pub logins: AtomicUsize,
    pub delay: Duration,
    pub fail: bool,
}

impl SlowIdentity {
    pub fn succeeding(delay: Duration) -> Self {
        Self {
            logins: AtomicUsize::new(0),
            delay,
            fail: false,
        }
    }

    pub fn failing(delay: Duration) -> Self {
        Self {
            logins: AtomicUsize::new(0),
            delay,
            fail: true,
        }
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for SlowIdentity {
    async fn login(&self) -> Result<Credential> {
        let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(Error::auth_unavailable("invalid credentials"));
        }
        Ok(Credential::new(
            format!("token-{n}"),
            Utc::now() + ChronoDuration::hours(1),
        ))
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<Credential> {
        Err(Error::auth_unavailable("refresh not supported"))
    }
}

pub fn channel(name: &str) -> ChannelName {
    ChannelName::parse(name).unwrap()
}

/// Memory store whose next listings or patches fail as if the store were down.
#[derive(Debug)]
pub struct FlakyStore {
    inner: Arc<MemoryContentStore>,
    failing_lists: AtomicUsize,
    failing_patches: AtomicUsize,
    patch_attempts: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryContentStore>) -> Self {
        Self {
            inner,
            failing_lists: AtomicUsize::new(0),
            failing_patches: AtomicUsize::new(0),
            patch_attempts: AtomicUsize::new(0),
        }
    }

    pub fn fail_next_lists(self, count: usize) -> Self {
        self.failing_lists.store(count, Ordering::SeqCst);
        self
    }

    pub fn fail_next_patches(self, count: usize) -> Self {
        self.failing_patches.store(count, Ordering::SeqCst);
        self
    }

    /// Stop failing.
    pub fn recover(&self) {
        self.failing_lists.store(0, Ordering::SeqCst);
        self.failing_patches.store(0, Ordering::SeqCst);
    }

    pub fn patch_attempts(&self) -> usize {
        self.patch_attempts.load(Ordering::SeqCst)
    }
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl ContentStore for FlakyStore {
    async fn get_content_item(&self, id: &ContentId) -> Result<ContentItem> {
        self.inner.get_content_item(id).await
    }

    async fn list_due(&self, filter: &ContentFilter) -> Result<Vec<ContentItem>> {
        if take_failure(&self.failing_lists) {
            return Err(Error::store_unavailable("503 Service Unavailable"));
        }
        self.inner.list_due(filter).await
    }

    async fn patch_content_item(&self, id: &ContentId, patch: &ContentPatch) -> Result<()> {
        self.patch_attempts.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failing_patches) {
            return Err(Error::store_unavailable("502 Bad Gateway"));
        }
        self.inner.patch_content_item(id, patch).await
    }
}

/// Dispatcher over in-memory store and leases.
pub fn dispatcher(
    store: &Arc<MemoryContentStore>,
    gateway: &Arc<ScriptedGateway>,
    settings: DispatcherSettings,
) -> Dispatcher {
    dispatcher_over(Arc::clone(store) as _, gateway, settings)
}

/// Dispatcher over any store, with in-memory leases.
pub fn dispatcher_over(
    store: Arc<dyn ContentStore>,
    gateway: &Arc<ScriptedGateway>,
    settings: DispatcherSettings,
) -> Dispatcher {
    Dispatcher::new(
        store,
        Arc::clone(gateway) as _,
        LeaseCoordinator::in_memory(LeaseSettings::default()),
        settings,
    )
}
