//! Session cache with single-flight credential refresh.
//!
//! One [`Credential`] is shared by every caller of [`SessionCache::get_token`].
//! When it is missing or expired, the first caller starts a refresh task and
//! every concurrent caller awaits that same task through a shared future;
//! the cache lock is only held to inspect or swap state, never across I/O.
//!
//! # Refresh order
//!
//! 1. Static credential source (long-lived token), when configured
//! 2. Refresh exchange with the cached refresh token, when one exists
//! 3. Login exchange with the identity provider
//!
//! Consecutive failures are counted. When the count reaches the ceiling the
//! cached credential is evicted, every waiter receives a terminal
//! [`Error::AuthUnavailable`], and the count starts over so a later cycle
//! can try again.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

use std::{fmt, sync::Arc, time::Duration as StdDuration};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{broadcast, Mutex};

use crate::{config::SessionConfig, shutdown::ShutdownSignal, Error, Result};

/// A bearer token with its expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    #[must_use]
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            refresh_token: None,
            expires_at,
        }
    }

    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    #[must_use]
    pub fn expires_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.expires_at - now <= window
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Long-lived credential available without a login exchange.
#[async_trait]
pub trait StaticCredentialSource: Send + Sync {
    /// `Ok(None)` when no static credential is configured.
    async fn static_credential(&self) -> Result<Option<Credential>>;
}

/// Upstream identity service.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Interactive login exchange.
    async fn login(&self) -> Result<Credential>;

    /// Exchange a refresh token for a new credential.
    async fn refresh(&self, refresh_token: &str) -> Result<Credential>;
}

/// Refresh policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub refresh_ceiling: u32,
    pub lookahead: Duration,
    pub sweep_interval: StdDuration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            refresh_ceiling: 3,
            lookahead: Duration::minutes(30),
            sweep_interval: StdDuration::from_secs(300),
        }
    }
}

impl From<&SessionConfig> for SessionSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            refresh_ceiling: config.refresh_ceiling,
            lookahead: Duration::seconds(i64::try_from(config.lookahead_secs).unwrap_or(1800)),
            sweep_interval: StdDuration::from_secs(config.sweep_interval_secs),
        }
    }
}

type RefreshFuture = Shared<BoxFuture<'static, Result<Credential>>>;

#[derive(Default)]
struct SessionState {
    credential: Option<Credential>,
    in_flight: Option<RefreshFuture>,
    consecutive_failures: u32,
    closed: bool,
}

struct Inner {
    static_source: Option<Arc<dyn StaticCredentialSource>>,
    identity: Option<Arc<dyn IdentityProvider>>,
    settings: SessionSettings,
    state: Mutex<SessionState>,
}

/// Shared handle to the credential cache. Clones share one cache.
#[derive(Clone)]
pub struct SessionCache {
    inner: Arc<Inner>,
}

impl fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCache")
            .field("settings", &self.inner.settings)
            .field("has_static_source", &self.inner.static_source.is_some())
            .field("has_identity", &self.inner.identity.is_some())
            .finish_non_exhaustive()
    }
}

impl SessionCache {
    #[must_use]
    pub fn new(
        static_source: Option<Arc<dyn StaticCredentialSource>>,
        identity: Option<Arc<dyn IdentityProvider>>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                static_source,
                identity,
                settings,
                state: Mutex::new(SessionState::default()),
            }),
        }
    }

    #[must_use]
    pub fn settings(&self) -> SessionSettings {
        self.inner.settings
    }

    /// Return a valid credential, refreshing first if needed.
    ///
    /// Concurrent callers during a refresh share its result.
    pub async fn get_token(&self) -> Result<Credential> {
        let flight = {
            let mut state = self.inner.state.lock().await;
            if state.closed {
                return Err(Error::auth_exhausted("session cache is shut down"));
            }
            if let Some(credential) = &state.credential {
                if credential.is_valid_at(Utc::now()) {
                    return Ok(credential.clone());
                }
            }
            self.join_or_start(&mut state)
        };
        flight.await
    }

    /// Refresh now if the cached credential expires within the look-ahead window.
    ///
    /// Returns whether a refresh ran.
    pub async fn refresh_if_expiring(&self, now: DateTime<Utc>) -> Result<bool> {
        let flight = {
            let mut state = self.inner.state.lock().await;
            if state.closed {
                return Ok(false);
            }
            let lookahead = self.inner.settings.lookahead;
            let expiring = state
                .credential
                .as_ref()
                .is_some_and(|credential| credential.expires_within(now, lookahead));
            if !expiring {
                return Ok(false);
            }
            self.join_or_start(&mut state)
        };
        flight.await.map(|_| true)
    }

    /// Drop the cached credential, e.g. after the store rejected it.
    pub async fn invalidate(&self) {
        let mut state = self.inner.state.lock().await;
        if state.credential.take().is_some() {
            tracing::info!("Cached credential invalidated");
        }
    }

    pub async fn has_credential(&self) -> bool {
        self.inner.state.lock().await.credential.is_some()
    }

    pub async fn consecutive_failures(&self) -> u32 {
        self.inner.state.lock().await.consecutive_failures
    }

    /// Evict the credential and refuse further requests.
    pub async fn shutdown(&self) {
        let mut state = self.inner.state.lock().await;
        state.closed = true;
        state.credential = None;
        tracing::debug!("Session cache shut down");
    }

    /// Run the look-ahead refresh every `sweep_interval` until shutdown.
    pub async fn run_sweeper(self, mut shutdown: broadcast::Receiver<ShutdownSignal>) {
        let mut interval = tokio::time::interval(self.inner.settings.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!("Credential sweeper stopping");
                    break;
                }
                _ = interval.tick() => {
                    match self.refresh_if_expiring(Utc::now()).await {
                        Ok(true) => tracing::debug!("Credential refreshed ahead of expiry"),
                        Ok(false) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, "Look-ahead credential refresh failed");
                        }
                    }
                }
            }
        }
    }

    fn join_or_start(&self, state: &mut SessionState) -> RefreshFuture {
        if let Some(flight) = &state.in_flight {
            return flight.clone();
        }

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.run_refresh().await });
        let flight = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(Error::auth_unavailable(format!("refresh task failed: {e}"))),
            }
        }
        .boxed()
        .shared();

        state.in_flight = Some(flight.clone());
        flight
    }
}

impl Inner {
    /// Runs detached from any caller, so a cancelled waiter cannot strand the flight.
    async fn run_refresh(&self) -> Result<Credential> {
        let refresh_token = {
            let state = self.state.lock().await;
            state
                .credential
                .as_ref()
                .and_then(|credential| credential.refresh_token.clone())
        };

        let attempt = self.attempt(refresh_token.as_deref()).await;

        let mut state = self.state.lock().await;
        state.in_flight = None;

        match attempt {
            Ok(credential) => {
                state.consecutive_failures = 0;
                state.credential = Some(credential.clone());
                tracing::info!(expires_at = %credential.expires_at, "Credential refreshed");
                Ok(credential)
            }
            Err(e) => {
                state.consecutive_failures += 1;
                let failures = state.consecutive_failures;
                if failures >= self.settings.refresh_ceiling {
                    state.credential = None;
                    state.consecutive_failures = 0;
                    tracing::warn!(
                        failures,
                        error = %e,
                        "Refresh ceiling reached, credential evicted"
                    );
                    Err(Error::auth_exhausted(format!(
                        "{failures} consecutive refresh failures: {e}"
                    )))
                } else {
                    tracing::warn!(failures, error = %e, "Credential refresh failed");
                    Err(Error::auth_unavailable(e.to_string()))
                }
            }
        }
    }

    async fn attempt(&self, refresh_token: Option<&str>) -> Result<Credential> {
        let now = Utc::now();

        if let Some(source) = &self.static_source {
            match source.static_credential().await {
                Ok(Some(credential)) if credential.is_valid_at(now) => return Ok(credential),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Static credential source failed"),
            }
        }

        let Some(identity) = &self.identity else {
            return Err(Error::auth_unavailable("no credential source configured"));
        };

        if let Some(token) = refresh_token {
            match identity.refresh(token).await {
                Ok(credential) if credential.is_valid_at(Utc::now()) => return Ok(credential),
                Ok(_) => tracing::debug!("Refresh exchange returned an expired credential"),
                Err(e) => {
                    tracing::debug!(error = %e, "Refresh exchange failed, falling back to login");
                }
            }
        }

        let credential = identity.login().await?;
        if credential.is_valid_at(Utc::now()) {
            Ok(credential)
        } else {
            Err(Error::auth_unavailable("identity provider issued an expired credential"))
        }
    }
}
