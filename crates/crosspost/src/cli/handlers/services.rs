//! Service wiring from configuration.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use crosspost_core::{
    adapters::{EnvStaticCredential, RestContentStore, RestIdentityProvider, WebhookPublishGateway},
    config::LeaseBackend,
    session::{IdentityProvider, StaticCredentialSource},
    Config, Dispatcher, DispatcherSettings, LeaseCoordinator, LeaseSettings, SessionCache,
    SessionSettings, SqliteLeaseStore,
};

/// Everything a command needs, built once per invocation.
pub struct Services {
    pub session: SessionCache,
    pub leases: LeaseCoordinator,
    pub dispatcher: Arc<Dispatcher>,
}

impl Services {
    pub async fn build(config: &Config) -> Result<Self> {
        let session = build_session(config)?;
        let leases = build_leases(config).await?;

        let store = RestContentStore::new(&config.store, session.clone())?;
        let gateway = WebhookPublishGateway::from_config(
            &config.gateway,
            Duration::from_secs(config.store.request_timeout_secs),
        )?;

        let dispatcher = Dispatcher::new(
            Arc::new(store),
            Arc::new(gateway),
            leases.clone(),
            DispatcherSettings::from(&config.dispatcher),
        )
        .with_session(session.clone());

        tracing::debug!(
            lease_backend = %config.leases.backend,
            gateway_mode = %config.gateway.mode,
            "Services ready"
        );

        Ok(Self {
            session,
            leases,
            dispatcher: Arc::new(dispatcher),
        })
    }
}

fn build_session(config: &Config) -> Result<SessionCache> {
    let static_source = EnvStaticCredential::from_config(&config.session);
    let static_source: Option<Arc<dyn StaticCredentialSource>> =
        static_source.is_configured().then(|| Arc::new(static_source) as _);

    let identity: Option<Arc<dyn IdentityProvider>> = match (
        config.store.base_url.as_deref(),
        config.session.email.as_deref(),
        config.session.password.as_deref(),
    ) {
        (Some(base_url), Some(email), Some(password)) => Some(Arc::new(RestIdentityProvider::new(
            base_url,
            email,
            password,
            Duration::from_secs(config.store.request_timeout_secs),
        )?)),
        _ => None,
    };

    if static_source.is_none() && identity.is_none() {
        tracing::warn!("No credential source configured; store requests will be skipped");
    }

    Ok(SessionCache::new(
        static_source,
        identity,
        SessionSettings::from(&config.session),
    ))
}

async fn build_leases(config: &Config) -> Result<LeaseCoordinator> {
    let settings = LeaseSettings::from(&config.leases);
    match config.leases.backend {
        LeaseBackend::Memory => Ok(LeaseCoordinator::in_memory(settings)),
        LeaseBackend::Sqlite => {
            let path = config
                .leases
                .sqlite_path
                .as_deref()
                .context("leases.sqlite_path is required for the sqlite backend")?;
            let store = SqliteLeaseStore::open(path)
                .await
                .with_context(|| format!("Failed to open lease database {}", path.display()))?;
            Ok(LeaseCoordinator::new(Arc::new(store), settings))
        }
    }
}
