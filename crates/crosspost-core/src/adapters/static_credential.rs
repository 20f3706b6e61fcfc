//! Long-lived admin token taken from configuration (`session.static_token`
//! or `CROSSPOST_STATIC_TOKEN`).

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::{
    config::SessionConfig,
    session::{Credential, StaticCredentialSource},
    Result,
};

/// Hands out the configured token with a rolling expiry, so the cache
/// re-checks the source every `ttl`.
#[derive(Clone)]
pub struct EnvStaticCredential {
    token: Option<String>,
    ttl: Duration,
}

impl std::fmt::Debug for EnvStaticCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvStaticCredential")
            .field("configured", &self.token.is_some())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl EnvStaticCredential {
    #[must_use]
    pub fn new(token: Option<String>, ttl: Duration) -> Self {
        Self { token, ttl }
    }

    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        let ttl_secs = i64::try_from(config.static_token_ttl_secs).unwrap_or(86_400);
        Self::new(config.static_token.clone(), Duration::seconds(ttl_secs))
    }

    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.token.is_some()
    }
}

#[async_trait]
impl StaticCredentialSource for EnvStaticCredential {
    async fn static_credential(&self) -> Result<Option<Credential>> {
        Ok(self
            .token
            .as_ref()
            .map(|token| Credential::new(token.clone(), Utc::now() + self.ttl)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::session::{SessionCache, SessionSettings};

    #[tokio::test]
    async fn test_unconfigured_source_yields_nothing() -> Result<()> {
        let source = EnvStaticCredential::from_config(&SessionConfig::default());
        assert!(!source.is_configured());
        assert!(source.static_credential().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_configured_token_gets_rolling_expiry() -> Result<()> {
        let source = EnvStaticCredential::new(Some("admin".into()), Duration::minutes(30));
        let credential = source.static_credential().await?;
        assert!(credential.is_some_and(|c| c.token == "admin" && c.is_valid_at(Utc::now())));
        Ok(())
    }

    #[tokio::test]
    async fn test_default_static_token_outlives_lookahead() -> Result<()> {
        let config = SessionConfig {
            static_token: Some("admin".into()),
            ..SessionConfig::default()
        };
        let session = SessionCache::new(
            Some(Arc::new(EnvStaticCredential::from_config(&config))),
            None,
            SessionSettings::from(&config),
        );

        session.get_token().await?;
        assert!(!session.refresh_if_expiring(Utc::now()).await?);
        Ok(())
    }
}
