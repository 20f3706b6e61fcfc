//! Configuration validation
//!
//! Also hosts the redaction used before a config is printed.

use super::types::{Config, LeaseBackend};
use crate::{Error, Result};

const REDACTED: &str = "<redacted>";

/// Smallest lease ceiling; the sweep evicts a quarter of the leases at a time.
pub const MIN_MAX_LEASES: usize = 4;

fn require_positive(name: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(Error::InvalidConfig(format!("{name} must be greater than 0")));
    }
    Ok(())
}

fn require_http_url(name: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => Err(
            Error::InvalidConfig(format!("{name} must be an http(s) URL, got '{url}'")),
        ),
        _ => Ok(()),
    }
}

impl Config {
    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any values are out of range or inconsistent
    pub fn validate(&self) -> Result<()> {
        let dispatcher = &self.dispatcher;
        require_positive("dispatcher.tick_interval_secs", dispatcher.tick_interval_secs)?;
        require_positive("dispatcher.due_batch_limit", dispatcher.due_batch_limit as u64)?;
        require_positive("dispatcher.audit_batch_limit", dispatcher.audit_batch_limit as u64)?;
        require_positive(
            "dispatcher.max_concurrent_publishes",
            dispatcher.max_concurrent_publishes as u64,
        )?;

        let leases = &self.leases;
        require_positive("leases.ttl_secs", leases.ttl_secs)?;
        require_positive("leases.sweep_interval_secs", leases.sweep_interval_secs)?;
        if leases.max_leases < MIN_MAX_LEASES {
            return Err(Error::InvalidConfig(format!(
                "leases.max_leases must be at least {MIN_MAX_LEASES}"
            )));
        }
        if leases.backend == LeaseBackend::Sqlite && leases.sqlite_path.is_none() {
            return Err(Error::InvalidConfig(
                "leases.sqlite_path is required when leases.backend = \"sqlite\"".to_string(),
            ));
        }

        let session = &self.session;
        require_positive("session.static_token_ttl_secs", session.static_token_ttl_secs)?;
        require_positive("session.refresh_ceiling", u64::from(session.refresh_ceiling))?;
        require_positive("session.lookahead_secs", session.lookahead_secs)?;
        require_positive("session.sweep_interval_secs", session.sweep_interval_secs)?;
        if session.static_token_ttl_secs <= session.lookahead_secs {
            return Err(Error::InvalidConfig(format!(
                "session.static_token_ttl_secs ({}) must exceed session.lookahead_secs ({})",
                session.static_token_ttl_secs, session.lookahead_secs
            )));
        }
        if session.email.is_some() != session.password.is_some() {
            return Err(Error::InvalidConfig(
                "session.email and session.password must be set together".to_string(),
            ));
        }

        require_positive("store.request_timeout_secs", self.store.request_timeout_secs)?;
        if self.store.collection.trim().is_empty() {
            return Err(Error::InvalidConfig("store.collection cannot be empty".to_string()));
        }
        require_http_url("store.base_url", self.store.base_url.as_deref())?;
        require_http_url("gateway.webhook_url", self.gateway.webhook_url.as_deref())?;

        Ok(())
    }

    /// Copy with secrets replaced, for display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut shown = self.clone();
        if shown.session.static_token.is_some() {
            shown.session.static_token = Some(REDACTED.to_string());
        }
        if shown.session.password.is_some() {
            shown.session.password = Some(REDACTED.to_string());
        }
        shown
    }
}
