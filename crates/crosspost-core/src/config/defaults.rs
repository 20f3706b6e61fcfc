//! Default configuration values
//!
//! This module provides Default trait implementations for all configuration types.

use super::types::{DispatcherConfig, LeaseBackend, LeaseConfig, SessionConfig, StoreConfig};

// ═══════════════════════════════════════════════════════════════════════════
// DEFAULT IMPLEMENTATIONS
// ═══════════════════════════════════════════════════════════════════════════

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 30,
            audit_enabled: true,
            due_batch_limit: 100,
            audit_batch_limit: 50,
            max_concurrent_publishes: 4,
            publishing_enabled: true,
        }
    }
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            sweep_interval_secs: 300,
            max_leases: 500,
            backend: LeaseBackend::Memory,
            sqlite_path: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            static_token: None,
            static_token_ttl_secs: 86_400,
            email: None,
            password: None,
            refresh_ceiling: 3,
            lookahead_secs: 1800,
            sweep_interval_secs: 300,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            collection: "campaign_content".to_string(),
            request_timeout_secs: 30,
        }
    }
}
