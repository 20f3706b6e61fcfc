//! Configuration type definitions
//!
//! This module contains all configuration structures without behavior.
//! Each structure is a pure data holder with derived traits.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

// ═══════════════════════════════════════════════════════════════════════════
// MAIN CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════

/// Root configuration structure
///
/// Loaded from defaults → global → project (or `--config`) → env vars
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub dispatcher: DispatcherConfig,
    pub leases: LeaseConfig,
    pub session: SessionConfig,
    pub store: StoreConfig,
    pub gateway: GatewayConfig,
}

// ═══════════════════════════════════════════════════════════════════════════
// NESTED CONFIGURATION STRUCTURES
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DispatcherConfig {
    pub tick_interval_secs: u64,
    pub audit_enabled: bool,
    pub due_batch_limit: usize,
    pub audit_batch_limit: usize,
    pub max_concurrent_publishes: usize,
    /// Kill switch. When false, ticks reconcile but never call the gateway.
    pub publishing_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LeaseConfig {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub max_leases: usize,
    pub backend: LeaseBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<PathBuf>,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaseBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// Long-lived token tried before any login exchange.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_token: Option<String>,
    pub static_token_ttl_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Consecutive refresh failures before the cached credential is evicted.
    pub refresh_ceiling: u32,
    pub lookahead_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub collection: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GatewayConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    pub mode: GatewayMode,
}

/// How the publish webhook reports outcomes.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GatewayMode {
    /// The webhook response body is the outcome.
    #[default]
    Sync,
    /// The webhook acknowledges; the outcome arrives later.
    Callback,
}
