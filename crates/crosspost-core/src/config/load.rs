//! Configuration loading from files and environment (Immutable functional pattern)
//!
//! This module handles loading configuration from:
//! 1. Built-in defaults
//! 2. Global config: `<config dir>/crosspost/config.toml`
//! 3. Project config: `.crosspost/config.toml`, or an explicit `--config` file
//! 4. Environment variables: `CROSSPOST_*`
//!
//! All operations return new instances rather than mutating in place.

use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use toml::Table;

use super::{merge::merge_tables, types::Config};
use crate::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════
// PUBLIC API
// ═══════════════════════════════════════════════════════════════════════════

/// Load configuration from all sources with hierarchy.
///
/// An explicit path replaces the project file and must exist.
///
/// # Errors
///
/// Returns error if:
/// - A config file is malformed TOML or has wrongly typed values
/// - An environment override cannot be parsed
/// - Config values fail validation
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let global = match global_config_path() {
        Some(path) if path.exists() => load_toml_file(&path)?,
        _ => Table::new(),
    };

    let project = match explicit {
        Some(path) if !path.exists() => {
            return Err(Error::Io(format!(
                "Config file not found: {}",
                path.display()
            )))
        }
        Some(path) => load_toml_file(path)?,
        None => {
            let path = project_config_path()?;
            if path.exists() {
                load_toml_file(&path)?
            } else {
                Table::new()
            }
        }
    };

    let config = config_from_table(merge_tables(global, project))?.apply_env_vars()?;
    config.validate()?;
    Ok(config)
}

/// Deserialize a merged table; missing keys take their defaults.
pub fn config_from_table(table: Table) -> Result<Config> {
    toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| Error::ParseError(format!("Invalid config value: {e}")))
}

// ═══════════════════════════════════════════════════════════════════════════
// PATH HELPERS
// ═══════════════════════════════════════════════════════════════════════════

/// Get path to global config file
pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "crosspost")
        .map(|proj_dirs| proj_dirs.config_dir().join("config.toml"))
}

/// Get path to project config file
///
/// # Errors
///
/// Returns error if current directory cannot be determined
pub fn project_config_path() -> Result<PathBuf> {
    std::env::current_dir()
        .map(|dir| dir.join(".crosspost/config.toml"))
        .map_err(|e| Error::Io(format!("Failed to get current directory: {e}")))
}

/// Load a TOML file as a table
///
/// # Errors
///
/// Returns error if:
/// - File cannot be read
/// - Path is a directory instead of a file
/// - TOML is malformed
pub fn load_toml_file(path: &Path) -> Result<Table> {
    if path.is_dir() {
        return Err(Error::Io(format!(
            "Config path is a directory, not a file: {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Io(format!("Failed to read config file {}: {e}", path.display())))?;

    content.parse::<Table>().map_err(|e| {
        Error::ParseError(format!(
            "Failed to parse config file {}: {e}",
            path.display()
        ))
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// ENVIRONMENT VARIABLE OVERRIDES (Immutable pattern)
// ═══════════════════════════════════════════════════════════════════════════

fn parse_env<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::InvalidConfig(format!("Invalid {name} value '{value}': {e}")))
}

fn non_empty(name: &str, value: String) -> Result<String> {
    if value.trim().is_empty() {
        return Err(Error::InvalidConfig(format!(
            "{name} cannot be empty - unset the variable or provide a value"
        )));
    }
    Ok(value)
}

impl Config {
    /// Apply `CROSSPOST_*` overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns error if environment variable values are invalid
    pub fn apply_env_vars(self) -> Result<Self> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary lookup.
    ///
    /// # Errors
    ///
    /// Returns error if a value cannot be parsed
    pub fn apply_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        const PREFIX: &str = "CROSSPOST_";
        let var = |suffix: &str| {
            let name = format!("{PREFIX}{suffix}");
            lookup(&name).map(|value| (name, value))
        };

        if let Some((name, value)) = var("TICK_INTERVAL_SECS") {
            self.dispatcher.tick_interval_secs = parse_env(&name, &value)?;
        }
        if let Some((name, value)) = var("MAX_CONCURRENT_PUBLISHES") {
            self.dispatcher.max_concurrent_publishes = parse_env(&name, &value)?;
        }
        if let Some((name, value)) = var("AUDIT_ENABLED") {
            self.dispatcher.audit_enabled = parse_env(&name, &value)?;
        }
        if let Some((name, value)) = var("PUBLISHING_ENABLED") {
            self.dispatcher.publishing_enabled = parse_env(&name, &value)?;
        }
        if let Some((name, value)) = var("DISABLE_SCHEDULER") {
            let disabled: bool = parse_env(&name, &value)?;
            if disabled {
                self.dispatcher.publishing_enabled = false;
            }
        }

        if let Some((name, value)) = var("LEASE_TTL_SECS") {
            self.leases.ttl_secs = parse_env(&name, &value)?;
        }
        if let Some((name, value)) = var("LEASE_BACKEND") {
            self.leases.backend = parse_env(&name, &value.to_lowercase())?;
        }
        if let Some((name, value)) = var("LEASE_SQLITE_PATH") {
            self.leases.sqlite_path = Some(PathBuf::from(non_empty(&name, value)?));
        }

        if let Some((name, value)) = var("STATIC_TOKEN") {
            self.session.static_token = Some(non_empty(&name, value)?);
        }
        if let Some((name, value)) = var("EMAIL") {
            self.session.email = Some(non_empty(&name, value)?);
        }
        if let Some((name, value)) = var("PASSWORD") {
            self.session.password = Some(non_empty(&name, value)?);
        }

        if let Some((name, value)) = var("STORE_URL") {
            self.store.base_url = Some(non_empty(&name, value)?);
        }
        if let Some((name, value)) = var("STORE_COLLECTION") {
            self.store.collection = non_empty(&name, value)?;
        }

        if let Some((name, value)) = var("WEBHOOK_URL") {
            self.gateway.webhook_url = Some(non_empty(&name, value)?);
        }
        if let Some((name, value)) = var("GATEWAY_MODE") {
            self.gateway.mode = parse_env(&name, &value.to_lowercase())?;
        }

        Ok(self)
    }
}
