//! Configuration loading and management
//!
//! # Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Global config: `<config dir>/crosspost/config.toml`
//! 3. Project config: `.crosspost/config.toml` (or `--config <path>`)
//! 4. Environment variables: `CROSSPOST_*`
//!
//! # Example Config
//!
//! ```toml
//! [dispatcher]
//! tick_interval_secs = 30
//! max_concurrent_publishes = 4
//!
//! [leases]
//! backend = "sqlite"
//! sqlite_path = "/var/lib/crosspost/leases.db"
//!
//! [store]
//! base_url = "https://cms.example.com"
//!
//! [gateway]
//! webhook_url = "https://hooks.example.com/publish"
//! mode = "callback"
//! ```
//!
//! # Module Structure
//!
//! - `types`: Configuration structure definitions
//! - `defaults`: Default value implementations
//! - `load`: Loading from files and environment
//! - `merge`: Table merging between layers
//! - `validate`: Validation and redaction

mod defaults;
mod load;
mod merge;
mod types;
mod validate;

#[cfg(test)]
mod tests_loading;

pub use load::{
    config_from_table, global_config_path, load_config, load_toml_file, project_config_path,
};
pub use types::{
    Config, DispatcherConfig, GatewayConfig, GatewayMode, LeaseBackend, LeaseConfig,
    SessionConfig, StoreConfig,
};
pub use validate::MIN_MAX_LEASES;
