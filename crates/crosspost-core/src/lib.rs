//! # Crosspost Core
//!
//! Coordination core for publishing one content item to many channels.
//!
//! - [`coordination`]: per-(content, channel) publication leases with TTL
//! - [`reconcile`]: pure derivation of the aggregate status from channel states
//! - [`session`]: shared credential with single-flight refresh
//! - [`dispatcher`]: polling loop that discovers, guards, publishes and reconciles
//!
//! ## Laws (Compiler Enforced)
//!
//! - No `unwrap()` - returns `Result` instead
//! - No `expect()` - returns `Result` instead
//! - No `panic!()` - returns `Result` instead
//! - No `unsafe` - safe Rust only
//!
//! ## Error Handling
//!
//! All fallible operations return `Result<T, Error>`. Use:
//! - `?` operator for propagation
//! - `map`, `and_then` combinators for transformation
//! - `match` / `map_or` / `unwrap_or_else` for defaults

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod adapters;
pub mod config;
pub mod content;
pub mod coordination;
pub mod dispatcher;
mod error;
pub mod gateway;
pub mod reconcile;
pub mod session;
pub mod shutdown;
pub mod store;

pub use config::{load_config, Config};
pub use content::{
    AggregateStatus, ChannelName, ChannelState, ChannelStatus, ContentId, ContentItem,
    ContentPatch, PublishOutcome,
};
pub use coordination::{
    LeaseCoordinator, LeaseSettings, LeaseStore, MemoryLeaseStore, SqliteLeaseStore,
};
pub use dispatcher::{Dispatcher, DispatcherSettings, TickMode, TickReport};
pub use error::{Error, Result};
pub use gateway::{PublishDispatch, PublishGateway};
pub use reconcile::{derive_aggregate_status, Finalize, Reconciliation};
pub use session::{
    Credential, IdentityProvider, SessionCache, SessionSettings, StaticCredentialSource,
};
pub use shutdown::{signal_channels, wait_for_signal, ShutdownCoordinator, ShutdownSignal};
pub use store::{ContentFilter, ContentStore, MemoryContentStore};
