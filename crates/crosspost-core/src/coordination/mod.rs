//! Coordination primitives for publish attempts.

pub mod lease;
pub mod sqlite_lease;

pub use lease::{
    Lease, LeaseCoordinator, LeaseSettings, LeaseStore, MemoryLeaseStore, SweepReport,
    DEFAULT_MAX_LEASES, DEFAULT_TTL_SECS,
};
pub use sqlite_lease::SqliteLeaseStore;
