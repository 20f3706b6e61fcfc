//! Error types for crosspost with categorization:
//!
//! - **Validation errors**: configuration and malformed input (exit code 1)
//! - **System errors**: store, identity provider, gateway, IO (exit code 2)
//! - **Not found**: content items or channels that do not exist (exit code 3)
//! - **Coordination errors**: leases and persisted state (exit code 4)
//!
//! Dispatcher-level failures are absorbed at the dispatcher boundary and turned
//! into per-item or per-channel state; nothing here is meant to halt the process.

use thiserror::Error;

/// Top-level error type for crosspost operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed input from a file, the store or the gateway
    #[error("Parse error: {0}")]
    ParseError(String),

    /// A live lease already exists for this content/channel pair
    #[error("Lease held for content '{content_id}' on channel '{channel}'")]
    LockDenied { content_id: String, channel: String },

    /// No credential could be obtained this cycle
    #[error("Credential unavailable: {reason}")]
    AuthUnavailable {
        reason: String,
        /// Set once the refresh ceiling was reached and the cache was evicted.
        terminal: bool,
    },

    /// A single channel publish attempt failed
    #[error("Publishing to '{channel}' failed for content '{content_id}': {reason}")]
    ChannelPublishFailed {
        content_id: String,
        channel: String,
        reason: String,
    },

    /// The external content store could not be reached or answered with a server error
    #[error("Content store unavailable: {0}")]
    StoreUnavailable(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Lease database failure
    #[error("Database error: {0}")]
    Database(String),

    /// Filesystem failure
    #[error("IO error: {0}")]
    Io(String),
}

impl Error {
    /// Create an auth failure that may succeed on a later attempt.
    pub fn auth_unavailable(reason: impl Into<String>) -> Self {
        Self::AuthUnavailable {
            reason: reason.into(),
            terminal: false,
        }
    }

    /// Create an auth failure raised after the refresh ceiling was reached.
    pub fn auth_exhausted(reason: impl Into<String>) -> Self {
        Self::AuthUnavailable {
            reason: reason.into(),
            terminal: true,
        }
    }

    /// Create a store failure.
    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::ParseError(_) => "PARSE_ERROR",
            Self::LockDenied { .. } => "LOCK_DENIED",
            Self::AuthUnavailable { .. } => "AUTH_UNAVAILABLE",
            Self::ChannelPublishFailed { .. } => "CHANNEL_PUBLISH_FAILED",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }

    /// Returns the appropriate exit code for this error type.
    ///
    /// Exit code scheme:
    /// - 1: configuration or input error
    /// - 2: external system unavailable (store, identity provider, gateway, IO)
    /// - 3: not found
    /// - 4: coordination or persisted state error
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidConfig(_) | Self::ParseError(_) => 1,
            Self::AuthUnavailable { .. }
            | Self::ChannelPublishFailed { .. }
            | Self::StoreUnavailable(_)
            | Self::Io(_) => 2,
            Self::NotFound(_) => 3,
            Self::LockDenied { .. } | Self::Database(_) => 4,
        }
    }

    /// Whether the failed operation may succeed on the next tick without intervention.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::StoreUnavailable(_) | Self::LockDenied { .. } => true,
            Self::AuthUnavailable { terminal, .. } => !*terminal,
            _ => false,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::ParseError(format!("Failed to parse config: {err}"))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::ParseError(err.to_string())
        } else {
            Self::StoreUnavailable(err.to_string())
        }
    }
}

/// Result type alias for crosspost operations
pub type Result<T> = std::result::Result<T, Error>;
