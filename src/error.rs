//! Error types for evidence-dl
//!
//! Every failure the pipeline can meet is one variant of [`Error`]. Most of them are
//! absorbed close to where they happen (one endpoint call, one file) and turned into
//! log lines and counters, so callers rarely see them propagate; the variants still
//! carry enough context to make those log lines useful.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for evidence-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for evidence-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_workers")
        key: Option<String>,
    },

    /// The remote service answered with a non-success status
    #[error("{endpoint} returned HTTP {status}")]
    Remote {
        /// The endpoint URL that was called
        endpoint: String,
        /// The HTTP status code returned
        status: u16,
    },

    /// Connection-level failure (DNS, TLS, timeout, reset, ...)
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A response body did not match the expected JSON shape
    #[error("unexpected response from {endpoint}: {source}")]
    Schema {
        /// The endpoint URL whose body failed to decode
        endpoint: String,
        /// The underlying decode error
        #[source]
        source: serde_json::Error,
    },

    /// A run start date matched neither recognised format
    #[error("malformed date: {0:?}")]
    MalformedDate(String),

    /// A filesystem operation failed for a specific path
    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        /// The path being created, opened or written
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// An attachment stream delivered no data for longer than the idle limit
    #[error("no data from {endpoint} for {}s", idle.as_secs_f32())]
    Stalled {
        /// The attachment being read
        endpoint: String,
        /// How long the stream stayed silent
        idle: Duration,
    },

    /// A service URL could not be built
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl {
        /// The offending base URL
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// Serialization error (configuration files)
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Build a [`Error::Filesystem`] for `path`
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Build a [`Error::Config`] naming the offending key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}
