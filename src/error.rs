//! Error types for release-mirror
//!
//! Errors fall into the classes the sync engine cares about:
//! - Terminal remote failures ([`Error::Http`], [`Error::Network`]) abort the current repository
//! - Local filesystem failures ([`Error::Io`]) are propagated unchanged
//! - Malformed remote data ([`Error::InvalidRelease`], [`Error::InvalidName`], ...)
//!
//! Transient remote failures never appear here: the retrier absorbs them.

use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias for release-mirror operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for release-mirror
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "api.page_size")
        key: Option<String>,
    },

    /// The remote answered with a non-success status outside the retryable set
    #[error("HTTP {status} for {url}")]
    Http {
        /// Status returned by the remote
        status: StatusCode,
        /// URL of the failed request
        url: String,
    },

    /// Transport failure that is not a peer disconnect
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Repository identifier is not of the form `owner/name`
    #[error("invalid repository identifier '{0}' (expected owner/name)")]
    InvalidRepository(String),

    /// A remote-supplied name cannot be used as a single path component
    #[error("invalid {kind} name '{name}'")]
    InvalidName {
        /// What the name identifies ("tag", "asset", "source archive")
        kind: &'static str,
        /// The offending name
        name: String,
    },

    /// A release record lacks a field the sync needs
    #[error("invalid release record: {0}")]
    InvalidRelease(String),

    /// A source archive HEAD response carried no usable Content-Disposition filename
    #[error("no filename in Content-Disposition for {url}")]
    MissingFilename {
        /// URL of the source archive
        url: String,
    },
}

impl Error {
    /// Create a configuration error for the given key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Returns true for failures reported by (or on the way to) the remote service
    pub fn is_remote(&self) -> bool {
        matches!(self, Error::Http { .. } | Error::Network(_))
    }

    /// Status code of a terminal HTTP failure, if this is one
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Http { status, .. } => Some(*status),
            Error::Network(e) => e.status(),
            _ => None,
        }
    }
}
