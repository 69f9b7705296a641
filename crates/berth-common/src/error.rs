//! Unified error type for the berth workspace.
//!
//! Every library crate returns [`BerthError`]. Only the binary converts it
//! into `anyhow::Error` at its boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum BerthError {
    /// No server connection has been configured for this session.
    #[error("no server connection is configured")]
    NotSetup,

    /// The operation needs a selected endpoint and none is selected.
    #[error("no endpoint is selected")]
    NoSelectedEndpoint,

    /// The operation was cancelled or superseded by a newer request.
    #[error("operation cancelled")]
    Cancelled,

    /// The remote API could not be reached or answered with a failure status.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// The remote API answered with a payload that could not be decoded.
    #[error("decoding error: {message}")]
    Decoding {
        /// Description of the decoding failure.
        message: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Serialization or deserialization of persisted state failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// Anything else.
    #[error("{message}")]
    Unknown {
        /// Description of the failure.
        message: String,
    },
}

impl BerthError {
    /// Returns whether this error only signals cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns whether this error should be shown to a user.
    ///
    /// Cancellation is the only benign case.
    #[must_use]
    pub const fn is_user_visible(&self) -> bool {
        !self.is_cancelled()
    }

    /// Builds a [`BerthError::Io`] for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BerthError>;
