//! Error types for the mirror-dl library.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while listing, downloading or configuring a sync.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level HTTP error (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Response body was not the JSON shape the API promises.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server answered with a non-success HTTP status.
    #[error("HTTP status {status} from {url}")]
    Status {
        /// Status code returned.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// Status-triggered retries ran out while the server kept failing.
    #[error("gave up after {attempts} attempt(s), last status {status}")]
    RetriesExhausted {
        /// Last status code observed.
        status: u16,
        /// Number of sends performed.
        attempts: u32,
    },

    /// API answered with HTTP 2xx but a non-200 `code` in the body.
    #[error("API error {code}: {message}")]
    Api {
        /// Application-level code from the response body.
        code: i64,
        /// Message from the response body, if any.
        message: String,
    },

    /// API reported success but omitted the `data` payload.
    #[error("API response is missing its data payload")]
    MissingData,

    /// Downloaded byte count differs from the size the listing reported.
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Size reported by the remote listing.
        expected: u64,
        /// Bytes actually written.
        actual: u64,
    },

    /// Configuration file could not be parsed or contains invalid values.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration file does not exist.
    #[error("configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// A base URL or endpoint could not be turned into a request URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// A remote name would place a file outside the mirror root.
    #[error("unsafe remote path: {0:?}")]
    UnsafePath(String),
}

impl Error {
    /// Whether the application-level retry wrapper should try again.
    ///
    /// Transport failures and HTTP status failures are transient. API-level
    /// errors are answers, not faults, and are returned to the caller as-is.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Status { .. } | Self::RetriesExhausted { .. }
        )
    }
}

/// A specialized `Result` type for mirror-dl operations.
pub type Result<T> = std::result::Result<T, Error>;
