//! Error types for the Koji store client

use std::io;
use thiserror::Error;

/// Errors that can occur when talking to the Koji store
#[derive(Error, Debug)]
pub enum Error {
    /// Project credentials could not be resolved
    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    /// A network-only operation was called on a transaction client
    #[error("`{0}` is not available inside a transaction")]
    UnavailableInTransaction(&'static str),

    /// The requested document does not exist
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// The remote service failed, or could not be reached
    #[error("Service error{}: {message}", status_suffix(.status))]
    Service {
        /// HTTP status code, `None` for transport-level failures
        status: Option<u16>,
        /// Error message from the service or the transport
        message: String,
    },

    /// Commit was called on a client that is not an open transaction
    #[error("Client is not in an open transaction")]
    NotInTransaction,

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// TLS/SSL error
    #[error("TLS error: {0}")]
    Tls(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Transport-level failure with no HTTP status.
    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Error::Service {
            status: None,
            message: message.into(),
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {})", s)).unwrap_or_default()
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;
