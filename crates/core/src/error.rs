//! Unified error types for fetchcache.
//!
//! Every failure the stores and fetchers can produce is one of these variants.
//! Nothing in the workspace retries; errors go straight back to the caller.

use tokio_rusqlite::rusqlite;

/// Unified error type shared by the cache stores and the fetchers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connection, DNS or protocol failure while talking to the remote host.
    #[error("TRANSPORT_ERROR: {0}")]
    Transport(String),

    /// Response status outside the 2xx range.
    #[error("STATUS_ERROR: {code} {status_text} and body is: {body}")]
    Status { code: u16, status_text: String, body: String },

    /// Database operation failed.
    #[error("STORAGE_ERROR: {0}")]
    Storage(tokio_rusqlite::Error),

    /// Filesystem operation failed.
    #[error("STORAGE_ERROR: {0}")]
    Io(#[from] std::io::Error),

    /// Schema check or upgrade failed while opening a store.
    #[error("MIGRATION_ERROR: {0}")]
    MigrationFailed(String),

    /// Stored or fetched bytes could not be decoded.
    #[error("DECODE_ERROR: {0}")]
    Decode(String),

    /// Invalid input parameters (namespace, URL, header, proxy).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),
}

impl Error {
    /// HTTP status code carried by a [`Error::Status`], if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Storage(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Storage(tokio_rusqlite::Error::Close(c)),
            _ => Error::Storage(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Storage(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(tokio_rusqlite::Error::Error(err))
    }
}
